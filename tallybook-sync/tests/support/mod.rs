//! Shared helpers: an in-memory stand-in for the remote API and a harness
//! wiring it to a coordinator.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tallybook_crypto::{EncryptionVault, KdfParams};
use tallybook_storage::LocalStore;
use tallybook_sync::{
    Connectivity, ConnectivityMonitor, RemoteGateway, SyncCoordinator, SyncError, SyncResult,
};
use tallybook_types::{
    AuthPayload, AuthSession, DeleteAck, Invoice, InvoiceDraft, NewUser, ProfileField, UserProfile,
};

pub const EMAIL: &str = "ana@example.com";
pub const PASSWORD: &str = "correct horse";
pub const SECRET: &str = "device-secret";

/// One request as the server saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    FetchInvoices,
    CreateInvoice {
        invoice_number: String,
        idempotency_key: String,
    },
    UpdateInvoice {
        id: String,
        paid_status: bool,
    },
    DeleteInvoice {
        id: String,
    },
    FetchUser,
    ChangeProfileField {
        field: ProfileField,
        value: String,
    },
    CreateUser {
        email: String,
        password: String,
    },
    LoginUser {
        email: String,
    },
}

#[derive(Default)]
struct ServerState {
    invoices: Vec<Invoice>,
    users: HashMap<String, (String, UserProfile)>,
    calls: Vec<Call>,
    unreachable: bool,
    rejected_ids: HashSet<String>,
    idempotency: HashMap<String, String>,
    next_id: u32,
    offline_after: Option<(usize, ConnectivityMonitor)>,
}

/// In-memory remote API with a call log and failure switches.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<ServerState>,
}

impl MockGateway {
    /// A server that knows one user, `EMAIL` / `PASSWORD`, id `user-1`.
    pub fn with_user() -> Self {
        let gateway = Self::default();
        gateway.state.lock().unwrap().users.insert(
            EMAIL.to_string(),
            (
                PASSWORD.to_string(),
                UserProfile {
                    id: "user-1".into(),
                    name: "Ana".into(),
                    email: EMAIL.into(),
                    company: "Tally Ltd".into(),
                    ..Default::default()
                },
            ),
        );
        gateway
    }

    /// Adds an invoice directly on the server side.
    pub fn seed_invoice(&self, number: &str, amount: &str) -> Invoice {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let invoice = Invoice::local(
            format!("srv-{}", state.next_id),
            "user-1".into(),
            &draft(number, amount),
        );
        state.invoices.push(invoice.clone());
        invoice
    }

    pub fn server_invoices(&self) -> Vec<Invoice> {
        self.state.lock().unwrap().invoices.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls minus the read-only fetches.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::FetchInvoices | Call::FetchUser))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// While set, every call fails as if the network were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    /// Writes touching invoice `id` are rejected by the server. Creates are
    /// matched on invoice number.
    pub fn reject_invoice(&self, id: &str) {
        self.state.lock().unwrap().rejected_ids.insert(id.to_string());
    }

    pub fn accept_invoice(&self, id: &str) {
        self.state.lock().unwrap().rejected_ids.remove(id);
    }

    /// Signals the monitor offline once `calls` write calls have been served.
    pub fn go_offline_after(&self, calls: usize, monitor: ConnectivityMonitor) {
        self.state.lock().unwrap().offline_after = Some((calls, monitor));
    }

    fn begin(&self, call: Call) -> SyncResult<std::sync::MutexGuard<'_, ServerState>> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(SyncError::Network("connection refused".into()));
        }
        state.calls.push(call);
        Ok(state)
    }

    fn finish(state: &mut ServerState) {
        let writes = state
            .calls
            .iter()
            .filter(|c| !matches!(c, Call::FetchInvoices | Call::FetchUser))
            .count();
        if let Some((limit, monitor)) = &state.offline_after {
            if writes >= *limit {
                monitor.went_offline();
            }
        }
    }

    fn authorize(state: &ServerState, auth: &AuthSession) -> SyncResult<()> {
        match &auth.token {
            Some(token) if state.users.values().any(|(_, u)| token == &token_for(&u.id)) => Ok(()),
            _ => Err(SyncError::Remote {
                operation: "auth".into(),
                message: "unauthenticated".into(),
            }),
        }
    }

    fn reject_if_needed(state: &ServerState, operation: &str, id: &str) -> SyncResult<()> {
        if state.rejected_ids.contains(id) {
            return Err(SyncError::Remote {
                operation: operation.into(),
                message: format!("invoice {id} rejected"),
            });
        }
        Ok(())
    }
}

fn token_for(user_id: &str) -> String {
    format!("token-{user_id}")
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn fetch_invoices(&self, auth: &AuthSession) -> SyncResult<Vec<Invoice>> {
        let state = self.begin(Call::FetchInvoices)?;
        Self::authorize(&state, auth)?;
        Ok(state.invoices.clone())
    }

    async fn create_invoice(
        &self,
        auth: &AuthSession,
        invoice: &InvoiceDraft,
        idempotency_key: &str,
    ) -> SyncResult<Invoice> {
        let mut state = self.begin(Call::CreateInvoice {
            invoice_number: invoice.invoice_number.clone(),
            idempotency_key: idempotency_key.to_string(),
        })?;
        Self::authorize(&state, auth)?;
        Self::reject_if_needed(&state, "createInvoice", &invoice.invoice_number)?;

        if let Some(existing) = state.idempotency.get(idempotency_key).cloned() {
            let found = state.invoices.iter().find(|i| i.id == existing).cloned();
            Self::finish(&mut state);
            return found.ok_or_else(|| SyncError::Remote {
                operation: "createInvoice".into(),
                message: "replayed create for deleted invoice".into(),
            });
        }

        state.next_id += 1;
        let created = Invoice::local(
            format!("srv-{}", state.next_id),
            auth.user_id.clone(),
            invoice,
        );
        state
            .idempotency
            .insert(idempotency_key.to_string(), created.id.clone());
        state.invoices.push(created.clone());
        Self::finish(&mut state);
        Ok(created)
    }

    async fn update_invoice(
        &self,
        auth: &AuthSession,
        id: &str,
        paid_status: bool,
    ) -> SyncResult<Invoice> {
        let mut state = self.begin(Call::UpdateInvoice {
            id: id.to_string(),
            paid_status,
        })?;
        Self::authorize(&state, auth)?;
        Self::reject_if_needed(&state, "updateInvoice", id)?;
        let updated = match state.invoices.iter_mut().find(|i| i.id == id) {
            Some(invoice) => {
                invoice.paid_status = paid_status;
                invoice.clone()
            }
            None => {
                return Err(SyncError::Remote {
                    operation: "updateInvoice".into(),
                    message: format!("no invoice {id}"),
                });
            }
        };
        Self::finish(&mut state);
        Ok(updated)
    }

    async fn delete_invoice(&self, auth: &AuthSession, id: &str) -> SyncResult<DeleteAck> {
        let mut state = self.begin(Call::DeleteInvoice { id: id.to_string() })?;
        Self::authorize(&state, auth)?;
        Self::reject_if_needed(&state, "deleteInvoice", id)?;
        let before = state.invoices.len();
        state.invoices.retain(|i| i.id != id);
        let removed = state.invoices.len() < before;
        Self::finish(&mut state);
        Ok(DeleteAck {
            success: removed,
            message: if removed {
                "deleted".into()
            } else {
                format!("no invoice {id}")
            },
        })
    }

    async fn fetch_user(&self, auth: &AuthSession) -> SyncResult<UserProfile> {
        let state = self.begin(Call::FetchUser)?;
        Self::authorize(&state, auth)?;
        state
            .users
            .values()
            .find(|(_, u)| u.id == auth.user_id)
            .map(|(_, u)| u.clone())
            .ok_or_else(|| SyncError::NotFound(auth.user_id.clone()))
    }

    async fn change_profile_field(
        &self,
        auth: &AuthSession,
        field: ProfileField,
        value: &str,
    ) -> SyncResult<UserProfile> {
        let mut state = self.begin(Call::ChangeProfileField {
            field,
            value: value.to_string(),
        })?;
        Self::authorize(&state, auth)?;
        let email = state
            .users
            .iter()
            .find(|(_, (_, u))| u.id == auth.user_id)
            .map(|(email, _)| email.clone())
            .ok_or_else(|| SyncError::NotFound(auth.user_id.clone()))?;
        // Users are keyed by email, so an email change moves the entry.
        let (password, mut profile) = state.users.remove(&email).unwrap();
        profile.apply(field, value);
        state
            .users
            .insert(profile.email.clone(), (password, profile.clone()));
        Self::finish(&mut state);
        Ok(profile)
    }

    async fn create_user(&self, new_user: &NewUser) -> SyncResult<AuthPayload> {
        let mut state = self.begin(Call::CreateUser {
            email: new_user.email.clone(),
            password: new_user.password.clone(),
        })?;
        if state.users.contains_key(&new_user.email) {
            return Err(SyncError::Remote {
                operation: "createUser".into(),
                message: "email already registered".into(),
            });
        }
        state.next_id += 1;
        let user = new_user.profile(format!("user-new-{}", state.next_id));
        state.users.insert(
            new_user.email.clone(),
            (new_user.password.clone(), user.clone()),
        );
        Self::finish(&mut state);
        Ok(AuthPayload {
            token: token_for(&user.id),
            user,
        })
    }

    async fn login_user(&self, email: &str, password: &str) -> SyncResult<AuthPayload> {
        let state = self.begin(Call::LoginUser {
            email: email.to_string(),
        })?;
        match state.users.get(email) {
            Some((stored, user)) if stored == password => Ok(AuthPayload {
                token: token_for(&user.id),
                user: user.clone(),
            }),
            _ => Err(SyncError::Remote {
                operation: "loginUser".into(),
                message: "invalid credentials".into(),
            }),
        }
    }
}

pub fn draft(number: &str, amount: &str) -> InvoiceDraft {
    InvoiceDraft {
        invoice_number: number.into(),
        invoice_amount: amount.parse().unwrap(),
        client_name: "Acme".into(),
        ..Default::default()
    }
}

/// A coordinator over an in-memory or file store, with its mock server.
pub struct Harness {
    pub coordinator: Arc<SyncCoordinator>,
    pub gateway: Arc<MockGateway>,
    pub monitor: ConnectivityMonitor,
}

impl Harness {
    pub fn new(store: LocalStore, gateway: Arc<MockGateway>, initial: Connectivity) -> Self {
        Self::with_secret(store, gateway, initial, SECRET)
    }

    pub fn with_secret(
        store: LocalStore,
        gateway: Arc<MockGateway>,
        initial: Connectivity,
        secret: &str,
    ) -> Self {
        let salt = store.vault_salt().unwrap();
        let vault = EncryptionVault::unlock(secret, &salt, &KdfParams::insecure_fast()).unwrap();
        let monitor = ConnectivityMonitor::new(initial);
        let coordinator = Arc::new(SyncCoordinator::new(
            store,
            vault,
            gateway.clone(),
            monitor.clone(),
        ));
        Self {
            coordinator,
            gateway,
            monitor,
        }
    }

    /// Signed in online as `EMAIL`, then left in `connectivity`, call log
    /// cleared.
    pub async fn signed_in(connectivity: Connectivity) -> Self {
        Self::signed_in_with(
            LocalStore::open_in_memory().unwrap(),
            MockGateway::with_user(),
            connectivity,
        )
        .await
    }

    pub async fn signed_in_with(
        store: LocalStore,
        gateway: MockGateway,
        connectivity: Connectivity,
    ) -> Self {
        let harness = Self::new(store, Arc::new(gateway), Connectivity::Online);
        harness.coordinator.log_in(EMAIL, PASSWORD).await.unwrap();
        harness.monitor.signal(connectivity);
        harness.gateway.clear_calls();
        harness
    }

    pub fn queue_len(&self) -> usize {
        self.coordinator.pending_count().unwrap()
    }

    pub fn local_invoice(&self, id: &str) -> Option<Invoice> {
        self.coordinator.store().invoices().get(id).unwrap()
    }
}

pub fn file_store(path: &Path) -> LocalStore {
    LocalStore::open(path).unwrap()
}
