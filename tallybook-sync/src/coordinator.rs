//! Sync coordinator.
//!
//! Mediates every write between the local store, the mutation queue and the
//! remote gateway:
//! - online writes go straight to the gateway and mirror the response locally
//! - offline writes (and online writes that fail) land in the store and queue
//! - on each offline→online transition the queue is drained in order, then
//!   local state is overwritten from the server
//!
//! Follows the handle/loop split of the rest of the engine: the coordinator
//! itself is shared behind an `Arc`, and [`SyncCoordinator::run`] reacts to
//! connectivity transitions and [`CoordinatorCommand`]s.

use crate::config::SyncConfig;
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tallybook_crypto::EncryptionVault;
use tallybook_storage::{
    EncryptedProfile, LocalStore, MutationQueue, QueueItem, StoredCredentials,
};
use tallybook_types::{
    local_id, AuthPayload, AuthSession, Invoice, InvoiceDraft, Mutation, NewUser, PendingMutation,
    ProfileField, UserProfile,
};
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

/// Commands accepted by the coordinator loop.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Drain the queue and reconcile now. The report is sent back if a
    /// reply channel is given.
    SyncNow {
        reply: Option<oneshot::Sender<SyncResult<DrainReport>>>,
    },
    Shutdown,
}

/// Cloneable handle for talking to a running coordinator loop.
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Requests a drain and waits for its outcome.
    pub async fn sync_now(&self) -> SyncResult<DrainReport> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorCommand::SyncNow { reply: Some(reply) })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.command_tx
            .send(CoordinatorCommand::Shutdown)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// Creates the command channel for [`SyncCoordinator::run`].
pub fn create_coordinator_channel() -> (CoordinatorHandle, mpsc::Receiver<CoordinatorCommand>) {
    let (command_tx, command_rx) = mpsc::channel(32);
    (CoordinatorHandle { command_tx }, command_rx)
}

/// Outcome of one drain of the mutation queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries acknowledged by the server and removed.
    pub replayed: usize,
    /// Entries whose remote call failed; still queued.
    pub failed: usize,
    /// Unreadable rows dropped from the queue.
    pub skipped_malformed: usize,
    /// Entries not attempted, either behind a failed write to the same
    /// record or because connectivity dropped mid-drain.
    pub deferred: usize,
    /// Whether server state was pulled into the store afterwards.
    pub refreshed: bool,
}

/// Offline-first bridge between the UI and the remote API.
pub struct SyncCoordinator {
    store: LocalStore,
    queue: MutationQueue,
    vault: EncryptionVault,
    gateway: Arc<dyn RemoteGateway>,
    connectivity: ConnectivityMonitor,
    /// Serializes writes and drains.
    gate: AsyncMutex<()>,
    invoices_tx: watch::Sender<Vec<Invoice>>,
    user_tx: watch::Sender<Option<UserProfile>>,
}

impl SyncCoordinator {
    pub fn new(
        store: LocalStore,
        vault: EncryptionVault,
        gateway: Arc<dyn RemoteGateway>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let (invoices_tx, _) = watch::channel(Vec::new());
        let (user_tx, _) = watch::channel(None);
        let coordinator = Self {
            queue: store.mutation_queue(),
            store,
            vault,
            gateway,
            connectivity,
            gate: AsyncMutex::new(()),
            invoices_tx,
            user_tx,
        };
        coordinator.publish();
        coordinator
    }

    /// Opens the store named by `config` and unlocks its vault with `secret`.
    pub fn open(
        config: &SyncConfig,
        secret: &str,
        gateway: Arc<dyn RemoteGateway>,
        connectivity: ConnectivityMonitor,
    ) -> SyncResult<Self> {
        let store = if config.database_path == Path::new(":memory:") {
            LocalStore::open_in_memory()?
        } else {
            LocalStore::open(&config.database_path)?
        };
        let salt = store.vault_salt()?;
        let vault = EncryptionVault::unlock(secret, &salt, &config.kdf)?;
        info!("opened local store at {}", config.database_path.display());
        Ok(Self::new(store, vault, gateway, connectivity))
    }

    // ── Observable state ─────────────────────────────────────────

    /// Visible invoices, as last published.
    pub fn invoices(&self) -> Vec<Invoice> {
        self.invoices_tx.borrow().clone()
    }

    /// The signed-in user's profile. `None` when signed out or when the
    /// cached profile cannot be decrypted.
    pub fn user_data(&self) -> Option<UserProfile> {
        self.user_tx.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn watch_invoices(&self) -> watch::Receiver<Vec<Invoice>> {
        self.invoices_tx.subscribe()
    }

    pub fn watch_user(&self) -> watch::Receiver<Option<UserProfile>> {
        self.user_tx.subscribe()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.watch()
    }

    pub fn session(&self) -> SyncResult<Option<AuthSession>> {
        Ok(self.store.auth_sessions().get_all()?.into_iter().next())
    }

    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.queue.len()?)
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    // ── Invoice writes ───────────────────────────────────────────

    /// Creates an invoice. Returns the record as stored on this device.
    pub async fn add_invoice(&self, draft: InvoiceDraft) -> SyncResult<Invoice> {
        let _gate = self.gate.lock().await;
        let session = self.require_session()?;

        let record = Invoice::local(local_id(), session.user_id.clone(), &draft);
        let entry = PendingMutation::new(Mutation::CreateInvoice {
            local_id: record.id.clone(),
            invoice: draft.clone(),
        });

        if self.can_write_through(&session, &entry.mutation)? {
            match self
                .gateway
                .create_invoice(&session, &draft, &entry.idempotency_key)
                .await
            {
                Ok(remote) => {
                    let record = remote.into_synced();
                    self.store.invoices().put(&record)?;
                    self.publish_invoices();
                    return Ok(record);
                }
                Err(e) if e.should_queue() => warn!("createInvoice failed, queueing: {e}"),
                Err(e) => return Err(e),
            }
        }

        self.store.invoices().put(&record)?;
        self.queue.enqueue(&entry)?;
        self.publish_invoices();
        Ok(record)
    }

    /// Sets an invoice's paid status.
    pub async fn update_invoice(&self, id: &str, paid_status: bool) -> SyncResult<Invoice> {
        let _gate = self.gate.lock().await;
        let session = self.require_session()?;
        let mut record = self
            .store
            .invoices()
            .get(id)?
            .filter(Invoice::is_visible)
            .ok_or_else(|| SyncError::NotFound(format!("invoice {id}")))?;

        let mutation = Mutation::UpdateInvoice {
            id: id.to_string(),
            paid_status,
        };
        if self.can_write_through(&session, &mutation)? {
            match self.gateway.update_invoice(&session, id, paid_status).await {
                Ok(remote) => {
                    let record = remote.into_synced();
                    self.store.invoices().put(&record)?;
                    self.publish_invoices();
                    return Ok(record);
                }
                Err(e) if e.should_queue() => warn!("updateInvoice failed, queueing: {e}"),
                Err(e) => return Err(e),
            }
        }

        record.paid_status = paid_status;
        record.updated_locally = true;
        self.store.invoices().put(&record)?;
        self.queue.enqueue(&PendingMutation::new(mutation))?;
        self.publish_invoices();
        Ok(record)
    }

    /// Deletes an invoice. Deleting an absent or already deleted invoice is
    /// a no-op.
    pub async fn delete_invoice(&self, id: &str) -> SyncResult<()> {
        let _gate = self.gate.lock().await;
        let session = self.require_session()?;
        let Some(mut record) = self.store.invoices().get(id)?.filter(Invoice::is_visible) else {
            debug!("delete of absent invoice {id} ignored");
            return Ok(());
        };

        let mutation = Mutation::DeleteInvoice { id: id.to_string() };
        if self.can_write_through(&session, &mutation)? {
            let outcome = self
                .gateway
                .delete_invoice(&session, id)
                .await
                .and_then(|ack| ack_to_result(ack.success, &ack.message));
            match outcome {
                Ok(()) => {
                    self.store.invoices().delete(id)?;
                    self.publish_invoices();
                    return Ok(());
                }
                Err(e) if e.should_queue() => warn!("deleteInvoice failed, queueing: {e}"),
                Err(e) => return Err(e),
            }
        }

        record.deleted_locally = true;
        self.store.invoices().put(&record)?;
        self.queue.enqueue(&PendingMutation::new(mutation))?;
        self.publish_invoices();
        Ok(())
    }

    // ── Profile writes ───────────────────────────────────────────

    /// Edits one profile field.
    pub async fn update_profile_field(
        &self,
        field: ProfileField,
        value: &str,
    ) -> SyncResult<UserProfile> {
        let _gate = self.gate.lock().await;
        let session = self.require_session()?;
        let mut profile = self
            .load_profile(&session.user_id)?
            .ok_or_else(|| SyncError::NotFound(format!("profile of {}", session.user_id)))?;

        let mutation = Mutation::UpdateProfile {
            field,
            value: value.to_string(),
        };
        if self.can_write_through(&session, &mutation)? {
            match self.gateway.change_profile_field(&session, field, value).await {
                Ok(remote) => {
                    self.save_profile(&remote)?;
                    if field == ProfileField::Email {
                        self.follow_email_change(&remote.email)?;
                    }
                    self.publish_user();
                    return Ok(remote);
                }
                Err(e) if e.should_queue() => warn!("{} failed, queueing: {e}", field.operation_name()),
                Err(e) => return Err(e),
            }
        }

        profile.apply(field, value);
        self.save_profile(&profile)?;
        if field == ProfileField::Email {
            self.follow_email_change(value)?;
        }
        self.queue.enqueue(&PendingMutation::new(mutation))?;
        self.publish_user();
        Ok(profile)
    }

    // ── Authentication ───────────────────────────────────────────

    /// Registers a new account. Offline, the account is created locally and
    /// a `CREATE_USER` write is queued; the session stays provisional until
    /// it is replayed.
    pub async fn sign_up(&self, new_user: NewUser) -> SyncResult<AuthSession> {
        let _gate = self.gate.lock().await;
        self.forget_other_user(&new_user.email)?;

        if self.is_online() {
            match self.gateway.create_user(&new_user).await {
                Ok(payload) => {
                    let session = self.establish_session(payload)?;
                    self.store_credentials(&new_user.email, &new_user.password)?;
                    self.sync_locked().await;
                    return Ok(session);
                }
                Err(e) if e.should_queue() => warn!("createUser failed, signing up offline: {e}"),
                Err(e) => return Err(e),
            }
        }

        // Signing up again before the account exists refreshes the same
        // provisional account.
        let user_id = self
            .session()?
            .filter(|s| s.is_provisional() && s.email == new_user.email)
            .map(|s| s.user_id)
            .unwrap_or_else(local_id);
        let session = AuthSession::provisional(user_id.clone(), new_user.email.clone());
        self.save_profile(&new_user.profile(user_id))?;
        self.store_credentials(&new_user.email, &new_user.password)?;
        self.store.auth_sessions().replace_all(std::slice::from_ref(&session))?;
        let already_queued = self
            .queue
            .pending()?
            .iter()
            .any(|e| matches!(e.mutation, Mutation::CreateUser { .. }));
        if !already_queued {
            self.queue.enqueue(&PendingMutation::new(Mutation::CreateUser {
                email: new_user.email.clone(),
            }))?;
        }
        self.publish();
        info!("signed up {} offline", new_user.email);
        Ok(session)
    }

    /// Signs in. Offline, or when the server cannot be reached, succeeds only
    /// against credentials cached on this device.
    pub async fn log_in(&self, email: &str, password: &str) -> SyncResult<AuthSession> {
        let _gate = self.gate.lock().await;

        if self.is_online() {
            match self.gateway.login_user(email, password).await {
                Ok(payload) => {
                    self.forget_other_user(email)?;
                    let session = self.establish_session(payload)?;
                    self.store_credentials(email, password)?;
                    self.sync_locked().await;
                    return Ok(session);
                }
                Err(SyncError::Network(e)) => warn!("loginUser unreachable, trying cache: {e}"),
                Err(e) => return Err(e),
            }
        }

        let session = self
            .session()?
            .filter(|s| s.email == email)
            .ok_or(SyncError::AuthRequired)?;
        let credentials = self
            .store
            .login_credentials()
            .get(email)?
            .ok_or(SyncError::AuthRequired)?;
        let cached: String = self.vault.open(&credentials.password)?;
        if cached != password {
            return Err(SyncError::AuthRequired);
        }
        info!("signed in {email} from cache");
        self.publish();
        Ok(session)
    }

    /// Signs out, wiping every cached record and every pending write.
    pub async fn log_out(&self) -> SyncResult<()> {
        let _gate = self.gate.lock().await;
        self.store.clear_all()?;
        self.queue.clear()?;
        self.publish();
        info!("signed out; local data cleared");
        Ok(())
    }

    // ── Reconnect ────────────────────────────────────────────────

    /// Drains the queue and reconciles with the server. Offline, nothing is
    /// attempted and every entry is reported deferred.
    pub async fn sync_now(&self) -> SyncResult<DrainReport> {
        let _gate = self.gate.lock().await;
        if !self.is_online() {
            return Ok(DrainReport {
                deferred: self.queue.len()?,
                ..DrainReport::default()
            });
        }
        self.drain_and_refresh().await
    }

    /// Drain then refresh; errors are logged, not returned.
    async fn sync_locked(&self) {
        if let Err(e) = self.drain_and_refresh().await {
            warn!("post-login sync failed: {e}");
        }
    }

    async fn drain_and_refresh(&self) -> SyncResult<DrainReport> {
        let mut report = match self.drain().await {
            Ok(report) => report,
            Err(e) => {
                self.publish();
                return Err(e);
            }
        };
        if self.is_online() {
            match self.refresh_from_remote().await {
                Ok(refreshed) => report.refreshed = refreshed,
                Err(e) => warn!("refresh from server failed: {e}"),
            }
        }
        self.publish();
        info!(
            "sync finished: {} replayed, {} failed, {} malformed, {} deferred",
            report.replayed, report.failed, report.skipped_malformed, report.deferred
        );
        Ok(report)
    }

    /// Replays queued writes one at a time in FIFO order.
    async fn drain(&self) -> SyncResult<DrainReport> {
        let items = self.queue.list()?;
        let mut report = DrainReport::default();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut remapped: HashMap<String, String> = HashMap::new();

        for item in items {
            let seq = item.seq();
            let mut entry = match item {
                QueueItem::Malformed(m) => {
                    let err = SyncError::MalformedQueueEntry {
                        seq,
                        reason: m.reason,
                    };
                    warn!("discarding {err}");
                    if let Err(e) = self.queue.discard(seq) {
                        error!("failed to discard queue row {seq}: {e}");
                    }
                    report.skipped_malformed += 1;
                    continue;
                }
                QueueItem::Pending { entry, .. } => entry,
            };

            if !self.is_online() {
                report.deferred += 1;
                continue;
            }

            // An earlier replay may already have settled this entry.
            match self.queue.contains(&entry.id) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("{} {} left the queue mid-drain", entry.mutation_type(), entry.id);
                    continue;
                }
                Err(e) => {
                    error!("failed to read queue row {seq}: {e}");
                    report.deferred += 1;
                    continue;
                }
            }

            for (old, new) in &remapped {
                entry.mutation.retarget_invoice(old, new);
            }
            let target = entry.mutation.target();
            if blocked.contains(&target) {
                debug!("deferring {} {} behind earlier failure", entry.mutation_type(), entry.id);
                report.deferred += 1;
                continue;
            }

            match self.dispatch(&entry).await {
                Ok(new_id) => {
                    report.replayed += 1;
                    if let Err(e) = self.queue.remove(&entry.id) {
                        error!("replayed queue row {seq} but could not remove it: {e}");
                    }
                    if let Some((old, new)) = new_id {
                        if let Err(e) = self.queue.retarget_invoice(&old, &new) {
                            error!("failed to retarget queued writes from {old} to {new}: {e}");
                        }
                        remapped.insert(old, new);
                    }
                }
                Err(e) => {
                    warn!("replay of {} {} failed: {e}", entry.mutation_type(), entry.id);
                    report.failed += 1;
                    blocked.insert(target);
                }
            }
        }

        Ok(report)
    }

    /// Sends one queued write and applies the server's answer locally.
    /// Returns `(local_id, server_id)` when a create was assigned a new id.
    async fn dispatch(&self, entry: &PendingMutation) -> SyncResult<Option<(String, String)>> {
        if let Mutation::CreateUser { email } = &entry.mutation {
            self.replay_create_user(email).await?;
            return Ok(None);
        }

        let session = self
            .session()?
            .filter(|s| !s.is_provisional())
            .ok_or(SyncError::AuthRequired)?;
        let invoices = self.store.invoices();

        match &entry.mutation {
            Mutation::CreateInvoice { local_id, invoice } => {
                let remote = self
                    .gateway
                    .create_invoice(&session, invoice, &entry.idempotency_key)
                    .await?;
                let mut record = remote.into_synced();
                if let Some(local) = invoices.get(local_id)? {
                    record.deleted_locally = local.deleted_locally;
                    if local.updated_locally {
                        record.updated_locally = true;
                        record.paid_status = local.paid_status;
                    }
                }
                let server_id = record.id.clone();
                if server_id != *local_id {
                    invoices.delete(local_id)?;
                }
                invoices.put(&record)?;
                Ok((server_id != *local_id).then(|| (local_id.clone(), server_id)))
            }
            Mutation::UpdateInvoice { id, paid_status } => {
                let remote = self.gateway.update_invoice(&session, id, *paid_status).await?;
                let mut record = remote.into_synced();
                if let Some(local) = invoices.get(id)? {
                    record.deleted_locally = local.deleted_locally;
                }
                invoices.put(&record)?;
                Ok(None)
            }
            Mutation::DeleteInvoice { id } => {
                let ack = self.gateway.delete_invoice(&session, id).await?;
                ack_to_result(ack.success, &ack.message)?;
                invoices.delete(id)?;
                Ok(None)
            }
            Mutation::UpdateProfile { field, value } => {
                let remote = self
                    .gateway
                    .change_profile_field(&session, *field, value)
                    .await?;
                self.save_profile(&remote)?;
                if *field == ProfileField::Email {
                    self.follow_email_change(&remote.email)?;
                }
                Ok(None)
            }
            Mutation::CreateUser { .. } => Ok(None),
        }
    }

    /// Creates the account behind a provisional session, then moves the
    /// local user id over to the server's. Does nothing once the session is
    /// no longer provisional.
    async fn replay_create_user(&self, email: &str) -> SyncResult<()> {
        let provisional = match self.session()? {
            Some(session) if session.is_provisional() => session,
            Some(_) => {
                debug!("account for {email} already exists; skipping createUser");
                return Ok(());
            }
            None => return Err(SyncError::NotFound(format!("session for {email}"))),
        };
        // The address may have been edited offline since the write was queued.
        let email = provisional.email.as_str();
        let credentials = self
            .store
            .login_credentials()
            .get(email)?
            .ok_or_else(|| SyncError::NotFound(format!("credentials for {email}")))?;
        let password: String = self.vault.open(&credentials.password)?;
        let profile = self
            .load_profile(&provisional.user_id)?
            .unwrap_or_else(|| UserProfile {
                email: email.to_string(),
                ..UserProfile::default()
            });

        let new_user = NewUser {
            name: profile.name,
            email: email.to_string(),
            password,
            company: profile.company,
            street_address: profile.street_address,
            city: profile.city,
            state: profile.state,
            zip: profile.zip,
        };
        let payload = self.gateway.create_user(&new_user).await?;
        self.establish_session(payload)?;
        Ok(())
    }

    /// Pulls invoices and the profile and overwrites the store with them.
    ///
    /// Records still referenced by a queued write keep their local version;
    /// every other local change is replaced by the server's copy. Returns
    /// `false` if there is no server session to pull with.
    pub async fn refresh_from_remote(&self) -> SyncResult<bool> {
        let Some(session) = self.session()?.filter(|s| !s.is_provisional()) else {
            return Ok(false);
        };

        let remote_invoices = self.gateway.fetch_invoices(&session).await?;
        let remote_profile = self.gateway.fetch_user(&session).await?;

        let pending = self.queue.pending()?;
        let pinned: HashSet<&str> = pending
            .iter()
            .filter_map(|e| e.mutation.invoice_id())
            .collect();
        let profile_pinned = pending
            .iter()
            .any(|e| matches!(e.mutation, Mutation::UpdateProfile { .. }));

        let mut local_pinned: HashMap<String, Invoice> = self
            .store
            .invoices()
            .get_all()?
            .into_iter()
            .filter(|i| pinned.contains(i.id.as_str()))
            .map(|i| (i.id.clone(), i))
            .collect();

        let mut merged: Vec<Invoice> = remote_invoices
            .into_iter()
            .map(|remote| match local_pinned.remove(&remote.id) {
                Some(local) => local,
                None => remote.into_synced(),
            })
            .collect();
        merged.extend(local_pinned.into_values());
        self.store.invoices().replace_all(&merged)?;

        if profile_pinned {
            debug!("keeping local profile; edits still queued");
        } else {
            self.save_profile(&remote_profile)?;
        }
        debug!("refreshed {} invoices from server", merged.len());
        Ok(true)
    }

    // ── Event loop ───────────────────────────────────────────────

    /// Runs until `Shutdown` or until every handle is dropped. Drains once on
    /// start if online, then on every offline→online transition.
    pub async fn run(&self, mut command_rx: mpsc::Receiver<CoordinatorCommand>) {
        let mut transitions = self.connectivity.subscribe();
        info!("sync coordinator started ({})", self.connectivity.current());

        if self.is_online() {
            self.reconnect().await;
        }

        loop {
            tokio::select! {
                Some(state) = transitions.recv() => {
                    if state.is_online() {
                        self.reconnect().await;
                    } else {
                        debug!("went offline; reads stay local");
                    }
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(CoordinatorCommand::SyncNow { reply }) => {
                            let result = self.sync_now().await;
                            if let Some(reply) = reply {
                                let _ = reply.send(result);
                            } else if let Err(e) = result {
                                error!("sync failed: {e}");
                            }
                        }
                        Some(CoordinatorCommand::Shutdown) => {
                            info!("sync coordinator stopping");
                            break;
                        }
                        None => {
                            info!("command channel closed, stopping sync coordinator");
                            break;
                        }
                    }
                }
            }
        }

        info!("sync coordinator stopped");
    }

    /// The reconnect path: one drain per transition, errors logged.
    pub async fn reconnect(&self) {
        match self.sync_now().await {
            Ok(report) => debug!("reconnect drain: {report:?}"),
            Err(e) => error!("reconnect drain failed: {e}"),
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn require_session(&self) -> SyncResult<AuthSession> {
        self.session()?.ok_or(SyncError::AuthRequired)
    }

    /// A write may go straight to the server only when online, with a real
    /// token, and with nothing queued ahead of it for the same record.
    fn can_write_through(&self, session: &AuthSession, mutation: &Mutation) -> SyncResult<bool> {
        if !self.is_online() || session.is_provisional() {
            return Ok(false);
        }
        let target = mutation.target();
        let blocked = self
            .queue
            .list()?
            .iter()
            .any(|item| match item {
                QueueItem::Pending { entry, .. } => {
                    entry.mutation.target() == target
                        || matches!(entry.mutation, Mutation::CreateUser { .. })
                }
                QueueItem::Malformed(_) => false,
            });
        Ok(!blocked)
    }

    fn load_profile(&self, user_id: &str) -> SyncResult<Option<UserProfile>> {
        match self.store.user_profiles().get(user_id)? {
            Some(stored) => Ok(Some(self.vault.open(&stored.blob)?)),
            None => Ok(None),
        }
    }

    fn save_profile(&self, profile: &UserProfile) -> SyncResult<()> {
        let blob = self.vault.seal(profile)?;
        self.store.user_profiles().put(&EncryptedProfile {
            user_id: profile.id.clone(),
            blob,
        })?;
        Ok(())
    }

    fn store_credentials(&self, email: &str, password: &str) -> SyncResult<()> {
        let sealed = self.vault.seal(&password)?;
        self.store.login_credentials().put(&StoredCredentials {
            email: email.to_string(),
            password: sealed,
        })?;
        Ok(())
    }

    /// Replaces the session with a server-issued one. If the previous session
    /// was provisional, local records move to the server's user id.
    fn establish_session(&self, payload: AuthPayload) -> SyncResult<AuthSession> {
        let previous = self.session()?;
        let session = AuthSession::new(payload.token, &payload.user);

        if let Some(prev) = previous.filter(|p| p.user_id != session.user_id) {
            self.store.user_profiles().delete(&prev.user_id)?;
            let invoices = self.store.invoices();
            for mut invoice in invoices.get_all()? {
                if invoice.user_id == prev.user_id {
                    invoice.user_id = session.user_id.clone();
                    invoices.put(&invoice)?;
                }
            }
            // The provisional account is settled; queued creations are done.
            if prev.is_provisional() {
                for entry in self.queue.pending()? {
                    if matches!(entry.mutation, Mutation::CreateUser { .. }) {
                        self.queue.remove(&entry.id)?;
                    }
                }
            }
        }

        self.store
            .auth_sessions()
            .replace_all(std::slice::from_ref(&session))?;
        self.save_profile(&payload.user)?;
        info!("session established for {}", session.email);
        Ok(session)
    }

    /// Re-keys the session and cached credentials after the account's email
    /// changed, so later logins and account checks match the new address.
    fn follow_email_change(&self, new_email: &str) -> SyncResult<()> {
        let Some(mut session) = self.session()? else {
            return Ok(());
        };
        if session.email == new_email {
            return Ok(());
        }
        let old_email = std::mem::replace(&mut session.email, new_email.to_string());

        let credentials = self.store.login_credentials();
        if let Some(mut stored) = credentials.get(&old_email)? {
            credentials.delete(&old_email)?;
            stored.email = new_email.to_string();
            credentials.put(&stored)?;
        }
        self.store
            .auth_sessions()
            .replace_all(std::slice::from_ref(&session))?;
        info!("account email changed from {old_email} to {new_email}");
        Ok(())
    }

    /// Drops cached data belonging to a different account than `email`.
    fn forget_other_user(&self, email: &str) -> SyncResult<()> {
        if let Some(existing) = self.session()? {
            if existing.email != email {
                info!("switching account from {}; clearing local data", existing.email);
                self.store.clear_all()?;
                self.queue.clear()?;
            }
        }
        Ok(())
    }

    fn publish(&self) {
        self.publish_invoices();
        self.publish_user();
    }

    fn publish_invoices(&self) {
        match self.store.invoices().get_all() {
            Ok(all) => {
                let visible: Vec<Invoice> = all.into_iter().filter(Invoice::is_visible).collect();
                self.invoices_tx.send_replace(visible);
            }
            Err(e) => error!("failed to read invoices for publishing: {e}"),
        }
    }

    fn publish_user(&self) {
        let profile = match self.session() {
            Ok(Some(session)) => match self.load_profile(&session.user_id) {
                Ok(profile) => profile,
                Err(SyncError::Decryption(e)) => {
                    warn!("cached profile unreadable, treating as no offline data: {e}");
                    None
                }
                Err(e) => {
                    error!("failed to load profile: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!("failed to read session: {e}");
                None
            }
        };
        self.user_tx.send_replace(profile);
    }
}

fn ack_to_result(success: bool, message: &str) -> SyncResult<()> {
    if success {
        Ok(())
    } else {
        Err(SyncError::remote("deleteInvoice", message))
    }
}
