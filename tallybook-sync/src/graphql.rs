//! reqwest-backed [`RemoteGateway`] speaking the invoicing GraphQL API.
//!
//! Every call is a `POST {query, variables}` to the configured endpoint.
//! A request that never gets an HTTP response maps to `SyncError::Network`.
//! An error status, a GraphQL `errors` array or an unusable `data` payload
//! maps to `SyncError::Remote`.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tallybook_types::{
    AuthPayload, AuthSession, DeleteAck, Invoice, InvoiceDraft, NewUser, ProfileField, UserProfile,
};
use tracing::debug;

/// Header carrying the queue entry's idempotency key on creates.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const INVOICE_FIELDS: &str = "id invoiceNumber invoiceAmount paidStatus companyName \
    companyAddress companyEmail clientName clientAddress clientEmail dateCreated dueDate \
    details userID";

const USER_FIELDS: &str = "_id company name email streetAddress city state zip profilePicture";

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorMessage>,
}

#[derive(Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

/// HTTP client for the remote invoicing API.
pub struct GraphqlGateway {
    client: Client,
    endpoint: String,
}

impl GraphqlGateway {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.graphql_url(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one operation and decodes `data.<operation>`.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: String,
        variables: Value,
        auth: Option<&AuthSession>,
        idempotency_key: Option<&str>,
    ) -> SyncResult<T> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = auth.and_then(|a| a.token.as_deref()) {
            request = request.bearer_auth(token);
        }
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("{operation}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::remote(
                operation,
                format!("HTTP {status}: {}", truncate(&body, 200)),
            ));
        }

        let body: GraphqlResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::remote(operation, format!("invalid response body: {e}")))?;

        if !body.errors.is_empty() {
            let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(SyncError::remote(operation, messages.join("; ")));
        }

        let payload = body
            .data
            .and_then(|mut data| data.get_mut(operation).map(Value::take))
            .filter(|v| !v.is_null())
            .ok_or_else(|| SyncError::remote(operation, "response carried no data"))?;

        debug!("{operation} ok");
        serde_json::from_value(payload)
            .map_err(|e| SyncError::remote(operation, format!("unexpected payload: {e}")))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl RemoteGateway for GraphqlGateway {
    async fn fetch_invoices(&self, auth: &AuthSession) -> SyncResult<Vec<Invoice>> {
        self.execute(
            "invoices",
            format!("query Invoices($userId: ID!) {{ invoices(userID: $userId) {{ {INVOICE_FIELDS} }} }}"),
            json!({ "userId": auth.user_id }),
            Some(auth),
            None,
        )
        .await
    }

    async fn create_invoice(
        &self,
        auth: &AuthSession,
        invoice: &InvoiceDraft,
        idempotency_key: &str,
    ) -> SyncResult<Invoice> {
        let mut input = serde_json::to_value(invoice)?;
        if let Some(obj) = input.as_object_mut() {
            obj.insert("userID".into(), Value::String(auth.user_id.clone()));
        }
        self.execute(
            "createInvoice",
            format!(
                "mutation CreateInvoice($input: InvoiceInput!) {{ createInvoice(input: $input) {{ {INVOICE_FIELDS} }} }}"
            ),
            json!({ "input": input }),
            Some(auth),
            Some(idempotency_key),
        )
        .await
    }

    async fn update_invoice(
        &self,
        auth: &AuthSession,
        id: &str,
        paid_status: bool,
    ) -> SyncResult<Invoice> {
        self.execute(
            "updateInvoice",
            format!(
                "mutation UpdateInvoice($id: ID!, $paidStatus: Boolean!) {{ updateInvoice(id: $id, paidStatus: $paidStatus) {{ {INVOICE_FIELDS} }} }}"
            ),
            json!({ "id": id, "paidStatus": paid_status }),
            Some(auth),
            None,
        )
        .await
    }

    async fn delete_invoice(&self, auth: &AuthSession, id: &str) -> SyncResult<DeleteAck> {
        self.execute(
            "deleteInvoice",
            "mutation DeleteInvoice($id: ID!) { deleteInvoice(id: $id) { success message } }"
                .to_string(),
            json!({ "id": id }),
            Some(auth),
            None,
        )
        .await
    }

    async fn fetch_user(&self, auth: &AuthSession) -> SyncResult<UserProfile> {
        self.execute(
            "user",
            format!("query User($userId: ID!) {{ user(userId: $userId) {{ {USER_FIELDS} }} }}"),
            json!({ "userId": auth.user_id }),
            Some(auth),
            None,
        )
        .await
    }

    async fn change_profile_field(
        &self,
        auth: &AuthSession,
        field: ProfileField,
        value: &str,
    ) -> SyncResult<UserProfile> {
        let operation = field.operation_name();
        let argument = field.argument_name();
        let mut variables = serde_json::Map::new();
        variables.insert("userId".into(), Value::String(auth.user_id.clone()));
        variables.insert(argument.into(), Value::String(value.to_string()));

        self.execute(
            operation,
            format!(
                "mutation ($userId: ID!, ${argument}: String!) {{ {operation}(userId: $userId, {argument}: ${argument}) {{ {USER_FIELDS} }} }}"
            ),
            Value::Object(variables),
            Some(auth),
            None,
        )
        .await
    }

    async fn create_user(&self, new_user: &NewUser) -> SyncResult<AuthPayload> {
        self.execute(
            "createUser",
            format!(
                "mutation CreateUser($input: UserInput!) {{ createUser(input: $input) {{ token user {{ {USER_FIELDS} }} }} }}"
            ),
            json!({ "input": new_user }),
            None,
            None,
        )
        .await
    }

    async fn login_user(&self, email: &str, password: &str) -> SyncResult<AuthPayload> {
        self.execute(
            "loginUser",
            format!(
                "mutation LoginUser($email: String!, $password: String!) {{ loginUser(email: $email, password: $password) {{ token user {{ {USER_FIELDS} }} }} }}"
            ),
            json!({ "email": email, "password": password }),
            None,
            None,
        )
        .await
    }
}
