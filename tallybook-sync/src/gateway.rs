//! The remote API surface the coordinator calls.

use crate::error::SyncResult;
use async_trait::async_trait;
use tallybook_types::{
    AuthPayload, AuthSession, DeleteAck, Invoice, InvoiceDraft, NewUser, ProfileField, UserProfile,
};

/// Remote invoicing API. Every operation is a single request; none of them
/// retry. Failures that should fall back to the offline path come back as
/// `SyncError::Network` or `SyncError::Remote`.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn fetch_invoices(&self, auth: &AuthSession) -> SyncResult<Vec<Invoice>>;

    /// `idempotency_key` lets the server drop a create it already applied.
    async fn create_invoice(
        &self,
        auth: &AuthSession,
        invoice: &InvoiceDraft,
        idempotency_key: &str,
    ) -> SyncResult<Invoice>;

    async fn update_invoice(
        &self,
        auth: &AuthSession,
        id: &str,
        paid_status: bool,
    ) -> SyncResult<Invoice>;

    async fn delete_invoice(&self, auth: &AuthSession, id: &str) -> SyncResult<DeleteAck>;

    async fn fetch_user(&self, auth: &AuthSession) -> SyncResult<UserProfile>;

    /// One of `changeCompany`, `changeStreetAddress`, ... chosen by `field`.
    async fn change_profile_field(
        &self,
        auth: &AuthSession,
        field: ProfileField,
        value: &str,
    ) -> SyncResult<UserProfile>;

    async fn create_user(&self, new_user: &NewUser) -> SyncResult<AuthPayload>;

    async fn login_user(&self, email: &str, password: &str) -> SyncResult<AuthPayload>;
}
