use crate::amount::Amount;
use serde::{Deserialize, Serialize};

/// An invoice as held on the device.
///
/// The wire fields mirror the remote API. `synced`, `updated_locally` and
/// `deleted_locally` never leave the device; they default to `false` when a
/// server payload is decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub invoice_amount: Amount,
    pub paid_status: bool,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub company_address: String,
    #[serde(default)]
    pub company_email: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_address: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub date_created: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub details: String,
    #[serde(default, rename = "userID", alias = "userId")]
    pub user_id: String,

    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub updated_locally: bool,
    #[serde(default)]
    pub deleted_locally: bool,
}

impl Invoice {
    /// Builds a record for an invoice created on this device, not yet known
    /// to the server.
    pub fn local(id: String, user_id: String, draft: &InvoiceDraft) -> Self {
        Self {
            id,
            invoice_number: draft.invoice_number.clone(),
            invoice_amount: draft.invoice_amount,
            paid_status: draft.paid_status,
            company_name: draft.company_name.clone(),
            company_address: draft.company_address.clone(),
            company_email: draft.company_email.clone(),
            client_name: draft.client_name.clone(),
            client_address: draft.client_address.clone(),
            client_email: draft.client_email.clone(),
            date_created: draft.date_created.clone(),
            due_date: draft.due_date.clone(),
            details: draft.details.clone(),
            user_id,
            synced: false,
            updated_locally: false,
            deleted_locally: false,
        }
    }

    /// Marks a server-returned record as the canonical copy.
    pub fn into_synced(mut self) -> Self {
        self.synced = true;
        self.updated_locally = false;
        self.deleted_locally = false;
        self
    }

    /// Whether the record should be shown to the user.
    pub fn is_visible(&self) -> bool {
        !self.deleted_locally
    }

    /// Whether the record carries changes the server has not acknowledged.
    pub fn is_dirty(&self) -> bool {
        !self.synced || self.updated_locally || self.deleted_locally
    }
}

/// Fields supplied when creating an invoice. The owner is resolved from the
/// auth session when the create is sent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDraft {
    pub invoice_number: String,
    pub invoice_amount: Amount,
    #[serde(default)]
    pub paid_status: bool,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub company_address: String,
    #[serde(default)]
    pub company_email: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_address: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub date_created: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub details: String,
}
