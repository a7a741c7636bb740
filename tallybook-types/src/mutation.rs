//! The closed set of remote writes that can wait in the mutation queue.

use crate::invoice::InvoiceDraft;
use crate::profile::ProfileField;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A remote write together with its payload.
///
/// Serialized adjacently tagged, so a queue row reads
/// `{"mutationType": "UPDATE_INVOICE", "variables": {"id": .., "paidStatus": ..}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "mutationType",
    content = "variables",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Mutation {
    /// `local_id` is the id the record carries on this device until the
    /// server assigns its own.
    CreateInvoice {
        local_id: String,
        invoice: InvoiceDraft,
    },
    UpdateInvoice {
        id: String,
        paid_status: bool,
    },
    DeleteInvoice {
        id: String,
    },
    UpdateProfile {
        field: ProfileField,
        value: String,
    },
    /// Account creation after an offline signup. The password is read from
    /// the sealed credential record at send time, never stored here.
    CreateUser {
        email: String,
    },
}

/// Payload-free discriminant of [`Mutation`], as stored in the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationType {
    CreateInvoice,
    UpdateInvoice,
    DeleteInvoice,
    UpdateProfile,
    CreateUser,
}

impl MutationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationType::CreateInvoice => "CREATE_INVOICE",
            MutationType::UpdateInvoice => "UPDATE_INVOICE",
            MutationType::DeleteInvoice => "DELETE_INVOICE",
            MutationType::UpdateProfile => "UPDATE_PROFILE",
            MutationType::CreateUser => "CREATE_USER",
        }
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE_INVOICE" => Ok(MutationType::CreateInvoice),
            "UPDATE_INVOICE" => Ok(MutationType::UpdateInvoice),
            "DELETE_INVOICE" => Ok(MutationType::DeleteInvoice),
            "UPDATE_PROFILE" => Ok(MutationType::UpdateProfile),
            "CREATE_USER" => Ok(MutationType::CreateUser),
            other => Err(format!("unknown mutation type {other:?}")),
        }
    }
}

impl Mutation {
    pub fn mutation_type(&self) -> MutationType {
        match self {
            Mutation::CreateInvoice { .. } => MutationType::CreateInvoice,
            Mutation::UpdateInvoice { .. } => MutationType::UpdateInvoice,
            Mutation::DeleteInvoice { .. } => MutationType::DeleteInvoice,
            Mutation::UpdateProfile { .. } => MutationType::UpdateProfile,
            Mutation::CreateUser { .. } => MutationType::CreateUser,
        }
    }

    /// The `variables` half of the serialized form.
    pub fn variables(&self) -> serde_json::Result<serde_json::Value> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("variables")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuilds a mutation from its stored type name and variables.
    pub fn from_parts(mutation_type: &str, variables: serde_json::Value) -> Result<Self, String> {
        let kind: MutationType = mutation_type.parse()?;
        serde_json::from_value(serde_json::json!({
            "mutationType": kind.as_str(),
            "variables": variables,
        }))
        .map_err(|e| format!("invalid variables for {kind}: {e}"))
    }

    /// Key of the record this write touches. Writes sharing a target must
    /// reach the server in the order they were issued.
    pub fn target(&self) -> String {
        match self {
            Mutation::CreateInvoice { local_id, .. } => format!("invoice:{local_id}"),
            Mutation::UpdateInvoice { id, .. } | Mutation::DeleteInvoice { id } => {
                format!("invoice:{id}")
            }
            Mutation::UpdateProfile { .. } => "profile".to_string(),
            Mutation::CreateUser { email } => format!("user:{email}"),
        }
    }

    /// The invoice id this write refers to, if any.
    pub fn invoice_id(&self) -> Option<&str> {
        match self {
            Mutation::CreateInvoice { local_id, .. } => Some(local_id.as_str()),
            Mutation::UpdateInvoice { id, .. } | Mutation::DeleteInvoice { id } => Some(id.as_str()),
            _ => None,
        }
    }

    /// Points an invoice write at `new_id` if it currently targets `old_id`.
    /// Returns whether anything changed.
    pub fn retarget_invoice(&mut self, old_id: &str, new_id: &str) -> bool {
        match self {
            Mutation::UpdateInvoice { id, .. } | Mutation::DeleteInvoice { id }
                if id.as_str() == old_id =>
            {
                *id = new_id.to_string();
                true
            }
            _ => false,
        }
    }
}

/// A queued write as it sits in the mutation queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMutation {
    pub id: String,
    /// Sent with the remote call so the server can drop a replayed create.
    pub idempotency_key: String,
    pub timestamp: DateTime<Utc>,
    pub mutation: Mutation,
}

impl PendingMutation {
    pub fn new(mutation: Mutation) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            idempotency_key: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            mutation,
        }
    }

    pub fn mutation_type(&self) -> MutationType {
        self.mutation.mutation_type()
    }
}
