//! Record kinds held by [`crate::LocalStore`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tallybook_crypto::SealedBlob;
use tallybook_types::{AuthSession, Invoice};

/// The four named collections of the local store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Invoices,
    UserProfile,
    LoginCredentials,
    AuthSession,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Invoices => "invoices",
            RecordKind::UserProfile => "userProfile",
            RecordKind::LoginCredentials => "loginCredentials",
            RecordKind::AuthSession => "authSession",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that can live in one of the store's collections.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    /// Key the record is stored under within its collection.
    fn record_id(&self) -> &str;
}

impl Record for Invoice {
    const KIND: RecordKind = RecordKind::Invoices;

    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Record for AuthSession {
    const KIND: RecordKind = RecordKind::AuthSession;

    fn record_id(&self) -> &str {
        &self.user_id
    }
}

/// The user profile as persisted: only the owner id is readable without
/// the vault key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedProfile {
    pub user_id: String,
    pub blob: SealedBlob,
}

impl Record for EncryptedProfile {
    const KIND: RecordKind = RecordKind::UserProfile;

    fn record_id(&self) -> &str {
        &self.user_id
    }
}

/// Credentials captured at offline signup, kept until the account exists
/// on the server. The password is sealed by the vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    pub email: String,
    pub password: SealedBlob,
}

impl Record for StoredCredentials {
    const KIND: RecordKind = RecordKind::LoginCredentials;

    fn record_id(&self) -> &str {
        &self.email
    }
}
