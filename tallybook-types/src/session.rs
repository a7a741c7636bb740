use crate::profile::UserProfile;
use serde::{Deserialize, Serialize};

/// The authenticated identity on this device.
///
/// A session created by an offline signup has no token until the account is
/// created remotely; it is `provisional` until then.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub token: Option<String>,
    pub user_id: String,
    pub email: String,
}

impl AuthSession {
    pub fn new(token: String, user: &UserProfile) -> Self {
        Self {
            token: Some(token),
            user_id: user.id.clone(),
            email: user.email.clone(),
        }
    }

    pub fn provisional(user_id: String, email: String) -> Self {
        Self {
            token: None,
            user_id,
            email,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.token.is_none()
    }
}

/// Account details submitted at signup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub street_address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
}

impl NewUser {
    /// The profile this signup will produce, before the server assigns an id.
    pub fn profile(&self, id: String) -> UserProfile {
        UserProfile {
            id,
            company: self.company.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            street_address: self.street_address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip: self.zip.clone(),
            profile_picture: None,
        }
    }
}

/// Response of `createUser` and `loginUser`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    pub user: UserProfile,
}

/// Response of `deleteInvoice`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}
