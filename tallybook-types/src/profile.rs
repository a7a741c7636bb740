use serde::{Deserialize, Serialize};
use std::fmt;

/// Personal and business details of the signed-in user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub street_address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl UserProfile {
    /// Applies a single field edit in place.
    pub fn apply(&mut self, field: ProfileField, value: &str) {
        let value = value.to_string();
        match field {
            ProfileField::Company => self.company = value,
            ProfileField::StreetAddress => self.street_address = value,
            ProfileField::Email => self.email = value,
            ProfileField::City => self.city = value,
            ProfileField::State => self.state = value,
            ProfileField::Zip => self.zip = value,
            ProfileField::ProfilePicture => {
                self.profile_picture = if value.is_empty() { None } else { Some(value) }
            }
        }
    }
}

/// Profile fields that can be edited one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    Company,
    StreetAddress,
    Email,
    City,
    State,
    Zip,
    ProfilePicture,
}

impl ProfileField {
    pub const ALL: [ProfileField; 7] = [
        ProfileField::Company,
        ProfileField::StreetAddress,
        ProfileField::Email,
        ProfileField::City,
        ProfileField::State,
        ProfileField::Zip,
        ProfileField::ProfilePicture,
    ];

    /// Name of the remote operation that edits this field.
    pub fn operation_name(&self) -> &'static str {
        match self {
            ProfileField::Company => "changeCompany",
            ProfileField::StreetAddress => "changeStreetAddress",
            ProfileField::Email => "changeEmail",
            ProfileField::City => "changeCity",
            ProfileField::State => "changeState",
            ProfileField::Zip => "changeZip",
            ProfileField::ProfilePicture => "changeProfilePicture",
        }
    }

    /// Argument name the remote operation expects for the new value.
    pub fn argument_name(&self) -> &'static str {
        match self {
            ProfileField::Company => "company",
            ProfileField::StreetAddress => "streetAddress",
            ProfileField::Email => "email",
            ProfileField::City => "city",
            ProfileField::State => "state",
            ProfileField::Zip => "zip",
            ProfileField::ProfilePicture => "profilePicture",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.argument_name())
    }
}
