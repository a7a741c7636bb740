//! Shared types for the Tallybook offline engine.
//!
//! Everything that crosses a crate boundary lives here:
//! - [`Invoice`] and [`InvoiceDraft`] with their local sync flags
//! - [`UserProfile`] and the editable [`ProfileField`]s
//! - [`AuthSession`] and [`NewUser`] for signup/login
//! - [`Mutation`], the closed set of remote writes that can be queued
//!
//! Serialized field names are camelCase to match the remote API.

mod amount;
mod invoice;
mod mutation;
mod profile;
mod session;

pub use amount::{Amount, AmountError};
pub use invoice::{Invoice, InvoiceDraft};
pub use mutation::{Mutation, MutationType, PendingMutation};
pub use profile::{ProfileField, UserProfile};
pub use session::{AuthPayload, AuthSession, DeleteAck, NewUser};

/// Generates a fresh identifier for a record created on this device.
pub fn local_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
