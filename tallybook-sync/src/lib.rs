//! Offline-first sync engine for Tallybook.
//!
//! This crate wires the encrypted [`tallybook_storage::LocalStore`] and its
//! mutation queue to the remote invoicing API:
//! - [`ConnectivityMonitor`]: edge-triggered online/offline state
//! - [`RemoteGateway`]: the remote API, with [`GraphqlGateway`] over HTTP
//! - [`SyncCoordinator`]: write path, reconnect drain and reconciliation
//!
//! Reads always come from the local store; the server is authoritative and
//! overwrites local state after every drain.

pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod graphql;
pub mod telemetry;

pub use config::SyncConfig;
pub use connectivity::{Connectivity, ConnectivityMonitor, Subscription};
pub use coordinator::{
    create_coordinator_channel, CoordinatorCommand, CoordinatorHandle, DrainReport,
    SyncCoordinator,
};
pub use error::{SyncError, SyncResult};
pub use gateway::RemoteGateway;
pub use graphql::GraphqlGateway;
