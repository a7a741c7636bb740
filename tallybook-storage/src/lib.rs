//! SQLite storage layer for the Tallybook offline engine.
//!
//! One database file per signed-in device holds:
//! - four record collections (invoices, encrypted user profile, sealed login
//!   credentials, auth session), stored as typed JSON rows
//! - the mutation queue of writes waiting for the server
//! - store metadata such as the vault salt
//!
//! Everything shares one connection, so the queue has exactly the same
//! durability as the records it describes.

mod error;
mod local_store;
mod mutation_queue;
mod records;

pub use error::{StorageError, StorageResult};
pub use local_store::{Collection, LocalStore};
pub use mutation_queue::{MalformedQueueEntry, MutationQueue, QueueItem};
pub use records::{EncryptedProfile, Record, RecordKind, StoredCredentials};

use rusqlite::Connection;
use std::time::Duration;

/// Opens a SQLite database with the pragmas the engine relies on.
///
/// WAL keeps readers from blocking the drain path; the busy timeout covers a
/// second process (or test harness) briefly holding the write lock.
pub fn open_sqlite(path: &std::path::Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> StorageResult<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}
