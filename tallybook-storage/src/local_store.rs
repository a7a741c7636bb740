//! Typed local record store.
//!
//! All four record kinds share a single `records` table keyed by
//! `(kind, id)`. A row keeps the sequence number of its first insert, so an
//! overwrite does not move the record within `get_all`.

use crate::error::{StorageError, StorageResult};
use crate::mutation_queue::MutationQueue;
use crate::records::Record;
use rusqlite::{params, Connection, OptionalExtension};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tallybook_crypto::Salt;
use tracing::warn;

const VAULT_SALT_KEY: &str = "vault_salt";

/// Device-resident record store, the offline source of truth.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = crate::open_sqlite(path)?;
        initialize_store_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_store_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// The mutation queue persisted alongside these records.
    pub fn mutation_queue(&self) -> MutationQueue {
        MutationQueue::new(self.conn.clone())
    }

    /// Typed view over one collection.
    pub fn collection<R: Record>(&self) -> Collection<'_, R> {
        Collection {
            store: self,
            _record: PhantomData,
        }
    }

    pub fn invoices(&self) -> Collection<'_, tallybook_types::Invoice> {
        self.collection()
    }

    pub fn user_profiles(&self) -> Collection<'_, crate::EncryptedProfile> {
        self.collection()
    }

    pub fn login_credentials(&self) -> Collection<'_, crate::StoredCredentials> {
        self.collection()
    }

    pub fn auth_sessions(&self) -> Collection<'_, tallybook_types::AuthSession> {
        self.collection()
    }

    /// Wipes every record kind. Store metadata (the vault salt) survives so
    /// the same device secret keeps working after the next login.
    pub fn clear_all(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM records", [])?;
        Ok(())
    }

    /// Returns the salt for vault key derivation, creating it on first use.
    pub fn vault_salt(&self) -> StorageResult<Salt> {
        let conn = self.lock()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![VAULT_SALT_KEY],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(hex) = existing {
            return Ok(Salt::from_hex(&hex)?);
        }

        let salt = Salt::random();
        conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)",
            params![VAULT_SALT_KEY, salt.to_hex()],
        )?;
        Ok(salt)
    }

    pub(crate) fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

/// A typed view over one record collection of a [`LocalStore`].
pub struct Collection<'a, R> {
    store: &'a LocalStore,
    _record: PhantomData<R>,
}

impl<R: Record> Collection<'_, R> {
    /// Inserts or overwrites a record by id.
    pub fn put(&self, record: &R) -> StorageResult<()> {
        let data_json = serde_json::to_string(record)?;
        let conn = self.store.lock()?;
        conn.execute(
            r#"
            INSERT INTO records (kind, id, data_json) VALUES (?1, ?2, ?3)
            ON CONFLICT (kind, id) DO UPDATE SET data_json = excluded.data_json
            "#,
            params![R::KIND.as_str(), record.record_id(), data_json],
        )?;
        Ok(())
    }

    /// Gets a record by id.
    pub fn get(&self, id: &str) -> StorageResult<Option<R>> {
        let conn = self.store.lock()?;
        let data_json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM records WHERE kind = ?1 AND id = ?2",
                params![R::KIND.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;

        match data_json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    kind: R::KIND.as_str(),
                    id: id.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Gets all records of this kind in insertion order.
    ///
    /// Rows that no longer decode are logged and left out rather than
    /// hiding every other record.
    pub fn get_all(&self) -> StorageResult<Vec<R>> {
        let conn = self.store.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, data_json FROM records WHERE kind = ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![R::KIND.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, json) = row?;
            match serde_json::from_str(&json) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping undecodable {} record {id}: {e}", R::KIND),
            }
        }
        Ok(records)
    }

    /// Removes a record. Removing an absent id is not an error.
    pub fn delete(&self, id: &str) -> StorageResult<()> {
        let conn = self.store.lock()?;
        conn.execute(
            "DELETE FROM records WHERE kind = ?1 AND id = ?2",
            params![R::KIND.as_str(), id],
        )?;
        Ok(())
    }

    /// Replaces the whole collection with `records` in one transaction.
    pub fn replace_all(&self, records: &[R]) -> StorageResult<()> {
        let encoded = records
            .iter()
            .map(|r| Ok((r.record_id().to_string(), serde_json::to_string(r)?)))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut conn = self.store.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM records WHERE kind = ?1",
            params![R::KIND.as_str()],
        )?;
        {
            let mut insert = tx.prepare(
                r#"
                INSERT INTO records (kind, id, data_json) VALUES (?1, ?2, ?3)
                ON CONFLICT (kind, id) DO UPDATE SET data_json = excluded.data_json
                "#,
            )?;
            for (id, json) in &encoded {
                insert.execute(params![R::KIND.as_str(), id, json])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of records of this kind.
    pub fn count(&self) -> StorageResult<usize> {
        let conn = self.store.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE kind = ?1",
            params![R::KIND.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn initialize_store_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            data_json TEXT NOT NULL,
            UNIQUE (kind, id)
        );
        CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind, seq);

        CREATE TABLE IF NOT EXISTS mutation_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT,
            mutation_type TEXT,
            variables_json TEXT,
            idempotency_key TEXT,
            enqueued_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_mutation_queue_id ON mutation_queue(id);

        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallybook_types::{AuthSession, Invoice, InvoiceDraft};

    fn invoice(id: &str, number: &str) -> Invoice {
        let draft = InvoiceDraft {
            invoice_number: number.into(),
            invoice_amount: "10.00".parse().unwrap(),
            ..Default::default()
        };
        Invoice::local(id.into(), "user-1".into(), &draft)
    }

    #[test]
    fn overwrite_keeps_insertion_position() {
        let store = LocalStore::open_in_memory().unwrap();
        let invoices = store.invoices();
        invoices.put(&invoice("a", "INV-1")).unwrap();
        invoices.put(&invoice("b", "INV-2")).unwrap();

        let mut updated = invoice("a", "INV-1");
        updated.paid_status = true;
        invoices.put(&updated).unwrap();

        let all = invoices.get_all().unwrap();
        assert_eq!(all.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert!(all[0].paid_status);
    }

    #[test]
    fn kinds_do_not_collide_on_id() {
        let store = LocalStore::open_in_memory().unwrap();
        store.invoices().put(&invoice("user-1", "INV-1")).unwrap();
        store
            .auth_sessions()
            .put(&AuthSession::provisional("user-1".into(), "a@b.c".into()))
            .unwrap();

        assert_eq!(store.invoices().count().unwrap(), 1);
        assert_eq!(store.auth_sessions().count().unwrap(), 1);
        store.invoices().delete("user-1").unwrap();
        assert!(store.auth_sessions().get("user-1").unwrap().is_some());
    }

    #[test]
    fn vault_salt_is_stable_and_survives_clear() {
        let store = LocalStore::open_in_memory().unwrap();
        let first = store.vault_salt().unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.vault_salt().unwrap(), first);
    }
}
