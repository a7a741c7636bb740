//! Durable FIFO of remote writes waiting for the server.
//!
//! Rows live in the `mutation_queue` table of the store database. Every
//! column except `seq` is nullable: a row left by an older build, or damaged
//! on disk, is listed as a [`MalformedQueueEntry`] instead of failing the
//! whole read.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};
use tallybook_types::{Mutation, MutationType, PendingMutation};
use tracing::debug;

/// A queue row that cannot be turned back into a [`PendingMutation`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedQueueEntry {
    pub seq: i64,
    pub id: Option<String>,
    pub reason: String,
}

/// One row of the queue, in FIFO position `seq`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueItem {
    Pending { seq: i64, entry: PendingMutation },
    Malformed(MalformedQueueEntry),
}

impl QueueItem {
    pub fn seq(&self) -> i64 {
        match self {
            QueueItem::Pending { seq, .. } => *seq,
            QueueItem::Malformed(m) => m.seq,
        }
    }
}

/// Handle to the mutation queue. Cheap to clone; shares the store connection.
#[derive(Clone)]
pub struct MutationQueue {
    conn: Arc<Mutex<Connection>>,
}

struct RawRow {
    seq: i64,
    id: Option<String>,
    mutation_type: Option<String>,
    variables_json: Option<String>,
    idempotency_key: Option<String>,
    enqueued_at: Option<String>,
}

impl MutationQueue {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Appends an entry at the tail.
    pub fn enqueue(&self, entry: &PendingMutation) -> StorageResult<()> {
        let variables = entry.mutation.variables()?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO mutation_queue (id, mutation_type, variables_json, idempotency_key, enqueued_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.id,
                entry.mutation_type().as_str(),
                variables.to_string(),
                entry.idempotency_key,
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        debug!("enqueued {} {}", entry.mutation_type(), entry.id);
        Ok(())
    }

    /// All rows in insertion order.
    pub fn list(&self) -> StorageResult<Vec<QueueItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT seq, id, mutation_type, variables_json, idempotency_key, enqueued_at
            FROM mutation_queue ORDER BY seq
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawRow {
                seq: row.get(0)?,
                id: row.get(1)?,
                mutation_type: row.get(2)?,
                variables_json: row.get(3)?,
                idempotency_key: row.get(4)?,
                enqueued_at: row.get(5)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(parse_row(row?));
        }
        Ok(items)
    }

    /// Only the well-formed entries, in order.
    pub fn pending(&self) -> StorageResult<Vec<PendingMutation>> {
        Ok(self
            .list()?
            .into_iter()
            .filter_map(|item| match item {
                QueueItem::Pending { entry, .. } => Some(entry),
                QueueItem::Malformed(_) => None,
            })
            .collect())
    }

    /// Whether an entry with this id is still queued.
    pub fn contains(&self, id: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mutation_queue WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// Removes the entry with the given id. Returns whether a row was removed.
    pub fn remove(&self, id: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM mutation_queue WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Removes a row by queue position; the only way to drop a row with no id.
    pub fn discard(&self, seq: i64) -> StorageResult<bool> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM mutation_queue WHERE seq = ?1", params![seq])?;
        Ok(n > 0)
    }

    pub fn clear(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM mutation_queue", [])?;
        Ok(())
    }

    pub fn len(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrites queued update/delete entries that still point at a local
    /// invoice id to the id the server assigned. Returns the number of rows
    /// changed.
    pub fn retarget_invoice(&self, old_id: &str, new_id: &str) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let candidates: Vec<(i64, String, String)> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT seq, mutation_type, variables_json FROM mutation_queue
                WHERE mutation_type IN (?1, ?2) AND variables_json IS NOT NULL
                ORDER BY seq
                "#,
            )?;
            let rows = stmt.query_map(
                params![
                    MutationType::UpdateInvoice.as_str(),
                    MutationType::DeleteInvoice.as_str()
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            rows.collect::<Result<_, _>>()?
        };

        let mut changed = 0;
        for (seq, mutation_type, variables_json) in candidates {
            let Ok(variables) = serde_json::from_str(&variables_json) else {
                continue;
            };
            let Ok(mut mutation) = Mutation::from_parts(&mutation_type, variables) else {
                continue;
            };
            if mutation.retarget_invoice(old_id, new_id) {
                tx.execute(
                    "UPDATE mutation_queue SET variables_json = ?1 WHERE seq = ?2",
                    params![mutation.variables()?.to_string(), seq],
                )?;
                changed += 1;
            }
        }

        tx.commit()?;
        if changed > 0 {
            debug!("retargeted {changed} queued writes from {old_id} to {new_id}");
        }
        Ok(changed)
    }
}

fn parse_row(row: RawRow) -> QueueItem {
    let malformed = |reason: String| {
        QueueItem::Malformed(MalformedQueueEntry {
            seq: row.seq,
            id: row.id.clone(),
            reason,
        })
    };

    let Some(id) = row.id.clone() else {
        return malformed("missing id".into());
    };
    let Some(mutation_type) = row.mutation_type.as_deref() else {
        return malformed("missing mutation type".into());
    };
    let Some(variables_json) = row.variables_json.as_deref() else {
        return malformed("missing variables".into());
    };
    let variables = match serde_json::from_str(variables_json) {
        Ok(v) => v,
        Err(e) => return malformed(format!("variables are not JSON: {e}")),
    };
    let mutation = match Mutation::from_parts(mutation_type, variables) {
        Ok(m) => m,
        Err(reason) => return malformed(reason),
    };
    let timestamp = match row.enqueued_at.as_deref().map(parse_timestamp) {
        Some(Some(ts)) => ts,
        Some(None) => return malformed("unreadable timestamp".into()),
        None => return malformed("missing timestamp".into()),
    };

    // Rows from builds without idempotency keys reuse the entry id.
    let idempotency_key = row.idempotency_key.clone().unwrap_or_else(|| id.clone());

    QueueItem::Pending {
        seq: row.seq,
        entry: PendingMutation {
            id,
            idempotency_key,
            timestamp,
            mutation,
        },
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
