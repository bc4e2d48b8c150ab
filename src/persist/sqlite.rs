//! SQLite-backed contact journal.
//!
//! `events` holds one row per contact mutation keyed by op sequence, with the
//! op kind and contact id kept in their own columns so a bad row can be named
//! without decoding it. `snapshots` holds whole-phonebook images; loading
//! starts from the newest one and replays the rows after it.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    core::store::{ContactStore, StoreSnapshotV1},
    op::{OP_FORMAT_VERSION, StoredOp, StoredOpEnvelope},
    types::{ContactId, OpSeq},
};

use super::{OpSink, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

const INSERT_EVENT: &str =
    "INSERT INTO events(seq, ts_ms, kind, contact_id, payload) VALUES (?1, ?2, ?3, ?4, ?5)";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    snapshot: StoreSnapshotV1,
}

/// An `events` row as read back, before its payload is trusted.
struct JournalRow {
    seq: OpSeq,
    ts_ms: u64,
    kind: String,
    contact_id: ContactId,
    payload: Vec<u8>,
}

impl JournalRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get::<_, i64>(0)? as OpSeq,
            ts_ms: row.get::<_, i64>(1)? as u64,
            kind: row.get(2)?,
            contact_id: row.get::<_, i64>(3)? as ContactId,
            payload: row.get(4)?,
        })
    }

    fn corrupt(&self, reason: String) -> PersistError {
        PersistError::CorruptRow {
            seq: self.seq,
            contact_id: self.contact_id,
            reason,
        }
    }

    /// Decodes the payload and checks it agrees with the row's own columns.
    fn decode(self) -> PersistResult<StoredOp> {
        let envelope: StoredOpEnvelope = serde_json::from_slice(&self.payload)
            .map_err(|err| self.corrupt(format!("payload does not decode: {err}")))?;
        if envelope.format_version != OP_FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "unsupported op format version {}",
                envelope.format_version
            )));
        }

        let mut stored = envelope.stored;
        if stored.op.kind() != self.kind {
            return Err(self.corrupt(format!(
                "row is `{}` but payload is `{}`",
                self.kind,
                stored.op.kind()
            )));
        }
        if stored.op.contact_id() != self.contact_id {
            return Err(self.corrupt(format!(
                "payload touches contact {}",
                stored.op.contact_id()
            )));
        }

        stored.seq = self.seq;
        stored.ts_ms = self.ts_ms;
        Ok(stored)
    }
}

/// SQLite implementation of [`crate::persist::OpSink`].
pub struct SqliteOpSink {
    conn: Connection,
}

impl SqliteOpSink {
    /// Opens or creates a journal at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        Self::prepare(Connection::open(path)?)
    }

    /// Opens a throwaway in-memory journal.
    pub fn open_in_memory() -> PersistResult<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> PersistResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn })
    }

    /// Rebuilds the phonebook from the newest snapshot plus the rows after it.
    pub fn load_store(&self) -> PersistResult<ContactStore> {
        let mut store = match self.load_latest_snapshot()? {
            Some(snapshot) => ContactStore::from_snapshot(snapshot).map_err(PersistError::Snapshot)?,
            None => ContactStore::new(),
        };

        let tail = self.load_events_after(store.latest_op_seq())?;
        debug!(from_seq = store.latest_op_seq(), rows = tail.len(), "replaying contact journal");
        for stored in tail {
            let (seq, contact_id) = (stored.seq, stored.op.contact_id());
            store.apply_replayed_op(stored).map_err(|source| {
                warn!(seq, contact_id, error = %source, "journal row does not replay");
                PersistError::Replay {
                    seq,
                    contact_id,
                    source,
                }
            })?;
        }
        Ok(store)
    }

    /// Decoded journal rows with a sequence strictly after `seq`, in order.
    pub fn load_events_after(&self, seq: OpSeq) -> PersistResult<Vec<StoredOp>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, ts_ms, kind, contact_id, payload FROM events WHERE seq > ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![seq as i64], JournalRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(JournalRow::decode).collect()
    }

    /// Stores a snapshot of the whole phonebook as of `last_seq`.
    pub fn write_snapshot(
        &mut self,
        snapshot: &StoreSnapshotV1,
        last_seq: OpSeq,
    ) -> PersistResult<()> {
        let payload = serde_json::to_vec(&SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        })?;
        let contacts = snapshot.contacts.len();
        self.conn.execute(
            "INSERT INTO snapshots(last_seq, contacts, ts_ms, payload) VALUES (?1, ?2, ?3, ?4)",
            params![last_seq as i64, contacts as i64, now_ms() as i64, payload],
        )?;
        debug!(last_seq, contacts, "wrote snapshot");
        Ok(())
    }

    /// Deletes rows up to and including `seq`, never past the newest
    /// snapshot. Returns how many rows were removed.
    pub fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        let covered = self.snapshot_seq()?;
        if covered < seq {
            debug!(requested = seq, covered, "compaction limited to snapshot coverage");
        }
        let removed = self.conn.execute(
            "DELETE FROM events WHERE seq <= ?1",
            params![seq.min(covered) as i64],
        )?;
        Ok(removed)
    }

    /// Highest sequence in the `events` table, or 0 when it is empty.
    pub fn latest_seq(&self) -> PersistResult<OpSeq> {
        let seq: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(seq), 0) FROM events", [], |row| row.get(0))?;
        Ok(seq as OpSeq)
    }

    fn snapshot_seq(&self) -> PersistResult<OpSeq> {
        let seq: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(last_seq), 0) FROM snapshots",
            [],
            |row| row.get(0),
        )?;
        Ok(seq as OpSeq)
    }

    fn load_latest_snapshot(&self) -> PersistResult<Option<StoreSnapshotV1>> {
        let row: Option<(i64, i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT last_seq, contacts, payload FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((last_seq, contacts, payload)) = row else {
            return Ok(None);
        };

        let env: SnapshotEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::Message(format!(
                "unsupported snapshot format version {}",
                env.format_version
            )));
        }
        if env.snapshot.contacts.len() as i64 != contacts {
            return Err(PersistError::Message(format!(
                "snapshot at seq {last_seq} lists {} contacts, expected {contacts}",
                env.snapshot.contacts.len()
            )));
        }
        debug!(last_seq, contacts, "loaded snapshot");
        Ok(Some(env.snapshot))
    }
}

impl OpSink for SqliteOpSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let Some(last) = ops.last() else {
            return self.latest_seq();
        };

        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(INSERT_EVENT)?;
            for stored in ops {
                let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
                insert.execute(params![
                    stored.seq as i64,
                    stored.ts_ms as i64,
                    stored.op.kind(),
                    stored.op.contact_id() as i64,
                    payload,
                ])?;
            }
        }
        tx.commit()?;

        debug!(first = ops[0].seq, last = last.seq, "appended journal rows");
        Ok(last.seq)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        SqliteOpSink::write_snapshot(self, snapshot, last_seq)
    }

    fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        SqliteOpSink::compact_through(self, seq)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
