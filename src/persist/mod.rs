/// SQLite-backed journal sink.
pub mod sqlite;

use thiserror::Error;

use crate::{
    core::store::{StoreError, StoreSnapshotV1},
    op::StoredOp,
    types::{ContactId, OpSeq},
};

/// Failures raised while writing or reading the journal.
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite driver failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload (de)serialization failure.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// A journal row could not be decoded or disagrees with its own columns.
    #[error("journal row {seq} (contact {contact_id}) is unreadable: {reason}")]
    CorruptRow {
        /// Sequence of the row.
        seq: OpSeq,
        /// Contact the row claims to touch.
        contact_id: ContactId,
        /// What was wrong with it.
        reason: String,
    },
    /// A decoded row does not apply to the state rebuilt so far.
    #[error("journal row {seq} (contact {contact_id}) does not replay: {source}")]
    Replay {
        /// Sequence of the row.
        seq: OpSeq,
        /// Contact the row touches.
        contact_id: ContactId,
        /// Store rejection.
        source: StoreError,
    },
    /// The stored snapshot does not describe a consistent phonebook.
    #[error("snapshot is inconsistent: {0}")]
    Snapshot(StoreError),
    /// Anything else, already rendered.
    #[error("{0}")]
    Message(String),
}

/// Result alias for persistence calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable destination for journaled ops.
///
/// Implementations are driven from a blocking worker thread; a successful
/// `append_ops` means the ops are committed.
pub trait OpSink: Send {
    /// Appends `ops` atomically and returns the highest sequence written.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;
    /// Flushes buffered writes, if the sink buffers.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    /// Stores a snapshot covering everything up to `last_seq`.
    fn write_snapshot(&mut self, _snapshot: &StoreSnapshotV1, _last_seq: OpSeq) -> PersistResult<()> {
        Ok(())
    }
    /// Drops journal entries up to and including `seq` that a stored
    /// snapshot already covers. Returns how many were removed.
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
