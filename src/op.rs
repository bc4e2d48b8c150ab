//! Mutation operation model and persistence wrappers.

use serde::{Deserialize, Serialize};

use crate::{
    contact::Contact,
    types::{ContactId, OpSeq},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Immutable operation appended to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Insert a fully materialized contact.
    Create {
        /// Inserted record.
        contact: Contact,
    },
    /// Replace the fields of an existing contact.
    Update {
        /// Contact id to mutate.
        id: ContactId,
        /// Record after the update.
        contact: Contact,
        /// Record before the update.
        prev: Contact,
    },
    /// Remove a contact permanently.
    Delete {
        /// Removed record.
        contact: Contact,
        /// Listing position the record occupied.
        position: usize,
    },
}

impl Op {
    /// Journal label for the op, as stored in the `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Op::Create { .. } => "create",
            Op::Update { .. } => "update",
            Op::Delete { .. } => "delete",
        }
    }

    /// Id of the contact this op touches.
    pub fn contact_id(&self) -> ContactId {
        match self {
            Op::Create { contact } => contact.id,
            Op::Update { id, .. } => *id,
            Op::Delete { contact, .. } => contact.id,
        }
    }
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Operation timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}
