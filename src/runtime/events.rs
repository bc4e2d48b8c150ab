//! Runtime event stream payloads.

use crate::types::{ContactId, OpSeq};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEvent {
    /// A new contact was created.
    Created {
        /// Created contact id.
        id: ContactId,
    },
    /// An existing contact was updated.
    Updated {
        /// Updated contact id.
        id: ContactId,
    },
    /// A contact was removed.
    Deleted {
        /// Removed contact id.
        id: ContactId,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}
