use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    contact::{Contact, ContactDraft, ValidationError},
    op::{Op, StoredOp},
    types::{ContactId, OpSeq},
};

use super::indices::{NameIndex, name_key};

/// Failures raised by [`ContactStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A field failed its length/format constraint.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Another contact already holds this name.
    #[error("expected `name` to be unique, value: `{0}`")]
    DuplicateName(String),
    /// No contact has this id.
    #[error("contact {0} not found")]
    NotFound(ContactId),
    /// Replay tried to insert an id that is already present.
    #[error("contact {0} already exists")]
    AlreadyExists(ContactId),
    /// A revert was requested for an op that is not the latest one.
    #[error("op {0} does not match the current store state")]
    OpMismatch(OpSeq),
}

/// Point-in-time copy of the store used for fast reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Next id to hand out.
    pub next_contact_id: ContactId,
    /// Next op sequence to hand out.
    pub next_op_seq: OpSeq,
    /// All contacts in listing order.
    pub contacts: Vec<Contact>,
}

/// Authoritative in-memory contact collection with a unique name index.
///
/// Every successful mutation yields a [`StoredOp`] that is also queued in
/// the pending buffer for the persistence layer.
#[derive(Debug, Default)]
pub struct ContactStore {
    records: HashMap<ContactId, Contact>,
    order: Vec<ContactId>,
    by_name: NameIndex,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
    next_contact_id: ContactId,
}

impl ContactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            next_op_seq: 1,
            next_contact_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Result<Self, StoreError> {
        let mut store = Self {
            next_contact_id: snapshot.next_contact_id,
            next_op_seq: snapshot.next_op_seq,
            ..Self::default()
        };

        for contact in snapshot.contacts {
            store.insert_record(contact, None)?;
        }

        Ok(store)
    }

    /// Exports the current state.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        StoreSnapshotV1 {
            next_contact_id: self.next_contact_id,
            next_op_seq: self.next_op_seq,
            contacts: self.list_cloned(),
        }
    }

    /// Validates `draft`, checks name uniqueness, and stores it under a new id.
    pub fn create(&mut self, draft: ContactDraft) -> Result<(Contact, StoredOp), StoreError> {
        draft.validate()?;
        if self.by_name.contains_key(&name_key(&draft.name)) {
            return Err(StoreError::DuplicateName(draft.name));
        }

        let id = self.next_contact_id;
        let contact = draft.into_contact(id);
        self.insert_record(contact.clone(), None)?;

        let stored = self.record_op(Op::Create {
            contact: contact.clone(),
        });
        Ok((contact, stored))
    }

    /// Replaces the fields of `id`, keeping the id.
    pub fn update(
        &mut self,
        id: ContactId,
        draft: ContactDraft,
    ) -> Result<(Contact, StoredOp), StoreError> {
        draft.validate()?;
        if !self.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        if let Some(owner) = self.by_name.get(&name_key(&draft.name))
            && *owner != id
        {
            return Err(StoreError::DuplicateName(draft.name));
        }

        let contact = draft.into_contact(id);
        let prev = self.replace_record(contact.clone())?;

        let stored = self.record_op(Op::Update {
            id,
            contact: contact.clone(),
            prev,
        });
        Ok((contact, stored))
    }

    /// Removes `id` if present. `None` means there was nothing to remove.
    pub fn delete(&mut self, id: ContactId) -> Option<StoredOp> {
        let (contact, position) = self.remove_record(id)?;
        Some(self.record_op(Op::Delete { contact, position }))
    }

    /// Re-applies a journaled op during reload. Fields are not re-validated.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), StoreError> {
        let seq = stored.seq;
        match stored.op {
            Op::Create { contact } => {
                self.insert_record(contact, None)?;
            }
            Op::Update { contact, .. } => {
                self.replace_record(contact)?;
            }
            Op::Delete { contact, .. } => {
                self.remove_record(contact.id)
                    .ok_or(StoreError::NotFound(contact.id))?;
            }
        }
        self.bump_next_seq_from(seq);
        Ok(())
    }

    /// Rolls back `stored`, which must be the latest op applied to this store.
    ///
    /// Used when an op could not be made durable. The op's sequence number is
    /// released for reuse.
    pub fn revert(&mut self, stored: &StoredOp) -> Result<(), StoreError> {
        if stored.seq != self.latest_op_seq() {
            return Err(StoreError::OpMismatch(stored.seq));
        }

        match &stored.op {
            Op::Create { contact } => {
                self.remove_record(contact.id)
                    .ok_or(StoreError::OpMismatch(stored.seq))?;
                if contact.id + 1 == self.next_contact_id {
                    self.next_contact_id = contact.id;
                }
            }
            Op::Update { prev, .. } => {
                self.replace_record(prev.clone())?;
            }
            Op::Delete { contact, position } => {
                self.insert_record(contact.clone(), Some(*position))?;
            }
        }

        self.pending_ops.retain(|op| op.seq != stored.seq);
        self.next_op_seq = stored.seq;
        Ok(())
    }

    /// Looks up a contact by id.
    pub fn get(&self, id: ContactId) -> Option<&Contact> {
        self.records.get(&id)
    }

    /// Owned variant of [`Self::get`].
    pub fn get_cloned(&self, id: ContactId) -> Option<Contact> {
        self.get(id).cloned()
    }

    /// Looks up a contact through the unique name index.
    pub fn find_by_name(&self, name: &str) -> Option<&Contact> {
        self.by_name
            .get(&name_key(name))
            .and_then(|id| self.records.get(id))
    }

    /// All contacts in listing order.
    pub fn list(&self) -> Vec<&Contact> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Owned variant of [`Self::list`].
    pub fn list_cloned(&self) -> Vec<Contact> {
        self.list().into_iter().cloned().collect()
    }

    /// Number of stored contacts.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Contact ids in listing order.
    pub fn ordered_ids(&self) -> &[ContactId] {
        &self.order
    }

    /// Takes every op produced since the last drain.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Sequence of the most recent op, or 0 when none was applied.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn record_op(&mut self, op: Op) -> StoredOp {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        let stored = StoredOp {
            seq,
            ts_ms: now_ms(),
            op,
        };
        self.pending_ops.push(stored.clone());
        stored
    }

    fn insert_record(&mut self, contact: Contact, position: Option<usize>) -> Result<(), StoreError> {
        if self.records.contains_key(&contact.id) {
            return Err(StoreError::AlreadyExists(contact.id));
        }
        let key = name_key(&contact.name);
        if self.by_name.contains_key(&key) {
            return Err(StoreError::DuplicateName(contact.name));
        }

        let id = contact.id;
        self.next_contact_id = self.next_contact_id.max(id.saturating_add(1));
        self.by_name.insert(key, id);
        match position {
            Some(pos) => self.order.insert(pos.min(self.order.len()), id),
            None => self.order.push(id),
        }
        self.records.insert(id, contact);
        Ok(())
    }

    fn replace_record(&mut self, contact: Contact) -> Result<Contact, StoreError> {
        let id = contact.id;
        let rec = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let old_key = name_key(&rec.name);
        let new_key = name_key(&contact.name);
        if old_key != new_key {
            if self.by_name.contains_key(&new_key) {
                return Err(StoreError::DuplicateName(contact.name));
            }
            self.by_name.remove(&old_key);
            self.by_name.insert(new_key, id);
        }

        Ok(std::mem::replace(rec, contact))
    }

    fn remove_record(&mut self, id: ContactId) -> Option<(Contact, usize)> {
        let contact = self.records.remove(&id)?;
        let key = name_key(&contact.name);
        if self.by_name.get(&key) == Some(&id) {
            self.by_name.remove(&key);
        }
        let position = self.order.iter().position(|x| *x == id).unwrap_or(self.order.len());
        if position < self.order.len() {
            self.order.remove(position);
        }
        Some((contact, position))
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
