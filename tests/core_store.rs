use phonebook::{
    contact::{ContactDraft, Field},
    core::store::{ContactStore, StoreError},
    op::Op,
};

fn draft(name: &str, number: &str) -> ContactDraft {
    ContactDraft::new(name, number)
}

#[test]
fn create_yields_monotonic_ids_and_seqs() {
    let mut store = ContactStore::new();
    let (c1, op1) = store.create(draft("Arto Hellas", "040-123456")).unwrap();
    let (c2, op2) = store.create(draft("Ada Lovelace", "39-5323523")).unwrap();
    let (c3, op3) = store.create(draft("Dan Abramov", "12-43234345")).unwrap();

    assert_eq!((c1.id, c2.id, c3.id), (1, 2, 3));
    assert_eq!((op1.seq, op2.seq, op3.seq), (1, 2, 3));
}

#[test]
fn created_contact_is_listed_and_readable() {
    let mut store = ContactStore::new();
    let (created, _) = store.create(draft("Ada Lovelace", "09-1234567")).unwrap();

    assert_eq!(created.name, "Ada Lovelace");
    assert_eq!(created.number, "09-1234567");

    let fetched = store.get(created.id).expect("present");
    assert_eq!(fetched, &created);
    assert_eq!(store.list_cloned(), vec![created]);
}

#[test]
fn short_fields_fail_validation_without_side_effects() {
    let mut store = ContactStore::new();

    let err = store.create(draft("A", "12345678")).unwrap_err();
    match err {
        StoreError::Validation(v) => {
            assert!(v.involves(Field::Name));
            assert!(!v.involves(Field::Number));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = store.create(draft("Ada Lovelace", "1234567")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(ref v) if v.involves(Field::Number)));

    assert_eq!(store.count(), 0);
    assert!(store.drain_pending_ops().is_empty());
    assert_eq!(store.latest_op_seq(), 0);
}

#[test]
fn duplicate_names_are_rejected_regardless_of_number_and_case() {
    let mut store = ContactStore::new();
    store.create(draft("Ada Lovelace", "09-1234567")).unwrap();

    let err = store.create(draft("Ada Lovelace", "040-9999999")).unwrap_err();
    assert_eq!(err, StoreError::DuplicateName("Ada Lovelace".to_string()));

    let err = store.create(draft("  ADA LOVELACE ", "040-9999999")).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateName(_)));

    assert_eq!(store.count(), 1);
}

#[test]
fn update_replaces_fields_and_keeps_id() {
    let mut store = ContactStore::new();
    let (ada, _) = store.create(draft("Ada Lovelace", "09-1234567")).unwrap();

    let (updated, op) = store.update(ada.id, draft("Ada King", "09-7654321")).unwrap();
    assert_eq!(updated.id, ada.id);
    assert_eq!(store.get(ada.id), Some(&updated));
    assert!(matches!(op.op, Op::Update { ref prev, .. } if *prev == ada));

    // Old name is free again; the new one is taken.
    store.create(draft("Ada Lovelace", "09-1111111")).unwrap();
    assert!(matches!(
        store.create(draft("ada king", "09-2222222")),
        Err(StoreError::DuplicateName(_))
    ));
}

#[test]
fn update_allows_keeping_or_recasing_own_name() {
    let mut store = ContactStore::new();
    let (ada, _) = store.create(draft("Ada Lovelace", "09-1234567")).unwrap();

    store.update(ada.id, draft("Ada Lovelace", "09-0000000")).unwrap();
    let (recased, _) = store.update(ada.id, draft("ADA LOVELACE", "09-0000000")).unwrap();
    assert_eq!(recased.name, "ADA LOVELACE");
    assert_eq!(store.find_by_name("ada lovelace").map(|c| c.id), Some(ada.id));
}

#[test]
fn update_rejects_missing_id_and_taken_name() {
    let mut store = ContactStore::new();
    let (ada, _) = store.create(draft("Ada Lovelace", "09-1234567")).unwrap();
    store.create(draft("Grace Hopper", "09-7654321")).unwrap();

    assert_eq!(
        store.update(99, draft("Nobody Here", "09-1234567")).unwrap_err(),
        StoreError::NotFound(99)
    );
    assert!(matches!(
        store.update(ada.id, draft("Grace Hopper", "09-1234567")),
        Err(StoreError::DuplicateName(_))
    ));
    assert!(matches!(
        store.update(ada.id, draft("Ad", "09-1234567")),
        Err(StoreError::Validation(_))
    ));
    assert_eq!(store.get(ada.id), Some(&ada));
}

#[test]
fn delete_is_idempotent() {
    let mut store = ContactStore::new();
    let (ada, _) = store.create(draft("Ada Lovelace", "09-1234567")).unwrap();

    assert!(store.delete(ada.id).is_some());
    assert!(store.delete(ada.id).is_none());
    assert!(store.delete(12345).is_none());
    assert!(store.get(ada.id).is_none());
    assert!(store.list().is_empty());

    // Name is released with the record.
    store.create(draft("Ada Lovelace", "09-1234567")).unwrap();
}

#[test]
fn revert_undoes_the_latest_op_exactly() {
    let mut store = ContactStore::new();
    let (a, _) = store.create(draft("Arto Hellas", "040-123456")).unwrap();
    let (b, _) = store.create(draft("Ada Lovelace", "09-1234567")).unwrap();
    store.create(draft("Dan Abramov", "12-43234345")).unwrap();
    let before = store.export_snapshot();

    let del = store.delete(b.id).expect("removed");
    store.revert(&del).unwrap();
    assert_eq!(store.export_snapshot(), before);

    let (_, upd) = store.update(a.id, draft("Arto Vihavainen", "040-654321")).unwrap();
    store.revert(&upd).unwrap();
    assert_eq!(store.export_snapshot(), before);

    let (_, created) = store.create(draft("Mary Poppendieck", "39-6423122")).unwrap();
    store.revert(&created).unwrap();
    assert_eq!(store.export_snapshot(), before);
    assert!(store.find_by_name("Mary Poppendieck").is_none());
}

#[test]
fn revert_refuses_stale_ops() {
    let mut store = ContactStore::new();
    let (_, first) = store.create(draft("Arto Hellas", "040-123456")).unwrap();
    store.create(draft("Ada Lovelace", "09-1234567")).unwrap();

    assert_eq!(store.revert(&first), Err(StoreError::OpMismatch(first.seq)));
    assert_eq!(store.count(), 2);
}

#[test]
fn blank_padded_names_do_not_meet_the_minimum() {
    let mut store = ContactStore::new();

    let err = store.create(draft("  A", "09-1234567")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(ref v) if v.involves(Field::Name)));
    let err = store.create(draft("   ", "09-1234567")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(ref v) if v.involves(Field::Name)));

    assert_eq!(store.count(), 0);
    assert!(store.find_by_name("").is_none());
}
