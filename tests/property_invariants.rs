use std::collections::BTreeSet;

use proptest::prelude::*;

use phonebook::{
    contact::ContactDraft,
    core::{
        indices::name_key,
        store::{ContactStore, StoreError},
    },
    types::ContactId,
};

const NAMES: [&str; 8] = [
    "Arto Hellas",
    "Ada Lovelace",
    "Dan Abramov",
    "Mary Poppendieck",
    "Grace Hopper",
    "Linus Torvalds",
    "Barbara Liskov",
    "Edsger Dijkstra",
];

#[derive(Debug, Clone)]
enum Action {
    Create { name_idx: u8, upper: bool, number: u32 },
    Update { target: u8, name_idx: u8, number: u32 },
    Delete { target: u8 },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..8, any::<bool>(), 1_000_000u32..99_999_999)
            .prop_map(|(name_idx, upper, number)| Action::Create { name_idx, upper, number }),
        (0u8..24, 0u8..8, 1_000_000u32..99_999_999)
            .prop_map(|(target, name_idx, number)| Action::Update { target, name_idx, number }),
        (0u8..24).prop_map(|target| Action::Delete { target }),
    ]
}

fn number_from(n: u32) -> String {
    format!("09-{n:07}")
}

fn pick(store: &ContactStore, target: u8) -> Option<ContactId> {
    let ids = store.ordered_ids();
    if ids.is_empty() {
        None
    } else {
        Some(ids[usize::from(target) % ids.len()])
    }
}

proptest! {
    #[test]
    fn random_sequences_keep_names_unique_and_indexed(actions in prop::collection::vec(action_strategy(), 1..200)) {
        let mut store = ContactStore::new();

        for action in actions {
            match action {
                Action::Create { name_idx, upper, number } => {
                    let base = NAMES[usize::from(name_idx)];
                    let name = if upper { base.to_uppercase() } else { base.to_string() };
                    let taken = store.find_by_name(&name).is_some();
                    let res = store.create(ContactDraft::new(name, number_from(number)));
                    prop_assert_eq!(res.is_err(), taken);
                }
                Action::Update { target, name_idx, number } => {
                    let Some(id) = pick(&store, target) else { continue; };
                    let name = NAMES[usize::from(name_idx)];
                    let owner = store.find_by_name(name).map(|c| c.id);
                    let res = store.update(id, ContactDraft::new(name, number_from(number)));
                    match owner {
                        Some(other) if other != id => {
                            prop_assert!(matches!(res, Err(StoreError::DuplicateName(_))));
                        }
                        _ => prop_assert!(res.is_ok()),
                    }
                }
                Action::Delete { target } => {
                    let Some(id) = pick(&store, target) else { continue; };
                    prop_assert!(store.delete(id).is_some());
                    prop_assert!(store.delete(id).is_none());
                }
            }

            let contacts = store.list();
            let keys: BTreeSet<String> = contacts.iter().map(|c| name_key(&c.name)).collect();
            prop_assert_eq!(keys.len(), contacts.len());
            for contact in &contacts {
                prop_assert_eq!(store.find_by_name(&contact.name).map(|c| c.id), Some(contact.id));
                prop_assert!(ContactDraft::new(contact.name.clone(), contact.number.clone()).validate().is_ok());
            }
            for name in NAMES {
                let scanned = contacts.iter().find(|c| name_key(&c.name) == name_key(name)).map(|c| c.id);
                prop_assert_eq!(store.find_by_name(name).map(|c| c.id), scanned);
            }
        }
    }

    #[test]
    fn short_names_are_never_stored(name in "[a-zA-Z]{0,2}", number in "[0-9]{8,12}") {
        let mut store = ContactStore::new();
        let res = store.create(ContactDraft::new(name, number));
        prop_assert!(matches!(res, Err(StoreError::Validation(_))));
        prop_assert_eq!(store.count(), 0);
    }

    #[test]
    fn short_numbers_are_never_stored(name in "[a-zA-Z ]{3,20}", number in "[0-9]{0,7}") {
        let mut store = ContactStore::new();
        let res = store.create(ContactDraft::new(name, number));
        prop_assert!(matches!(res, Err(StoreError::Validation(_))));
        prop_assert_eq!(store.count(), 0);
    }

    #[test]
    fn get_after_create_returns_the_input(name in "[a-zA-Z][a-zA-Z ]{2,20}", prefix in "[0-9]{2,3}", rest in "[0-9]{5,9}") {
        let mut store = ContactStore::new();
        let number = format!("{prefix}-{rest}");
        let (created, _) = store.create(ContactDraft::new(name.clone(), number.clone())).unwrap();
        let fetched = store.get(created.id).unwrap();
        prop_assert_eq!(&fetched.name, &name);
        prop_assert_eq!(&fetched.number, &number);
    }
}
