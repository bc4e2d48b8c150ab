use hashbrown::HashMap;

use crate::types::ContactId;

/// Unique index from normalized name to the contact holding it.
pub type NameIndex = HashMap<String, ContactId>;

/// Key under which a name is unique.
///
/// Names collide when they match after trimming and lowercasing, so
/// "Ada Lovelace" and " ada lovelace" cannot both be stored.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
