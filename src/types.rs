//! Shared primitive IDs.

/// Monotonic contact identifier, assigned by the store.
pub type ContactId = u64;
/// Monotonic operation sequence number.
pub type OpSeq = u64;

/// Parses the textual form of a [`ContactId`] as it appears in URLs and JSON.
///
/// Returns `None` for anything that is not a plain decimal id; callers treat
/// that the same as an id that does not exist.
pub fn parse_contact_id(raw: &str) -> Option<ContactId> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_plain_decimal_ids() {
        assert_eq!(parse_contact_id("42"), Some(42));
        assert_eq!(parse_contact_id(""), None);
        assert_eq!(parse_contact_id("+42"), None);
        assert_eq!(parse_contact_id("5f1e2a"), None);
        assert_eq!(parse_contact_id("99999999999999999999999"), None);
    }
}
