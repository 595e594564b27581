//! Conversation and message identifiers.
//!
//! Ids are `<prefix>_<utc timestamp>_<random>`: the timestamp keeps them
//! roughly sortable and the UUIDv4 part keeps two ids minted in the same
//! millisecond apart.

use chrono::Utc;
use uuid::Uuid;

const CONVERSATION_PREFIX: &str = "conv";
const MESSAGE_PREFIX: &str = "msg";

/// Return the supplied conversation id unchanged, or mint a new one.
///
/// Only a missing or empty id counts as absent; anything else, whitespace
/// included, is echoed byte for byte. Supplied ids are not checked for
/// collisions; their uniqueness is the caller's business.
pub fn ensure_conversation_id(supplied: Option<&str>) -> String {
    match supplied {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => generate(CONVERSATION_PREFIX),
    }
}

/// Mint a fresh message id. Never reused.
pub fn new_message_id() -> String {
    generate(MESSAGE_PREFIX)
}

fn generate(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        Utc::now().format("%Y%m%dT%H%M%S%3f"),
        Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_supplied_id_is_echoed() {
        for id in ["conv-1", "abc", "  padded  ", "01HZX3"] {
            assert_eq!(ensure_conversation_id(Some(id)), id);
        }
    }

    #[test]
    fn test_missing_or_empty_id_is_generated() {
        let id = ensure_conversation_id(None);
        assert!(id.starts_with("conv_"));

        let id = ensure_conversation_id(Some(""));
        assert!(id.starts_with("conv_"));
    }

    #[test]
    fn test_whitespace_id_is_echoed_unchanged() {
        assert_eq!(ensure_conversation_id(Some("   ")), "   ");
        assert_eq!(ensure_conversation_id(Some("\t")), "\t");
    }

    #[test]
    fn test_generated_ids_are_unique_in_tight_loop() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(ensure_conversation_id(None)));
        }
    }

    #[test]
    fn test_message_ids_use_own_prefix() {
        let a = new_message_id();
        let b = new_message_id();
        assert!(a.starts_with("msg_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_format() {
        let id = new_message_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), "20260101T120000123".len());
        assert_eq!(parts[2].len(), 32);
    }
}
