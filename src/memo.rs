//! Entry memoizer: decides per locale entry whether stored work can be reused.
//! Tag = blake3(source text), truncated to 8 bytes and hex encoded.
//! A full re-scan of a file costs one hash per entry, never a translator call.

/// Number of hash bytes kept in an integrity tag.
const TAG_BYTES: usize = 8;

/// What the orchestrator must do with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Stored translation is current.
    Skip,
    /// Nothing stored for this key yet.
    Translate,
    /// Stored translation exists but its tag is missing or stale.
    Retranslate,
}

/// Stable content hash of `text`, identical across runs and platforms.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex()[..TAG_BYTES * 2].to_string()
}

/// Compare the current source against what was stored for the same key.
pub fn decide(source_text: &str, stored_translation: Option<&str>, stored_tag: Option<&str>) -> Decision {
    match (stored_translation, stored_tag) {
        (None, _) => Decision::Translate,
        (Some(_), Some(tag)) if tag == content_hash(source_text) => Decision::Skip,
        (Some(_), _) => Decision::Retranslate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hash_is_hex_and_fixed_width() {
        let tag = content_hash("Welcome to [GetTitle]");
        assert_eq!(tag.len(), TAG_BYTES * 2);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_known_value_is_stable() {
        // Pinned so a dependency bump that changes the digest is caught.
        assert_eq!(content_hash(""), "af1349b9f5f9a1a6");
    }

    #[test]
    fn test_decide_translate_when_nothing_stored() {
        assert_eq!(decide("Hello", None, None), Decision::Translate);
        assert_eq!(decide("Hello", None, Some("deadbeef")), Decision::Translate);
    }

    #[test]
    fn test_decide_skip_on_matching_tag() {
        let tag = content_hash("Hello");
        assert_eq!(decide("Hello", Some("안녕"), Some(&tag)), Decision::Skip);
    }

    #[test]
    fn test_decide_retranslate_on_missing_or_stale_tag() {
        let stale = content_hash("Hello there");
        assert_eq!(decide("Hello", Some("안녕"), None), Decision::Retranslate);
        assert_eq!(decide("Hello", Some("안녕"), Some(&stale)), Decision::Retranslate);
        // Source-identical fallback text with no tag still needs work.
        assert_eq!(decide("Hello", Some("Hello"), None), Decision::Retranslate);
    }

    proptest! {
        #[test]
        fn hash_is_deterministic(s in ".*") {
            prop_assert_eq!(content_hash(&s), content_hash(&s));
        }

        #[test]
        fn distinct_strings_hash_differently(a in ".{0,64}", b in ".{0,64}") {
            prop_assume!(a != b);
            prop_assert_ne!(content_hash(&a), content_hash(&b));
        }
    }
}
