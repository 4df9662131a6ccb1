//! Managed-rule labels.
//!
//! A rule is owned by asnwall when its description starts with
//! [`MANAGED_PREFIX`] followed by a decimal sequence number. The sequence
//! number is the identity of the rule across runs; its position in the
//! remote list is not.

/// Fixed label prefix of managed rules
pub const MANAGED_PREFIX: &str = "Block-Bad-ASNs-Part-";

/// Extract the sequence number from a managed label.
///
/// The match is anchored at the start only: `Block-Bad-ASNs-Part-7 (old)`
/// yields 7. Labels without digits after the prefix, or with a digit run
/// that does not fit in a `u32`, are foreign.
///
/// # Examples
/// ```
/// use asnwall::ruleset::parse_sequence;
/// assert_eq!(parse_sequence("Block-Bad-ASNs-Part-3"), Some(3));
/// assert_eq!(parse_sequence("Allow office"), None);
/// ```
pub fn parse_sequence(label: &str) -> Option<u32> {
    let rest = label.strip_prefix(MANAGED_PREFIX)?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    rest[..digits_end].parse().ok()
}

/// Label for the managed rule with the given sequence number
pub fn managed_label(sequence: u32) -> String {
    format!("{}{}", MANAGED_PREFIX, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_label() {
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-1"), Some(1));
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-42"), Some(42));
    }

    #[test]
    fn test_parse_ignores_trailing_text() {
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-12abc"), Some(12));
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-3 (legacy)"), Some(3));
    }

    #[test]
    fn test_parse_requires_prefix_at_start() {
        assert_eq!(parse_sequence(" Block-Bad-ASNs-Part-1"), None);
        assert_eq!(parse_sequence("Old Block-Bad-ASNs-Part-1"), None);
        assert_eq!(parse_sequence("block-bad-asns-part-1"), None);
    }

    #[test]
    fn test_parse_malformed_labels_are_foreign() {
        assert_eq!(parse_sequence(""), None);
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-"), None);
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-x1"), None);
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part--1"), None);
        // Overflows u32
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-99999999999"), None);
    }

    #[test]
    fn test_parse_arbitrary_unicode_does_not_panic() {
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-４"), None);
        assert_eq!(parse_sequence("Block-Bad-ASNs-Part-1é"), Some(1));
        assert_eq!(parse_sequence("ルール"), None);
    }

    #[test]
    fn test_label_roundtrip() {
        for n in [1, 9, 10, 4096] {
            assert_eq!(parse_sequence(&managed_label(n)), Some(n));
        }
        assert_eq!(managed_label(5), "Block-Bad-ASNs-Part-5");
    }
}
