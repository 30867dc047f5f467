//! Artifact-name sanitisation.
//!
//! Upstream titles can contain characters that are reserved on common
//! filesystems; they are replaced with a hyphen. Non-printable characters
//! are dropped entirely.

/// Characters that are replaced with a hyphen in artifact names.
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Sanitise an upstream media title into a filesystem-safe artifact name.
pub fn sanitize_file_name(title: &str) -> String {
    title
        .chars()
        .filter_map(|c| {
            if RESERVED.contains(&c) {
                Some('-')
            } else if c.is_control() {
                None
            } else {
                Some(c)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // No reserved or control character survives sanitisation.
        #[test]
        fn prop_output_is_filesystem_safe(title in "\\PC{0,64}") {
            let sanitized = sanitize_file_name(&title);
            for c in sanitized.chars() {
                prop_assert!(!RESERVED.contains(&c), "reserved char '{}' survived", c);
                prop_assert!(!c.is_control(), "control char survived");
            }
        }

        // Sanitisation never grows the name.
        #[test]
        fn prop_output_never_longer(title in "\\PC{0,64}") {
            prop_assert!(sanitize_file_name(&title).chars().count() <= title.chars().count());
        }

        // Already-clean names pass through untouched.
        #[test]
        fn prop_clean_names_unchanged(title in "[a-zA-Z0-9 ._()-]{0,64}") {
            prop_assert_eq!(sanitize_file_name(&title), title);
        }
    }

    #[test]
    fn test_reserved_characters_become_hyphens() {
        assert_eq!(
            sanitize_file_name(r#"a/b\c:d*e?f"g<h>i|j"#),
            "a-b-c-d-e-f-g-h-i-j"
        );
    }

    #[test]
    fn test_control_characters_dropped() {
        assert_eq!(sanitize_file_name("clip\u{0}\u{7}name\n"), "clipname");
    }

    #[test]
    fn test_typical_title() {
        assert_eq!(
            sanitize_file_name("Live: Concert 1080p? (Official)"),
            "Live- Concert 1080p- (Official)"
        );
    }
}
