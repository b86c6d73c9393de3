//! Seed identifier pattern validators (spec §4.10-R): the two shapes a
//! seed identifier may legally take, resolving `INVALID_IDENTIFIER_PATTERN`.
//!
//! Ported line-for-line in spirit from
//! `original_source/core/seed_validation/seed_pattern_validator.py`'s
//! `SchemaEntityExtractor`, `DirectoryExtractor`,
//! `SeedEnumeratedValidator`, and `TestPlaceholderValidator`.

use std::path::Path;

/// Derive the schema entity code from a seed file's path: the numeric
/// filename prefix with its leading (seed-level) digit replaced by `0`.
///
/// `db/2_seed_backend/21_write_side/214211_table.sql` → `"014211"`.
pub fn schema_entity(seed_path: &Path) -> String {
    let filename = seed_path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("");
    let digits: String = filename.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }
    format!("0{}", &digits[1..])
}

/// Derive the directory code from a seed file's path: the second numeric
/// path component (the first is the seed level).
///
/// `db/2_seed_backend/21_write_side/...` → `"21"`.
pub fn directory_code(seed_path: &Path) -> String {
    let numeric_dirs: Vec<String> = seed_path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter_map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                None
            } else {
                Some(digits)
            }
        })
        .collect();
    numeric_dirs.get(1).cloned().unwrap_or_default()
}

/// Validates the "enumerated" pattern:
/// `{entity:6}{directory:2}-{function:4}-{scenario:4}-0000-{counter:12}`.
pub fn is_enumerated(uuid_str: &str, schema_entity: &str, directory: &str) -> bool {
    if uuid_str.len() != 36 {
        return false;
    }
    let parts: Vec<&str> = uuid_str.split('-').collect();
    let [seg1, seg2, seg3, seg4, seg5] = parts.as_slice() else {
        return false;
    };

    let expected_prefix = format!("{schema_entity}{directory}").to_lowercase();
    if seg1.to_lowercase() != expected_prefix {
        return false;
    }

    if seg2.len() != 4 || !seg2.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }

    if !matches!(*seg3, "0000" | "1000" | "2000" | "3000") {
        return false;
    }

    if *seg4 != "0000" {
        return false;
    }

    seg5.len() == 12 && seg5.chars().all(|c| c.is_ascii_digit())
}

/// Validates the "test placeholder" pattern: all 32 non-hyphen characters
/// are the identical ASCII digit.
pub fn is_test_placeholder(uuid_str: &str) -> bool {
    if uuid_str.len() != 36 {
        return false;
    }
    let chars: String = uuid_str.chars().filter(|c| *c != '-').collect();
    if chars.len() != 32 {
        return false;
    }
    let first = match chars.chars().next() {
        Some(c) if c.is_ascii_digit() => c,
        _ => return false,
    };
    chars.chars().all(|c| c == first)
}

/// A value passes identifier-pattern validation if it matches either
/// pattern (spec §4.10-R).
pub fn matches_any(uuid_str: &str, schema_entity: &str, directory: &str) -> bool {
    is_enumerated(uuid_str, schema_entity, directory) || is_test_placeholder(uuid_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn schema_entity_replaces_seed_level_digit_with_zero() {
        let path = PathBuf::from("db/2_seed_backend/21_write_side/214211_tb.sql");
        assert_eq!(schema_entity(&path), "014211");
    }

    #[test]
    fn directory_code_picks_second_numeric_component() {
        let path = PathBuf::from("db/2_seed_backend/21_write_side/214211_tb.sql");
        assert_eq!(directory_code(&path), "21");
    }

    #[test]
    fn valid_enumerated_uuid_matches() {
        assert!(is_enumerated(
            "01421121-0000-0000-0000-000000000001",
            "014211",
            "21"
        ));
    }

    #[test]
    fn enumerated_uuid_rejects_wrong_prefix() {
        assert!(!is_enumerated(
            "99999999-0000-0000-0000-000000000001",
            "014211",
            "21"
        ));
    }

    #[test]
    fn enumerated_uuid_rejects_bad_scenario_segment() {
        assert!(!is_enumerated(
            "01421121-0000-9999-0000-000000000001",
            "014211",
            "21"
        ));
    }

    #[test]
    fn test_placeholder_all_same_digit_matches() {
        assert!(is_test_placeholder("11111111-1111-1111-1111-111111111111"));
    }

    #[test]
    fn test_placeholder_mixed_digits_does_not_match() {
        assert!(!is_test_placeholder("11111111-2222-2222-2222-222222222222"));
    }

    #[test]
    fn matches_any_accepts_either_pattern() {
        assert!(matches_any("11111111-1111-1111-1111-111111111111", "014211", "21"));
        assert!(matches_any(
            "01421121-0000-0000-0000-000000000001",
            "014211",
            "21"
        ));
        assert!(!matches_any(
            "not-a-uuid-at-all-xxxxxxxxxxxxxxxxxxxx",
            "014211",
            "21"
        ));
    }
}
