//! Schema Normalizer (spec §4.4): canonicalizes DDL text into a
//! deterministic, whitespace-insensitive, comment-stripped, table-sorted
//! form suitable for SHA-256 fingerprinting and fuzzy similarity.
//!
//! Grounded in `original_source/core/baseline_detector.py`'s
//! `normalize_schema`/`_sort_create_table_blocks`; strictly textual, as the
//! spec requires — it never parses types or constraints, that is the DDL
//! Parser's job at a different altitude of comparison.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

fn line_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--[^\n]*").unwrap())
}

fn if_not_exists_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bif\s+not\s+exists\b").unwrap())
}

fn if_exists_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bif\s+exists\b").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn create_table_boundary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?=create\s+table\s)").unwrap())
}

fn create_table_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^create\s+table\s+(\S+)").unwrap())
}

/// Normalize DDL text into canonical form (spec §4.4).
///
/// `normalize(normalize(x)) == normalize(x)` — the output is already in
/// normal form, so re-normalizing is a no-op (spec §8 idempotence law).
pub fn normalize(sql: &str) -> String {
    let no_block = block_comment_re().replace_all(sql, " ");
    let no_line = line_comment_re().replace_all(&no_block, " ");
    let lower = no_line.to_lowercase();
    let no_if_not_exists = if_not_exists_re().replace_all(&lower, "");
    let no_if_exists = if_exists_re().replace_all(&no_if_not_exists, "");
    let collapsed = whitespace_re()
        .replace_all(no_if_exists.trim(), " ")
        .to_string();
    sort_create_table_blocks(&collapsed)
}

/// Re-order top-level `CREATE TABLE` blocks alphabetically by table name.
/// Non-table SQL preceding the first `CREATE TABLE` is kept as a prefix.
fn sort_create_table_blocks(sql: &str) -> String {
    let parts: Vec<&str> = create_table_boundary_re().split(sql).collect();
    if parts.len() <= 1 {
        return sql.to_string();
    }

    let prefix = parts[0];
    let mut blocks: Vec<&str> = parts[1..].to_vec();
    blocks.sort_by_key(|block| table_name_of(block));

    let mut out = String::from(prefix);
    for block in blocks {
        out.push_str(block);
    }
    out
}

fn table_name_of(block: &str) -> String {
    create_table_name_re()
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| block.to_string())
}

/// SHA-256 fingerprint of already-normalized text, lowercase hex encoded.
pub fn fingerprint(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Convenience: normalize then fingerprint in one call.
pub fn normalize_and_fingerprint(sql: &str) -> (String, String) {
    let normalized = normalize(sql);
    let digest = fingerprint(&normalized);
    (normalized, digest)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_and_block_comments() {
        let sql = "-- a comment\nCREATE TABLE t (/* inline */ id int);";
        let normalized = normalize(sql);
        assert!(!normalized.contains("comment"));
        assert!(!normalized.contains("inline"));
    }

    #[test]
    fn lowercases_and_collapses_whitespace() {
        let sql = "CREATE   TABLE   T  (ID   INT);";
        let normalized = normalize(sql);
        assert_eq!(normalized, "create table t (id int);");
    }

    #[test]
    fn removes_if_not_exists_and_if_exists() {
        let sql = "CREATE TABLE IF NOT EXISTS t (id int); DROP TABLE IF EXISTS u;";
        let normalized = normalize(sql);
        assert!(!normalized.contains("if"));
    }

    #[test]
    fn sorts_create_table_blocks_alphabetically() {
        let sql = "create table zebra (id int); create table apple (id int);";
        let normalized = normalize(sql);
        assert!(normalized.find("apple").unwrap() < normalized.find("zebra").unwrap());
    }

    #[test]
    fn is_idempotent() {
        let sql = "-- c\nCREATE TABLE IF NOT EXISTS B (x INT);  CREATE TABLE A(y int);";
        let once = normalize(sql);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn fingerprint_is_stable_for_equal_normalized_text() {
        let a = normalize("CREATE TABLE t (id int);");
        let b = normalize("create   table   t  ( id   int );");
        assert_eq!(a, b);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }
}
