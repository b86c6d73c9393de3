//! SQL Scanner (spec §4.1): a small character-by-character state machine
//! shared by every component that needs to know where statements, strings,
//! and comments begin and end without re-implementing quoting rules.
//!
//! Grounded in `dibs-cli::main::split_sql_into_chunks`'s byte-index walk;
//! extended with nested block-comment depth tracking and a standalone
//! comment-validation pass, neither of which the teacher's chunker needed.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
    DollarQuoted,
}

struct ScanCursor<'a> {
    sql: &'a str,
    i: usize,
    state: State,
    block_depth: u32,
    dollar_tag: Option<&'a str>,
    paren_depth: i32,
}

impl<'a> ScanCursor<'a> {
    fn new(sql: &'a str) -> Self {
        ScanCursor {
            sql,
            i: 0,
            state: State::Default,
            block_depth: 0,
            dollar_tag: None,
            paren_depth: 0,
        }
    }

    fn byte(&self, offset: usize) -> Option<u8> {
        self.sql.as_bytes().get(self.i + offset).copied()
    }

    fn rest(&self) -> &'a str {
        &self.sql[self.i..]
    }
}

/// Split SQL text into individual statements.
///
/// Tracks parenthesis depth and quoting/comment state; a `;` only ends a
/// statement when encountered in default code at parenthesis depth 0. The
/// trailing partial statement (if non-empty after trimming) is also
/// emitted, matching the teacher's chunker behavior.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut cur = ScanCursor::new(sql);

    while cur.i < sql.len() {
        match cur.state {
            State::DollarQuoted => {
                if let Some(tag) = cur.dollar_tag {
                    if cur.rest().starts_with(tag) {
                        current.push_str(tag);
                        cur.i += tag.len();
                        cur.dollar_tag = None;
                        cur.state = State::Default;
                        continue;
                    }
                }
                let ch = cur.rest().chars().next().unwrap();
                current.push(ch);
                cur.i += ch.len_utf8();
                continue;
            }
            State::LineComment => {
                let ch = cur.rest().chars().next().unwrap();
                current.push(ch);
                cur.i += ch.len_utf8();
                if ch == '\n' {
                    cur.state = State::Default;
                }
                continue;
            }
            State::BlockComment => {
                if cur.rest().starts_with("/*") {
                    current.push_str("/*");
                    cur.i += 2;
                    cur.block_depth += 1;
                    continue;
                }
                if cur.rest().starts_with("*/") {
                    current.push_str("*/");
                    cur.i += 2;
                    cur.block_depth -= 1;
                    if cur.block_depth == 0 {
                        cur.state = State::Default;
                    }
                    continue;
                }
                let ch = cur.rest().chars().next().unwrap();
                current.push(ch);
                cur.i += ch.len_utf8();
                continue;
            }
            _ => {}
        }

        let ch = cur.rest().chars().next().unwrap();
        let ch_len = ch.len_utf8();

        match cur.state {
            State::SingleQuoted => {
                if ch == '\'' {
                    if cur.byte(1) == Some(b'\'') {
                        current.push_str("''");
                        cur.i += 2;
                        continue;
                    }
                    cur.state = State::Default;
                }
                current.push(ch);
                cur.i += ch_len;
                continue;
            }
            State::DoubleQuoted => {
                if ch == '"' {
                    if cur.byte(1) == Some(b'"') {
                        current.push_str("\"\"");
                        cur.i += 2;
                        continue;
                    }
                    cur.state = State::Default;
                }
                current.push(ch);
                cur.i += ch_len;
                continue;
            }
            State::Default => {}
            _ => unreachable!(),
        }

        if ch == '-' && cur.byte(1) == Some(b'-') {
            current.push_str("--");
            cur.i += 2;
            cur.state = State::LineComment;
            continue;
        }

        if ch == '/' && cur.byte(1) == Some(b'*') {
            current.push_str("/*");
            cur.i += 2;
            cur.block_depth = 1;
            cur.state = State::BlockComment;
            continue;
        }

        if ch == '$' {
            if let Some(tag) = dollar_tag_at(cur.rest()) {
                current.push_str(tag);
                cur.i += tag.len();
                cur.dollar_tag = Some(tag);
                cur.state = State::DollarQuoted;
                continue;
            }
        }

        if ch == '\'' {
            cur.state = State::SingleQuoted;
            current.push(ch);
            cur.i += ch_len;
            continue;
        }

        if ch == '"' {
            cur.state = State::DoubleQuoted;
            current.push(ch);
            cur.i += ch_len;
            continue;
        }

        if ch == '(' {
            cur.paren_depth += 1;
            current.push(ch);
            cur.i += ch_len;
            continue;
        }

        if ch == ')' {
            cur.paren_depth -= 1;
            current.push(ch);
            cur.i += ch_len;
            continue;
        }

        if ch == ';' && cur.paren_depth <= 0 {
            current.push(';');
            out.push(std::mem::take(&mut current));
            cur.i += ch_len;
            continue;
        }

        current.push(ch);
        cur.i += ch_len;
    }

    if !current.trim().is_empty() {
        out.push(current);
    }

    out
}

/// Find a `$tag$` opener at the start of `rest` (which begins with `$`),
/// returning the full tag text including both `$` delimiters.
fn dollar_tag_at(rest: &str) -> Option<&str> {
    let body = &rest[1..];
    let end_rel = body.find('$')?;
    let tag_body = &body[..end_rel];
    if tag_body.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        Some(&rest[..1 + end_rel + 1])
    } else {
        None
    }
}

/// A diagnostic produced by [`validate_comments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentDiagnostic {
    pub kind: CommentIssueKind,
    pub line: usize,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentIssueKind {
    /// A block comment reached end-of-input before closing.
    Unclosed,
    /// The input ended while scanner state was inside a block comment —
    /// i.e. this text, concatenated with whatever follows it, would have
    /// its continuation silently swallowed.
    Spillover,
}

/// Walk `sql` and report unclosed/spillover block comments (spec §4.1).
///
/// `Unclosed` and `Spillover` describe the same underlying fact (scanner
/// ended inside a block comment) from two angles the caller cares about
/// separately: `Unclosed` is reported always; `Spillover` is reported only
/// when the caller is concatenating this text with what follows (the
/// `build` command runs this once per source file and a second time over
/// the full concatenation, per the comment-validator redundancy note in
/// spec section 9), so both are emitted here and the caller decides which
/// it needs.
pub fn validate_comments(sql: &str) -> Vec<CommentDiagnostic> {
    let mut diagnostics = Vec::new();
    let mut state = State::Default;
    let mut depth: u32 = 0;
    let mut line = 1usize;
    let mut comment_start_line = 0usize;
    let mut comment_start_byte = 0usize;
    let mut in_single = false;
    let mut in_double = false;
    let mut dollar_tag: Option<&str> = None;

    let bytes = sql.as_bytes();
    let mut i = 0usize;
    while i < sql.len() {
        if bytes[i] == b'\n' {
            line += 1;
        }

        if state == State::BlockComment {
            if sql[i..].starts_with("/*") {
                depth += 1;
                i += 2;
                continue;
            }
            if sql[i..].starts_with("*/") {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    state = State::Default;
                }
                continue;
            }
            let ch = sql[i..].chars().next().unwrap();
            i += ch.len_utf8();
            continue;
        }

        if state == State::LineComment {
            let ch = sql[i..].chars().next().unwrap();
            i += ch.len_utf8();
            if ch == '\n' {
                state = State::Default;
            }
            continue;
        }

        if let Some(tag) = dollar_tag {
            if sql[i..].starts_with(tag) {
                i += tag.len();
                dollar_tag = None;
                continue;
            }
            let ch = sql[i..].chars().next().unwrap();
            i += ch.len_utf8();
            continue;
        }

        let ch = sql[i..].chars().next().unwrap();

        if in_single {
            if ch == '\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                in_single = false;
            }
            i += ch.len_utf8();
            continue;
        }

        if in_double {
            if ch == '"' {
                if bytes.get(i + 1) == Some(&b'"') {
                    i += 2;
                    continue;
                }
                in_double = false;
            }
            i += ch.len_utf8();
            continue;
        }

        if ch == '\'' {
            in_single = true;
            i += 1;
            continue;
        }
        if ch == '"' {
            in_double = true;
            i += 1;
            continue;
        }
        if ch == '-' && bytes.get(i + 1) == Some(&b'-') {
            state = State::LineComment;
            i += 2;
            continue;
        }
        if ch == '/' && bytes.get(i + 1) == Some(&b'*') {
            state = State::BlockComment;
            depth = 1;
            comment_start_line = line;
            comment_start_byte = i;
            i += 2;
            continue;
        }
        if ch == '$' {
            if let Some(tag) = dollar_tag_at(&sql[i..]) {
                i += tag.len();
                dollar_tag = Some(tag);
                continue;
            }
        }
        i += ch.len_utf8();
    }

    if state == State::BlockComment {
        let end = (comment_start_byte + 40).min(sql.len());
        let snippet = sql[comment_start_byte..end].to_string();
        diagnostics.push(CommentDiagnostic {
            kind: CommentIssueKind::Unclosed,
            line: comment_start_line,
            snippet: snippet.clone(),
        });
        diagnostics.push(CommentDiagnostic {
            kind: CommentIssueKind::Spillover,
            line: comment_start_line,
            snippet,
        });
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_statements() {
        let sql = "CREATE TABLE a (id int); CREATE TABLE b (id int);";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("TABLE a"));
        assert!(stmts[1].contains("TABLE b"));
    }

    #[test]
    fn semicolon_inside_single_quoted_string_does_not_split() {
        let sql = "INSERT INTO t (v) VALUES ('a;b');";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn doubled_single_quote_is_an_escape_not_a_close() {
        let sql = "INSERT INTO t (v) VALUES ('it''s; fine');";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("it''s"));
    }

    #[test]
    fn line_comment_containing_semicolon_does_not_split() {
        let sql = "SELECT 1; -- comment; with semicolon\nSELECT 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn dollar_quoted_function_body_does_not_split_on_inner_semicolons() {
        let sql = r#"
CREATE OR REPLACE FUNCTION trgfn_test() RETURNS trigger LANGUAGE plpgsql AS $$
BEGIN
    IF NOT (TRUE) THEN
        RAISE EXCEPTION 'nope';
    END IF;
    RETURN NEW;
END;
$$;

CREATE TRIGGER trg_test BEFORE INSERT ON t FOR EACH ROW EXECUTE FUNCTION trgfn_test();
"#;
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn tagged_dollar_quote_is_respected() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $body$ SELECT 1; $body$ LANGUAGE sql;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn nested_block_comments_track_depth() {
        let sql = "SELECT 1 /* outer /* inner */ still comment */; SELECT 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn trailing_partial_statement_without_semicolon_is_emitted() {
        let sql = "CREATE TABLE a (id int);\nSELECT 1";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1].trim(), "SELECT 1");
    }

    #[test]
    fn empty_input_yields_no_statements() {
        assert!(split_statements("").is_empty());
        assert!(split_statements("   \n  ").is_empty());
    }

    #[test]
    fn validate_comments_reports_no_issues_for_well_formed_sql() {
        let sql = "/* fine */ SELECT 1; -- trailing\n";
        assert!(validate_comments(sql).is_empty());
    }

    #[test]
    fn validate_comments_reports_unclosed_and_spillover() {
        let sql = "SELECT 1; /* oops, never closed";
        let diags = validate_comments(sql);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].kind, CommentIssueKind::Unclosed);
        assert_eq!(diags[1].kind, CommentIssueKind::Spillover);
    }

    #[test]
    fn validate_comments_tracks_nested_depth_before_declaring_unclosed() {
        let sql = "/* outer /* inner */ still open";
        let diags = validate_comments(sql);
        assert_eq!(diags.len(), 2);
    }
}
