//! Shared tokenizing helpers used by both the DDL Parser (§4.2) and the
//! Seed Copy Converter (§4.11): splitting on a top-level separator while
//! treating parens and quotes as opaque, and grouping parenthesized/quoted
//! spans into single atomic tokens.

/// Split `text` on top-level occurrences of `sep`, treating parens and
/// quotes as opaque (a comma inside `numeric(10,2)` or a quoted string does
/// not split).
pub(crate) fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(ch);
            }
            '(' if !in_single && !in_double => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_single && !in_double => {
                depth -= 1;
                current.push(ch);
            }
            c if c == sep && depth == 0 && !in_single && !in_double => {
                out.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

/// Tokenize a statement into whitespace-separated words, treating a
/// parenthesized group or a quoted literal as a single atomic token so
/// `numeric(10,2)` and `'hello world'` never get split internally.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == ',' || ch == ';' {
            chars.next();
            continue;
        }
        if ch == '(' {
            let mut tok = String::new();
            let mut depth = 0i32;
            while let Some(&c) = chars.peek() {
                tok.push(c);
                chars.next();
                if c == '(' {
                    depth += 1;
                } else if c == ')' {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
            }
            tokens.push(tok);
            continue;
        }
        if ch == '\'' || ch == '"' {
            let quote = ch;
            let mut tok = String::new();
            tok.push(ch);
            chars.next();
            while let Some(c) = chars.next() {
                tok.push(c);
                if c == quote {
                    if chars.peek() == Some(&quote) {
                        tok.push(quote);
                        chars.next();
                        continue;
                    }
                    break;
                }
            }
            tokens.push(tok);
            continue;
        }
        let mut tok = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == ',' || c == ';' {
                break;
            }
            tok.push(c);
            chars.next();
        }
        tokens.push(tok);
    }

    tokens
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Find every top-level (paren/quote-opaque), whole-word, case-insensitive
/// occurrence of `keyword` in `text`, as `(start, end)` byte ranges.
fn top_level_keyword_spans(text: &str, keyword: &str) -> Vec<(usize, usize)> {
    let klen = keyword.len();
    let mut spans = Vec::new();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut prev_word_char = false;

    for (pos, ch) in text.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => depth += 1,
            ')' if !in_single && !in_double => depth -= 1,
            _ => {}
        }

        let end = pos + klen;
        if depth == 0
            && !in_single
            && !in_double
            && !prev_word_char
            && end <= text.len()
            && text.is_char_boundary(end)
            && text[pos..end].eq_ignore_ascii_case(keyword)
        {
            let next_is_word = text[end..].chars().next().map(is_word_char).unwrap_or(false);
            if !next_is_word {
                spans.push((pos, end));
            }
        }
        prev_word_char = is_word_char(ch);
    }
    spans
}

/// Byte offset of the first top-level, whole-word, case-insensitive
/// occurrence of `keyword` in `text`.
pub(crate) fn find_top_level_keyword(text: &str, keyword: &str) -> Option<usize> {
    top_level_keyword_spans(text, keyword).into_iter().next().map(|(start, _)| start)
}

/// Split `text` on every top-level, whole-word, case-insensitive
/// occurrence of `keyword` (e.g. `"union"`), treating parens and quotes as
/// opaque. The keyword itself is dropped from the output.
pub(crate) fn split_top_level_keyword(text: &str, keyword: &str) -> Vec<String> {
    let spans = top_level_keyword_spans(text, keyword);
    if spans.is_empty() {
        return vec![text.to_string()];
    }
    let mut out = Vec::with_capacity(spans.len() + 1);
    let mut start = 0usize;
    for (span_start, span_end) in spans {
        out.push(text[start..span_start].to_string());
        start = span_end;
    }
    out.push(text[start..].to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_top_level_ignores_commas_inside_parens() {
        let parts = split_top_level("numeric(10,2), text", ',');
        assert_eq!(parts, vec!["numeric(10,2)", " text"]);
    }

    #[test]
    fn tokenize_groups_parens_and_quotes_atomically() {
        let tokens = tokenize("users (id, name) 'hello, world'");
        assert_eq!(tokens, vec!["users", "(id, name)", "'hello, world'"]);
    }

    #[test]
    fn find_top_level_keyword_skips_matches_inside_identifiers() {
        assert_eq!(find_top_level_keyword("unionized text", "union"), None);
        assert_eq!(find_top_level_keyword("a UNION b", "union"), Some(2));
    }

    #[test]
    fn split_top_level_keyword_ignores_keyword_inside_parens_and_quotes() {
        let parts = split_top_level_keyword(
            "SELECT 1 UNION SELECT (a UNION b) UNION SELECT 'x UNION y'",
            "union",
        );
        assert_eq!(parts.len(), 3);
        assert!(parts[1].contains("(a UNION b)"));
        assert!(parts[2].contains("'x UNION y'"));
    }
}
