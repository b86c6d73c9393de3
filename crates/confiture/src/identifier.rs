//! Strict identifier validation and quoting (spec §9 "Identifier safety").
//!
//! Every identifier injected into dynamically-built SQL (tracking table name,
//! schema names in `DROP SCHEMA ... CASCADE`) must pass through here first.

use crate::error::ConfigError;

/// Validate a possibly schema-qualified identifier (`schema.table` or `table`).
///
/// Allows letters, digits, and underscores in each part, at most one `.`
/// separator, and rejects whitespace, quote characters, and semicolons
/// outright — these are the characters that make string-concatenated SQL
/// exploitable.
pub fn validate(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::InvalidIdentifier {
            name: name.to_string(),
            reason: "identifier is empty".to_string(),
        });
    }

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(ConfigError::InvalidIdentifier {
            name: name.to_string(),
            reason: "at most one '.' separator is allowed".to_string(),
        });
    }

    for part in &parts {
        if part.is_empty() {
            return Err(ConfigError::InvalidIdentifier {
                name: name.to_string(),
                reason: "empty component around '.'".to_string(),
            });
        }
        let first = part.chars().next().expect("non-empty");
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(ConfigError::InvalidIdentifier {
                name: name.to_string(),
                reason: format!("component {part:?} must start with a letter or underscore"),
            });
        }
        if !part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidIdentifier {
                name: name.to_string(),
                reason: format!(
                    "component {part:?} contains characters other than letters, digits, underscore"
                ),
            });
        }
    }

    Ok(())
}

/// Split a validated schema-qualified name into `(schema, table)`, defaulting
/// the schema to `public` when unqualified.
pub fn split_qualified(name: &str) -> (String, String) {
    match name.split_once('.') {
        Some((schema, table)) => (schema.to_string(), table.to_string()),
        None => ("public".to_string(), name.to_string()),
    }
}

/// Quote a single PostgreSQL identifier, doubling any embedded quotes.
///
/// Always quotes, even when unnecessary, to avoid surprises with reserved
/// words (`user`, `order`, `group`, ...).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified name, quoting each component.
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}
