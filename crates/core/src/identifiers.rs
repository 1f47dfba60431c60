//! Validation for names and secrets that reach administrative SQL.
//!
//! MySQL cannot bind schema or account names as statement parameters, so
//! every identifier is checked against a strict allow-list before it is
//! spliced into a statement, and secrets are emitted as escaped literals.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Maximum identifier length accepted. MySQL user names are capped at 32.
pub const MAX_IDENTIFIER_LEN: usize = 32;

/// Prefix of every generated schema name.
pub const SCHEMA_PREFIX: &str = "DB_";

const SCHEMA_SUFFIX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} is {len} characters long, the limit is 32")]
    TooLong { kind: &'static str, len: usize },

    #[error("{kind} contains disallowed character {ch:?}")]
    InvalidChar { kind: &'static str, ch: char },
}

/// Check `value` against `[A-Za-z0-9_]{1,32}`.
///
/// `kind` names the value in the error ("schema name", "user name").
pub fn validate_identifier<'a>(kind: &'static str, value: &'a str) -> Result<&'a str, IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError::Empty { kind });
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(IdentifierError::InvalidChar { kind, ch });
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong {
            kind,
            len: value.len(),
        });
    }
    Ok(value)
}

/// Validate and backtick-quote a schema or account name.
pub fn quote_identifier(kind: &'static str, value: &str) -> Result<String, IdentifierError> {
    validate_identifier(kind, value).map(|v| format!("`{}`", v))
}

/// Render `secret` as a single-quoted SQL string literal.
///
/// Backslashes and quotes are escaped; NUL is rejected outright. The
/// escaping assumes the session's `sql_mode` lacks `NO_BACKSLASH_ESCAPES`,
/// which `AdminConnection::connect` checks.
pub fn quote_literal(kind: &'static str, secret: &str) -> Result<String, IdentifierError> {
    if secret.is_empty() {
        return Err(IdentifierError::Empty { kind });
    }
    if secret.contains('\0') {
        return Err(IdentifierError::InvalidChar { kind, ch: '\0' });
    }
    let mut out = String::with_capacity(secret.len() + 2);
    out.push('\'');
    for ch in secret.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            c => out.push(c),
        }
    }
    out.push('\'');
    Ok(out)
}

/// A fresh schema name: `DB_` followed by 12 random alphanumerics.
pub fn generate_schema_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SCHEMA_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", SCHEMA_PREFIX, suffix)
}
