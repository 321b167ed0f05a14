//! Identifier validation, case folding, quoting and reserved words.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed
//! as parameters in prepared statements, so every dynamic identifier goes
//! through this module before it reaches SQL text:
//!
//! 1. Validate it (null bytes, empty, excessive length)
//! 2. Fold its case according to the configured [`NameFormat`]
//! 3. Quote it with the dialect's [`QuoteStyle`] when it is reserved or not
//!    a plain identifier

use std::collections::HashSet;

use crate::config::NameFormat;
use crate::error::{DbError, Result};

/// Maximum identifier length (conservative limit across databases).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DbError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(DbError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DbError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Identifier quoting convention of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `[name]` (SQL Server)
    Bracket,
    /// `"name"` (ANSI, PostgreSQL, SQLite, DaMeng, InfluxDB)
    DoubleQuote,
    /// `` `name` `` (MySQL protocol)
    Backtick,
}

impl QuoteStyle {
    /// Quote a name, escaping the closing quote character by doubling it.
    pub fn quote(self, name: &str) -> String {
        match self {
            QuoteStyle::Bracket => format!("[{}]", name.replace(']', "]]")),
            QuoteStyle::DoubleQuote => format!("\"{}\"", name.replace('"', "\"\"")),
            QuoteStyle::Backtick => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Whether a name is already wrapped in this style's quotes.
    pub fn is_quoted(self, name: &str) -> bool {
        let (open, close) = match self {
            QuoteStyle::Bracket => ('[', ']'),
            QuoteStyle::DoubleQuote => ('"', '"'),
            QuoteStyle::Backtick => ('`', '`'),
        };
        name.len() >= 2 && name.starts_with(open) && name.ends_with(close)
    }
}

/// Whether `name` can appear unquoted: a letter or underscore followed by
/// letters, digits or underscores.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Apply a case-folding policy to a logical name.
pub fn fold_case(name: &str, format: NameFormat) -> String {
    match format {
        NameFormat::Default => name.to_string(),
        NameFormat::Upper => name.to_uppercase(),
        NameFormat::Lower => name.to_lowercase(),
        NameFormat::Underline => to_underline(name),
    }
}

/// Convert camel/pascal case to lower snake case.
///
/// An underscore is inserted at every lower→upper transition and before the
/// last capital of an acronym that is followed by a lowercase letter, so
/// `UserName` → `user_name`, `UserID` → `user_id`, `HTTPServer` → `http_server`.
pub fn to_underline(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Case-insensitive reserved-word dictionary.
#[derive(Debug, Clone, Default)]
pub struct ReservedWords {
    words: HashSet<String>,
}

impl ReservedWords {
    /// Build from a comma-separated list.
    pub fn from_list(list: &str) -> Self {
        Self::from_words(list.split(','))
    }

    /// Build from individual words (e.g. a catalog keyword query).
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_uppercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.words.contains(&name.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Name formatting rules of one connection.
///
/// Table names get the table prefix, then every name is case folded and
/// quoted when it is reserved or not a plain identifier.
#[derive(Debug, Clone)]
pub struct NameRules {
    pub prefix: Option<String>,
    pub format: NameFormat,
    pub style: QuoteStyle,
    pub reserved: ReservedWords,
}

impl NameRules {
    pub fn new(style: QuoteStyle) -> Self {
        Self {
            prefix: None,
            format: NameFormat::Default,
            style,
            reserved: ReservedWords::default(),
        }
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    pub fn with_format(mut self, format: NameFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_reserved(mut self, reserved: ReservedWords) -> Self {
        self.reserved = reserved;
        self
    }

    /// Quote a physical name if it needs quoting.
    pub fn quote(&self, name: &str) -> String {
        if self.style.is_quoted(name) {
            return name.to_string();
        }
        if self.reserved.contains(name) || !is_plain_identifier(name) {
            self.style.quote(name)
        } else {
            name.to_string()
        }
    }

    /// Physical column name.
    pub fn column(&self, name: &str) -> String {
        self.quote(&fold_case(name, self.format))
    }

    /// Physical table name, prefix applied once.
    pub fn table(&self, name: &str) -> String {
        self.quote(&self.table_raw(name))
    }

    /// Table name with prefix and folding but no quoting (catalog lookups).
    pub fn table_raw(&self, name: &str) -> String {
        let prefixed = match &self.prefix {
            Some(p) if !name.to_lowercase().starts_with(&p.to_lowercase()) => {
                format!("{}{}", p, name)
            }
            _ => name.to_string(),
        };
        fold_case(&prefixed, self.format)
    }

    /// Strip the table prefix from a physical name.
    pub fn logical_table(&self, physical: &str) -> String {
        match &self.prefix {
            Some(p)
                if physical.len() > p.len()
                    && physical.get(..p.len()).is_some_and(|h| h.eq_ignore_ascii_case(p)) =>
            {
                physical[p.len()..].to_string()
            }
            _ => physical.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("Order Details").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let err = validate_identifier("users\0; DROP TABLE x").unwrap_err();
        assert!(err.to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(&name).is_err());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }

    #[test]
    fn test_quote_styles_escape() {
        assert_eq!(QuoteStyle::Bracket.quote("table]name"), "[table]]name]");
        assert_eq!(QuoteStyle::DoubleQuote.quote("table\"name"), "\"table\"\"name\"");
        assert_eq!(QuoteStyle::Backtick.quote("table`name"), "`table``name`");
    }

    #[test]
    fn test_quote_sql_injection_safely_quoted() {
        let quoted = QuoteStyle::Bracket.quote("x]; DROP TABLE users; --");
        assert_eq!(quoted, "[x]]; DROP TABLE users; --]");
    }

    #[test]
    fn test_is_quoted() {
        assert!(QuoteStyle::Bracket.is_quoted("[Order]"));
        assert!(!QuoteStyle::Bracket.is_quoted("Order"));
        assert!(QuoteStyle::Backtick.is_quoted("`key`"));
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("user_name1"));
        assert!(is_plain_identifier("_tmp"));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier("Order Details"));
        assert!(!is_plain_identifier(""));
    }

    #[test]
    fn test_to_underline() {
        assert_eq!(to_underline("UserName"), "user_name");
        assert_eq!(to_underline("UserID"), "user_id");
        assert_eq!(to_underline("HTTPServer"), "http_server");
        assert_eq!(to_underline("Area2Code"), "area2_code");
        assert_eq!(to_underline("already_snake"), "already_snake");
        assert_eq!(to_underline("Create_Time"), "create_time");
    }

    #[test]
    fn test_fold_case() {
        assert_eq!(fold_case("UserName", NameFormat::Default), "UserName");
        assert_eq!(fold_case("UserName", NameFormat::Upper), "USERNAME");
        assert_eq!(fold_case("UserName", NameFormat::Lower), "username");
        assert_eq!(fold_case("UserName", NameFormat::Underline), "user_name");
    }

    #[test]
    fn test_name_rules() {
        let rules = NameRules::new(QuoteStyle::Bracket)
            .with_prefix(Some("t_".into()))
            .with_format(NameFormat::Underline)
            .with_reserved(ReservedWords::from_list("ORDER,USER"));

        assert_eq!(rules.table("OrderItem"), "t_order_item");
        assert_eq!(rules.table("t_OrderItem"), "t_order_item");
        assert_eq!(rules.column("User"), "[user]");
        assert_eq!(rules.column("[Order]"), "[order]");
        assert_eq!(rules.logical_table("T_order"), "order");
    }

    #[test]
    fn test_name_rules_quotes_non_plain() {
        let rules = NameRules::new(QuoteStyle::DoubleQuote);
        assert_eq!(rules.column("Order Details"), "\"Order Details\"");
        assert_eq!(rules.column("Name"), "Name");
    }

    #[test]
    fn test_reserved_words_case_insensitive() {
        let words = ReservedWords::from_list("ORDER, USER,Group,");
        assert_eq!(words.len(), 3);
        assert!(words.contains("order"));
        assert!(words.contains("Group"));
        assert!(!words.contains("orders"));
    }
}
