//! SQL text construction.
//!
//! DDL and batch SQL are assembled as text; there is no query-plan AST.
//! [`SqlBuilder`] collects fragments and finished statements, and
//! [`SelectBuilder`] holds the clauses of a single SELECT so pagination can
//! rewrite it without re-parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Accumulates SQL fragments into an ordered list of statements.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    current: String,
    statements: Vec<String>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the current statement.
    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.current.push_str(fragment);
        self
    }

    /// Append `items` separated by `sep`.
    pub fn push_list<I, S>(&mut self, items: I, sep: &str) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.current.push_str(sep);
            }
            self.current.push_str(item.as_ref());
        }
        self
    }

    /// Finish the current statement. Empty statements are discarded.
    pub fn end(&mut self) -> &mut Self {
        let stmt = std::mem::take(&mut self.current);
        let trimmed = stmt.trim();
        if !trimmed.is_empty() {
            self.statements.push(trimmed.to_string());
        }
        self
    }

    /// Add a complete statement; empty strings are skipped.
    pub fn statement(&mut self, sql: impl Into<String>) -> &mut Self {
        self.end();
        let sql = sql.into();
        if !sql.trim().is_empty() {
            self.statements.push(sql);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.current.trim().is_empty()
    }

    /// Finish and return all statements in order.
    pub fn into_statements(mut self) -> Vec<String> {
        self.end();
        self.statements
    }

    /// Finish and return the text of the current (single) statement.
    pub fn build(mut self) -> String {
        self.end();
        self.statements.join(";\n")
    }
}

/// Clauses of one SELECT statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectBuilder {
    /// Select list; `*` when empty.
    pub columns: String,
    /// FROM clause body (table, joins or derived table).
    pub table: String,
    pub where_clause: Option<String>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    /// Row limit rendered as `TOP n` (SQL Server family).
    pub top: Option<i64>,
    /// Trailing limit clause (`LIMIT ..`, `OFFSET .. FETCH ..`).
    pub limit: Option<String>,
}

impl SelectBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            columns: "*".to_string(),
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    /// Split a simple SELECT into its clauses.
    ///
    /// Returns `None` for statements that are not a single top-level
    /// SELECT ... FROM (CTEs, unions, TOP already present, existing LIMIT).
    pub fn parse(sql: &str) -> Option<SelectBuilder> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if find_keyword(sql, "select", 0) != Some(0) {
            return None;
        }
        if find_keyword(sql, "union", 0).is_some()
            || find_keyword(sql, "limit", 0).is_some()
            || find_keyword(sql, "fetch", 0).is_some()
        {
            return None;
        }
        let from = find_keyword(sql, "from", 0)?;
        let columns = sql["select".len()..from].trim();
        if starts_with_word(columns, "top") {
            return None;
        }

        let markers = [
            ("where", find_keyword(sql, "where", from)),
            ("group", find_keyword(sql, "group by", from)),
            ("having", find_keyword(sql, "having", from)),
            ("order", find_keyword(sql, "order by", from)),
        ];
        let mut found: Vec<(&str, usize)> = markers
            .iter()
            .filter_map(|(k, pos)| pos.map(|p| (*k, p)))
            .collect();
        found.sort_by_key(|(_, p)| *p);

        let table_end = found.first().map(|(_, p)| *p).unwrap_or(sql.len());
        let mut builder = SelectBuilder {
            columns: columns.to_string(),
            table: sql[from + "from".len()..table_end].trim().to_string(),
            ..SelectBuilder::default()
        };

        for (i, (kind, pos)) in found.iter().enumerate() {
            let end = found.get(i + 1).map(|(_, p)| *p).unwrap_or(sql.len());
            let keyword_len = match *kind {
                "group" => skip_two_words(&sql[*pos..]),
                "order" => skip_two_words(&sql[*pos..]),
                other => other.len(),
            };
            let body = sql[pos + keyword_len..end].trim().to_string();
            match *kind {
                "where" => builder.where_clause = Some(body),
                "group" => builder.group_by = Some(body),
                "having" => builder.having = Some(body),
                _ => builder.order_by = Some(body),
            }
        }
        Some(builder)
    }

    /// Whether the select list starts with DISTINCT.
    fn distinct_split(&self) -> (&str, &str) {
        let cols = self.columns.trim();
        if starts_with_word(cols, "distinct") {
            ("DISTINCT ", cols["distinct".len()..].trim_start())
        } else {
            ("", cols)
        }
    }
}

impl fmt::Display for SelectBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (distinct, cols) = self.distinct_split();
        let cols = if cols.is_empty() { "*" } else { cols };
        write!(f, "SELECT {}", distinct)?;
        if let Some(top) = self.top {
            write!(f, "TOP {} ", top)?;
        }
        write!(f, "{} FROM {}", cols, self.table)?;
        if let Some(w) = self.where_clause.as_deref().filter(|w| !w.is_empty()) {
            write!(f, " WHERE {}", w)?;
        }
        if let Some(g) = self.group_by.as_deref().filter(|g| !g.is_empty()) {
            write!(f, " GROUP BY {}", g)?;
        }
        if let Some(h) = self.having.as_deref().filter(|h| !h.is_empty()) {
            write!(f, " HAVING {}", h)?;
        }
        if let Some(o) = self.order_by.as_deref().filter(|o| !o.is_empty()) {
            write!(f, " ORDER BY {}", o)?;
        }
        if let Some(l) = self.limit.as_deref().filter(|l| !l.is_empty()) {
            write!(f, " {}", l)?;
        }
        Ok(())
    }
}

fn starts_with_word(s: &str, word: &str) -> bool {
    s.len() > word.len()
        && s.get(..word.len()).is_some_and(|head| head.eq_ignore_ascii_case(word))
        && s[word.len()..].starts_with(char::is_whitespace)
}

fn skip_two_words(s: &str) -> usize {
    // "GROUP   BY" / "ORDER BY": length up to the end of the second word.
    let first_end = s.find(char::is_whitespace).unwrap_or(s.len());
    let rest = &s[first_end..];
    let ws = rest.len() - rest.trim_start().len();
    first_end + ws + 2
}

/// Locate a keyword at parenthesis depth zero, outside quotes, at or after
/// byte offset `from`. Multi-word keywords match any whitespace between words.
pub fn find_keyword(sql: &str, keyword: &str, from: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let words: Vec<&str> = keyword.split_whitespace().collect();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'[' => quote = Some(b']'),
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {
                if depth == 0 && i >= from && is_word_start(bytes, i) {
                    if let Some(end) = match_words(sql, i, &words) {
                        if end >= bytes.len() || !is_ident_byte(bytes[end]) {
                            return Some(i);
                        }
                    }
                }
            }
        }
        i += 1;
    }
    None
}

/// Bytes of a UTF-8 sequence count as identifier bytes, so a keyword never
/// starts or ends inside a non-ASCII name.
fn is_ident_byte(b: u8) -> bool {
    b >= 0x80 || b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'@' || b == b'$'
}

fn is_word_start(bytes: &[u8], i: usize) -> bool {
    i == 0 || !is_ident_byte(bytes[i - 1])
}

fn match_words(sql: &str, start: usize, words: &[&str]) -> Option<usize> {
    let mut pos = start;
    for (n, word) in words.iter().enumerate() {
        if n > 0 {
            let rest = &sql[pos..];
            let ws = rest.len() - rest.trim_start().len();
            if ws == 0 {
                return None;
            }
            pos += ws;
        }
        let end = pos + word.len();
        if end > sql.len()
            || !sql.is_char_boundary(pos)
            || !sql.is_char_boundary(end)
            || !sql[pos..end].eq_ignore_ascii_case(word)
        {
            return None;
        }
        pos = end;
    }
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_builder_statements() {
        let mut b = SqlBuilder::new();
        b.push("CREATE TABLE t (").push_list(["a int", "b int"], ", ").push(")");
        b.end();
        b.statement("");
        b.statement("CREATE INDEX ix ON t (a)");
        assert_eq!(
            b.into_statements(),
            vec!["CREATE TABLE t (a int, b int)", "CREATE INDEX ix ON t (a)"]
        );
    }

    #[test]
    fn test_parse_simple_select() {
        let s = SelectBuilder::parse(
            "select Id, Name from Users where Age > 3 group by Id, Name having count(*) > 1 order by Id desc",
        )
        .unwrap();
        assert_eq!(s.columns, "Id, Name");
        assert_eq!(s.table, "Users");
        assert_eq!(s.where_clause.as_deref(), Some("Age > 3"));
        assert_eq!(s.group_by.as_deref(), Some("Id, Name"));
        assert_eq!(s.having.as_deref(), Some("count(*) > 1"));
        assert_eq!(s.order_by.as_deref(), Some("Id desc"));
    }

    #[test]
    fn test_parse_ignores_nested_keywords() {
        let s = SelectBuilder::parse(
            "SELECT * FROM (SELECT a FROM t WHERE x = 'order by') q WHERE q.a IN (SELECT b FROM u ORDER BY b)",
        )
        .unwrap();
        assert_eq!(s.table, "(SELECT a FROM t WHERE x = 'order by') q");
        assert_eq!(
            s.where_clause.as_deref(),
            Some("q.a IN (SELECT b FROM u ORDER BY b)")
        );
        assert!(s.order_by.is_none());
    }

    #[test]
    fn test_parse_rejects_complex_statements() {
        assert!(SelectBuilder::parse("SELECT a FROM t UNION SELECT a FROM u").is_none());
        assert!(SelectBuilder::parse("WITH c AS (SELECT 1) SELECT * FROM c").is_none());
        assert!(SelectBuilder::parse("SELECT TOP 5 * FROM t").is_none());
        assert!(SelectBuilder::parse("SELECT * FROM t LIMIT 5").is_none());
    }

    #[test]
    fn test_display_round_trip() {
        let sql = "SELECT DISTINCT Name FROM Users WHERE Age > 3 ORDER BY Name";
        let mut s = SelectBuilder::parse(sql).unwrap();
        assert_eq!(s.to_string(), sql);
        s.top = Some(10);
        assert_eq!(
            s.to_string(),
            "SELECT DISTINCT TOP 10 Name FROM Users WHERE Age > 3 ORDER BY Name"
        );
    }

    #[test]
    fn test_find_keyword_word_boundaries() {
        assert_eq!(find_keyword("SELECT orderby FROM t", "order by", 0), None);
        assert_eq!(find_keyword("SELECT a FROM t ORDER\n BY a", "order by", 0), Some(16));
        assert_eq!(find_keyword("SELECT t.from_date FROM t", "from", 0), Some(19));
    }

    #[test]
    fn test_find_keyword_non_ascii_names() {
        assert_eq!(find_keyword("SELECT é FROM t", "from", 0), Some(10));
        assert_eq!(find_keyword("SELECT * FROM caféorder", "order", 0), None);
        assert_eq!(find_keyword("SELECT * FROM 日本 ORDER BY a", "order by", 0), Some(21));
        assert!(SelectBuilder::parse("SELECT * FROM café_orders").is_some());
    }
}
