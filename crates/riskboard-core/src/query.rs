//! Read-only warehouse queries

use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable query text plus an optional row cap
///
/// Identity (and the result-cache key) is the exact text together with the
/// row limit; two queries differing only in whitespace are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    row_limit: Option<usize>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            row_limit: None,
        }
    }

    /// A query whose result is capped at `row_limit` rows
    pub fn limited(text: impl Into<String>, row_limit: usize) -> Self {
        Self {
            text: text.into(),
            row_limit: Some(row_limit),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.row_limit
    }

    /// SQL actually sent to the warehouse
    ///
    /// A limited query asks for one row more than its cap so the adapter can
    /// tell "exactly at the cap" apart from "cut short".
    pub fn effective_sql(&self) -> String {
        match self.row_limit {
            // Own lines, so a trailing `--` comment cannot swallow the paren
            Some(limit) => format!(
                "SELECT * FROM (\n{}\n) LIMIT {}",
                self.text.trim().trim_end_matches(';').trim_end(),
                limit.saturating_add(1)
            ),
            None => self.text.clone(),
        }
    }

    /// Whether the text is a single plain read (`SELECT` / `WITH`)
    ///
    /// Rejects a second statement after a `;` and any top-level data
    /// modification keyword, so `WITH x AS (...) DELETE ...` is not a read.
    /// String literals, quoted identifiers and comments are skipped.
    pub fn is_read_only(&self) -> bool {
        let words = match top_level_words(&self.text) {
            Some(words) => words,
            None => return false,
        };

        match words.first().map(String::as_str) {
            Some("SELECT" | "WITH") => {}
            _ => return false,
        }
        !words.iter().any(|w| WRITE_KEYWORDS.contains(&w.as_str()))
    }
}

// `INTO` covers `REPLACE INTO` without rejecting the `replace()` function
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "INTO", "UPDATE", "DELETE", "MERGE", "CREATE", "DROP", "ALTER", "TRUNCATE",
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "GRANT", "REVOKE",
];

/// Upper-cased keywords outside parentheses, strings and comments
///
/// `None` when the text holds more than one statement. Leading parentheses
/// are dropped so `(SELECT ...)` starts with `SELECT`.
fn top_level_words(sql: &str) -> Option<Vec<String>> {
    let body = strip_leading_comments(sql)
        .trim_start_matches(|c: char| c == '(' || c.is_whitespace());
    let mut words = Vec::new();

    let mut chars = body.char_indices();
    let mut depth = 0usize;
    let mut word = String::new();
    let mut statement_ended = false;

    while let Some((idx, c)) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if statement_ended {
                return None;
            }
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            if depth == 0 {
                words.push(word.to_ascii_uppercase());
            }
            word.clear();
        }

        match c {
            '\'' | '"' | '`' => {
                if statement_ended {
                    return None;
                }
                // Doubled quotes inside a literal close and reopen it
                for (_, q) in chars.by_ref() {
                    if q == c {
                        break;
                    }
                }
            }
            '-' if body[idx..].starts_with("--") => {
                for (_, n) in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if body[idx..].starts_with("/*") => {
                chars.next();
                let mut prev = ' ';
                for (_, n) in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            ';' => statement_ended = true,
            c if c.is_whitespace() => {}
            _ if statement_ended => return None,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    if !word.is_empty() && depth == 0 {
        words.push(word.to_ascii_uppercase());
    }

    Some(words)
}

fn strip_leading_comments(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start();
        if let Some(rest) = sql.strip_prefix("--") {
            sql = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            return sql;
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compact = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        match self.row_limit {
            Some(limit) => write!(f, "{} [limit {}]", compact, limit),
            None => write!(f, "{}", compact),
        }
    }
}
