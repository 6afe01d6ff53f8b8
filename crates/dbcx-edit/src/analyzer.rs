//! Deciding whether a query's result can be edited in place

use dbcx_core::{ColumnInfo, DbcxError, Provider, statement};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// Substring matches: `joined_at` or `is_selected` also disqualify a query
static JOIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)join").expect("valid regex"));
static SELECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)select").expect("valid regex"));
static UNION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)union").expect("valid regex"));
static GROUP_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)group\s+by").expect("valid regex"));
static FROM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bfrom\s+").expect("valid regex"));

pub const REASON_NOT_SELECT: &str = "Only SELECT queries can be edited";
pub const REASON_JOIN: &str = "Queries with JOIN cannot be edited";
pub const REASON_SUBQUERY: &str = "Queries with subqueries cannot be edited";
pub const REASON_UNION: &str = "Queries with UNION cannot be edited";
pub const REASON_GROUP_BY: &str = "Queries with GROUP BY cannot be edited";
pub const REASON_NO_FROM: &str = "Could not determine the source table";
pub const REASON_NO_PRIMARY_KEY: &str = "No primary key: editing not supported";

/// The single table behind a query result, and whether edits can be
/// written back to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableTableInfo {
    pub table: String,
    pub schema: Option<String>,
    pub database: Option<String>,
    pub primary_keys: Vec<String>,
    pub columns: Vec<ColumnInfo>,
    pub editable: bool,
    /// Set whenever `editable` is false
    pub reason: Option<String>,
}

impl EditableTableInfo {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            table: String::new(),
            schema: None,
            database: None,
            primary_keys: Vec::new(),
            columns: Vec::new(),
            editable: false,
            reason: Some(reason.into()),
        }
    }

    fn reject(mut self, reason: impl Into<String>) -> Self {
        self.editable = false;
        self.reason = Some(reason.into());
        self
    }

    /// `schema.table`, or just `table`
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        }
    }
}

/// Classify a query by its text alone.
///
/// Rejects anything that is not a plain single-table SELECT: JOINs, more
/// than one SELECT, UNION and GROUP BY. These match as case-insensitive
/// substrings, so identifiers containing them are rejected too; text inside
/// string literals and comments is ignored. The first FROM target is split into up to three
/// dotted parts read right to left as table, schema, database.
pub fn classify(query: &str) -> EditableTableInfo {
    let masked = mask_literals_and_comments(query);

    if statement::leading_keyword(&masked) != "SELECT" {
        return EditableTableInfo::rejected(REASON_NOT_SELECT);
    }
    if JOIN.is_match(&masked) {
        return EditableTableInfo::rejected(REASON_JOIN);
    }
    if SELECT.find_iter(&masked).count() > 1 {
        return EditableTableInfo::rejected(REASON_SUBQUERY);
    }
    if UNION.is_match(&masked) {
        return EditableTableInfo::rejected(REASON_UNION);
    }
    if GROUP_BY.is_match(&masked) {
        return EditableTableInfo::rejected(REASON_GROUP_BY);
    }

    let parts = FROM
        .find(&masked)
        .map(|m| identifier_parts(&masked[m.end()..]))
        .unwrap_or_default();
    let mut parts = parts.into_iter().rev();
    let Some(table) = parts.next() else {
        return EditableTableInfo::rejected(REASON_NO_FROM);
    };

    EditableTableInfo {
        table,
        schema: parts.next(),
        database: parts.next(),
        primary_keys: Vec::new(),
        columns: Vec::new(),
        editable: true,
        reason: None,
    }
}

/// Look up the table's columns and keep it editable only if it has a
/// primary key.
///
/// A failed lookup makes the result non-editable with the error as the
/// reason; only `NotConnected` is returned as `Err`.
#[tracing::instrument(skip(info, provider), fields(table = %info.qualified_name()))]
pub async fn enrich(
    info: EditableTableInfo,
    provider: &dyn Provider,
    database: Option<&str>,
) -> Result<EditableTableInfo, DbcxError> {
    if !info.editable {
        return Ok(info);
    }

    let database = info.database.as_deref().or(database).map(str::to_string);
    let columns = match provider
        .get_columns(database.as_deref(), &info.qualified_name())
        .await
    {
        Ok(columns) => columns,
        Err(e @ DbcxError::NotConnected(_)) => return Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "column lookup failed");
            return Ok(info.reject(format!("Could not load columns: {}", e)));
        }
    };

    let primary_keys: Vec<String> = columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .collect();
    if primary_keys.is_empty() {
        tracing::debug!("table has no primary key");
        return Ok(info.reject(REASON_NO_PRIMARY_KEY));
    }

    Ok(EditableTableInfo {
        primary_keys,
        columns,
        editable: true,
        reason: None,
        ..info
    })
}

/// Blank out single-quoted literals and comments, keeping one output
/// character per input character. Double quotes delimit identifiers and are
/// left alone.
fn mask_literals_and_comments(query: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Code,
        Literal,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(query.len());
    let mut mode = Mode::Code;
    let mut chars = query.chars().peekable();
    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match mode {
            Mode::Code => match c {
                '\'' => {
                    mode = Mode::Literal;
                    out.push(' ');
                }
                '-' if next == Some('-') => {
                    mode = Mode::LineComment;
                    out.push(' ');
                }
                '/' if next == Some('*') => {
                    chars.next();
                    mode = Mode::BlockComment;
                    out.push_str("  ");
                }
                _ => out.push(c),
            },
            Mode::Literal => {
                if c == '\'' {
                    mode = Mode::Code;
                }
                out.push(' ');
            }
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            Mode::BlockComment => {
                if c == '*' && next == Some('/') {
                    chars.next();
                    mode = Mode::Code;
                    out.push(' ');
                }
                out.push(' ');
            }
        }
    }
    out
}

/// Parse a dotted identifier at the start of `text`, unwrapping `"x"`,
/// `` `x` `` and `[x]` quoting
fn identifier_parts(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let (part, after) = match rest.chars().next() {
            Some(open @ ('"' | '`' | '[')) => {
                let close = if open == '[' { ']' } else { open };
                let body = &rest[1..];
                match body.find(close) {
                    Some(end) => (body[..end].to_string(), &body[end + 1..]),
                    None => break,
                }
            }
            Some(_) => {
                let end = rest
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$' || c == '#'))
                    .unwrap_or(rest.len());
                (rest[..end].to_string(), &rest[end..])
            }
            None => break,
        };
        if part.is_empty() {
            break;
        }
        parts.push(part);
        match after.strip_prefix('.') {
            Some(next) => rest = next,
            None => break,
        }
    }
    parts
}
