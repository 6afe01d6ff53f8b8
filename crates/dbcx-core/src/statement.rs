//! Lightweight statement inspection

/// Keywords that introduce a row-returning statement
const ROW_RETURNING_PREFIXES: &[&str] = &[
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "VALUES", "TABLE", "EXEC", "PRAGMA",
];

/// Strip leading whitespace and `--` / `/* */` comments
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(idx) => after[idx + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(idx) => after[idx + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// First keyword of the statement, uppercased
pub fn leading_keyword(sql: &str) -> String {
    strip_leading_comments(sql)
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// Whether the statement is expected to produce a result set
pub fn returns_rows(sql: &str) -> bool {
    let keyword = leading_keyword(sql);
    ROW_RETURNING_PREFIXES.contains(&keyword.as_str())
}
