//! Connection and database directives at the top of a script
//!
//! ```sql
//! -- Connection: Reporting
//! -- Database: analytics
//! SELECT * FROM events;
//! ```

use regex::Regex;
use std::sync::LazyLock;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^--\s*(connection|database)\s*:\s*(.*?)\s*$").expect("valid directive regex")
});

/// Targets named by a script's leading directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub connection: Option<String>,
    pub database: Option<String>,
}

impl Directives {
    pub fn is_empty(&self) -> bool {
        self.connection.is_none() && self.database.is_none()
    }
}

/// Read directives from the leading block of blank and `--` comment lines.
///
/// Returns the directives and the script with the directive lines removed.
/// Other comment lines are kept; scanning stops at the first line of code.
/// A directive with an empty value is dropped, and a repeated one keeps the
/// first value seen.
pub fn parse_directives(script: &str) -> (Directives, String) {
    let mut directives = Directives::default();
    let mut kept: Vec<&str> = Vec::new();
    let mut lines = script.lines();

    for line in lines.by_ref() {
        let trimmed = line.trim();
        if let Some(caps) = DIRECTIVE.captures(trimmed) {
            let value = caps[2].to_string();
            let slot = if caps[1].eq_ignore_ascii_case("connection") {
                &mut directives.connection
            } else {
                &mut directives.database
            };
            if slot.is_none() && !value.is_empty() {
                *slot = Some(value);
            }
            continue;
        }
        kept.push(line);
        if !trimmed.is_empty() && !trimmed.starts_with("--") {
            break;
        }
    }
    kept.extend(lines);

    (directives, kept.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reads_and_strips_both_directives() {
        let (directives, body) =
            parse_directives("-- Connection: Reporting\n--database:analytics\nSELECT 1;");
        assert_eq!(directives.connection.as_deref(), Some("Reporting"));
        assert_eq!(directives.database.as_deref(), Some("analytics"));
        assert_eq!(body, "SELECT 1;");
    }

    #[test]
    fn test_keeps_other_leading_comments() {
        let (directives, body) = parse_directives("-- weekly report\n\n-- DATABASE: sales\nSELECT 1");
        assert_eq!(directives.database.as_deref(), Some("sales"));
        assert_eq!(directives.connection, None);
        assert_eq!(body, "-- weekly report\n\nSELECT 1");
    }

    #[test]
    fn test_directives_after_code_are_ignored() {
        let script = "SELECT 1;\n-- Connection: other\nSELECT 2;";
        let (directives, body) = parse_directives(script);
        assert!(directives.is_empty());
        assert_eq!(body, script);
    }

    #[test]
    fn test_empty_value_and_repeats() {
        let (directives, _) =
            parse_directives("-- Connection:   \n-- Connection: first\n-- Connection: second\nSELECT 1");
        assert_eq!(directives.connection.as_deref(), Some("first"));
    }

    #[test]
    fn test_no_directives_returns_script() {
        let (directives, body) = parse_directives("UPDATE t SET a = 1");
        assert!(directives.is_empty());
        assert_eq!(body, "UPDATE t SET a = 1");
    }
}
