//! Script → statement splitting

use dbcx_core::Dialect;

/// Lexical context of the scanner. The modes are mutually exclusive: a quote
/// inside a comment and a comment marker inside a literal are plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Default,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

/// Split a script into individually executable statements.
///
/// Document-store scripts are returned whole (trimmed). SQL scripts are split
/// on semicolons outside of quotes and comments; each statement is trimmed,
/// empty ones are dropped and source order is kept. Comments stay attached
/// to the statement they appear in.
pub fn split_statements(script: &str, dialect: Dialect) -> Vec<String> {
    if dialect.is_document_store() {
        let trimmed = script.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut mode = Mode::Default;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match mode {
            Mode::Default => match c {
                ';' => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    continue;
                }
                '\'' => mode = Mode::SingleQuote,
                '"' => mode = Mode::DoubleQuote,
                '-' if next == Some('-') => {
                    mode = Mode::LineComment;
                    current.push(c);
                    current.push('-');
                    chars.next();
                    continue;
                }
                '/' if next == Some('*') => {
                    mode = Mode::BlockComment;
                    current.push(c);
                    current.push('*');
                    chars.next();
                    continue;
                }
                _ => {}
            },
            // A doubled quote closes and immediately reopens, which leaves
            // the literal open as intended
            Mode::SingleQuote if c == '\'' => mode = Mode::Default,
            Mode::DoubleQuote if c == '"' => mode = Mode::Default,
            Mode::LineComment if c == '\n' => mode = Mode::Default,
            Mode::BlockComment if c == '*' && next == Some('/') => {
                current.push(c);
                current.push('/');
                chars.next();
                mode = Mode::Default;
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}
