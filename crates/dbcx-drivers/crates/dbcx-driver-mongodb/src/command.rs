//! Parsing of MongoDB statement text into structured commands

use bson::{Bson, Document};

/// Why statement text could not be turned into a command
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("expected a command document or a db.<collection>.<method>(...) call")]
    UnrecognizedShape,

    #[error("unbalanced parentheses or quotes")]
    Unbalanced,

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid arguments to {method}: {reason}")]
    InvalidArguments { method: String, reason: String },
}

impl CommandError {
    fn args(method: &str, reason: impl Into<String>) -> Self {
        CommandError::InvalidArguments {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Cursor modifiers chained after `find(...)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

/// An operation on one collection
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionOp {
    Find {
        filter: Document,
        options: FindOptions,
    },
    FindOne {
        filter: Document,
        projection: Option<Document>,
    },
    Aggregate {
        pipeline: Vec<Document>,
    },
    CountDocuments {
        filter: Document,
    },
    EstimatedDocumentCount,
    Distinct {
        field: String,
        filter: Document,
    },
    InsertOne {
        document: Document,
    },
    InsertMany {
        documents: Vec<Document>,
    },
    UpdateOne {
        filter: Document,
        update: Document,
    },
    UpdateMany {
        filter: Document,
        update: Document,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
}

impl CollectionOp {
    /// Shell name of the method
    pub fn method(&self) -> &'static str {
        match self {
            CollectionOp::Find { .. } => "find",
            CollectionOp::FindOne { .. } => "findOne",
            CollectionOp::Aggregate { .. } => "aggregate",
            CollectionOp::CountDocuments { .. } => "countDocuments",
            CollectionOp::EstimatedDocumentCount => "estimatedDocumentCount",
            CollectionOp::Distinct { .. } => "distinct",
            CollectionOp::InsertOne { .. } => "insertOne",
            CollectionOp::InsertMany { .. } => "insertMany",
            CollectionOp::UpdateOne { .. } => "updateOne",
            CollectionOp::UpdateMany { .. } => "updateMany",
            CollectionOp::DeleteOne { .. } => "deleteOne",
            CollectionOp::DeleteMany { .. } => "deleteMany",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            CollectionOp::InsertOne { .. }
                | CollectionOp::InsertMany { .. }
                | CollectionOp::UpdateOne { .. }
                | CollectionOp::UpdateMany { .. }
                | CollectionOp::DeleteOne { .. }
                | CollectionOp::DeleteMany { .. }
        )
    }
}

/// A parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum MongoCommand {
    /// A database command document, e.g. `{"listCollections": 1}`
    RunCommand(Document),
    /// `db.<collection>.<method>(...)`
    Collection { collection: String, op: CollectionOp },
}

/// One `.name(args)` segment
#[derive(Debug)]
struct Call<'a> {
    name: &'a str,
    args: &'a str,
}

/// Parse statement text into a command.
///
/// Accepted shapes are a JSON command document or
/// `db.<collection>.<method>(<json>, ...)` where the collection may also be
/// written `db.getCollection("name")`. Arguments are parsed as JSON with
/// extended JSON markers (`{"$oid": ...}`, `{"$date": ...}`) honoured.
pub fn parse_command(text: &str) -> Result<MongoCommand, CommandError> {
    let text = text.trim().trim_end_matches(';').trim_end();
    if text.is_empty() {
        return Err(CommandError::Empty);
    }

    if text.starts_with('{') {
        let document = parse_args(text)
            .and_then(|mut args| match args.len() {
                1 => expect_document(args.remove(0)),
                _ => Err("expected a single document".to_string()),
            })
            .map_err(|reason| CommandError::args("runCommand", reason))?;
        return Ok(MongoCommand::RunCommand(document));
    }

    let rest = text
        .strip_prefix("db.")
        .ok_or(CommandError::UnrecognizedShape)?;
    let (collection, chain) = split_collection(rest)?;
    let calls = parse_calls(chain)?;
    let (first, modifiers) = calls.split_first().ok_or(CommandError::UnrecognizedShape)?;

    let args = parse_args(first.args).map_err(|reason| CommandError::args(first.name, reason))?;
    let mut op = build_op(first.name, args)?;

    for modifier in modifiers {
        apply_modifier(&mut op, modifier)?;
    }

    Ok(MongoCommand::Collection { collection, op })
}

/// Split `orders.find(...)` into the collection name and the call chain
fn split_collection(rest: &str) -> Result<(String, &str), CommandError> {
    if let Some(after) = rest.strip_prefix("getCollection") {
        let after = after.trim_start();
        if !after.starts_with('(') {
            return Err(CommandError::UnrecognizedShape);
        }
        let close = matching_paren(after, 0)?;
        let name = unquote(after[1..close].trim())
            .ok_or_else(|| CommandError::args("getCollection", "expected a quoted name"))?;
        if name.is_empty() {
            return Err(CommandError::args("getCollection", "empty collection name"));
        }
        return Ok((name.to_string(), &after[close + 1..]));
    }

    // Collection names may contain dots, so the method is the segment
    // right before the first parenthesis.
    let open = rest.find('(').ok_or(CommandError::UnrecognizedShape)?;
    let dot = rest[..open].rfind('.').ok_or(CommandError::UnrecognizedShape)?;
    let collection = &rest[..dot];
    if collection.is_empty() || collection.chars().any(char::is_whitespace) {
        return Err(CommandError::UnrecognizedShape);
    }
    Ok((collection.to_string(), &rest[dot..]))
}

fn unquote(text: &str) -> Option<&str> {
    ['"', '\'']
        .iter()
        .find_map(|q| text.strip_prefix(*q).and_then(|t| t.strip_suffix(*q)))
}

fn parse_calls(mut chain: &str) -> Result<Vec<Call<'_>>, CommandError> {
    let mut calls = Vec::new();
    loop {
        chain = chain.trim_start();
        if chain.is_empty() {
            return Ok(calls);
        }
        let segment = chain
            .strip_prefix('.')
            .ok_or(CommandError::UnrecognizedShape)?;
        let open = segment.find('(').ok_or(CommandError::UnrecognizedShape)?;
        let name = segment[..open].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CommandError::UnrecognizedShape);
        }
        let close = matching_paren(segment, open)?;
        calls.push(Call {
            name,
            args: &segment[open + 1..close],
        });
        chain = &segment[close + 1..];
    }
}

/// Byte index of the parenthesis closing the one at `open`
fn matching_paren(text: &str, open: usize) -> Result<usize, CommandError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text.char_indices().skip_while(|(i, _)| *i < open) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
            }
            _ => {}
        }
    }
    Err(CommandError::Unbalanced)
}

/// Parse a comma separated argument list as JSON values
fn parse_args(args: &str) -> Result<Vec<Bson>, String> {
    if args.trim().is_empty() {
        return Ok(Vec::new());
    }
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&format!("[{}]", args)).map_err(|e| e.to_string())?;
    values
        .into_iter()
        .map(|v| Bson::try_from(v).map_err(|e| e.to_string()))
        .collect()
}

fn expect_document(value: Bson) -> Result<Document, String> {
    match value {
        Bson::Document(doc) => Ok(doc),
        other => Err(format!("expected a document, found {:?}", other.element_type())),
    }
}

fn expect_documents(value: Bson) -> Result<Vec<Document>, String> {
    match value {
        Bson::Array(items) => items.into_iter().map(expect_document).collect(),
        other => Err(format!("expected an array, found {:?}", other.element_type())),
    }
}

fn expect_integer(value: &Bson) -> Result<i64, String> {
    match value {
        Bson::Int32(n) => Ok(*n as i64),
        Bson::Int64(n) => Ok(*n),
        Bson::Double(n) if n.fract() == 0.0 => Ok(*n as i64),
        other => Err(format!("expected an integer, found {:?}", other.element_type())),
    }
}

/// Positional arguments of one call, with arity checks
struct Args {
    method: String,
    values: std::vec::IntoIter<Bson>,
}

impl Args {
    fn new(method: &str, values: Vec<Bson>, max: usize) -> Result<Self, CommandError> {
        if values.len() > max {
            return Err(CommandError::args(
                method,
                format!("expected at most {} argument(s), got {}", max, values.len()),
            ));
        }
        Ok(Self {
            method: method.to_string(),
            values: values.into_iter(),
        })
    }

    fn required<T>(
        &mut self,
        what: &str,
        convert: fn(Bson) -> Result<T, String>,
    ) -> Result<T, CommandError> {
        let value = self
            .values
            .next()
            .ok_or_else(|| CommandError::args(&self.method, format!("missing {}", what)))?;
        convert(value).map_err(|reason| CommandError::args(&self.method, reason))
    }

    fn optional<T>(&mut self, convert: fn(Bson) -> Result<T, String>) -> Result<Option<T>, CommandError> {
        self.values
            .next()
            .map(convert)
            .transpose()
            .map_err(|reason| CommandError::args(&self.method, reason))
    }

    fn filter(&mut self) -> Result<Document, CommandError> {
        Ok(self.optional(expect_document)?.unwrap_or_default())
    }
}

fn expect_string(value: Bson) -> Result<String, String> {
    match value {
        Bson::String(s) if !s.is_empty() => Ok(s),
        other => Err(format!("expected a field name, found {:?}", other.element_type())),
    }
}

fn build_op(method: &str, values: Vec<Bson>) -> Result<CollectionOp, CommandError> {
    let op = match method {
        "find" => {
            let mut args = Args::new(method, values, 2)?;
            let filter = args.filter()?;
            let projection = args.optional(expect_document)?;
            CollectionOp::Find {
                filter,
                options: FindOptions {
                    projection,
                    ..FindOptions::default()
                },
            }
        }
        "findOne" => {
            let mut args = Args::new(method, values, 2)?;
            CollectionOp::FindOne {
                filter: args.filter()?,
                projection: args.optional(expect_document)?,
            }
        }
        "aggregate" => {
            let mut args = Args::new(method, values, 1)?;
            CollectionOp::Aggregate {
                pipeline: args.optional(expect_documents)?.unwrap_or_default(),
            }
        }
        "countDocuments" => {
            let mut args = Args::new(method, values, 1)?;
            CollectionOp::CountDocuments {
                filter: args.filter()?,
            }
        }
        "estimatedDocumentCount" => {
            Args::new(method, values, 0)?;
            CollectionOp::EstimatedDocumentCount
        }
        "distinct" => {
            let mut args = Args::new(method, values, 2)?;
            CollectionOp::Distinct {
                field: args.required("field name", expect_string)?,
                filter: args.filter()?,
            }
        }
        "insertOne" => {
            let mut args = Args::new(method, values, 1)?;
            CollectionOp::InsertOne {
                document: args.required("document", expect_document)?,
            }
        }
        "insertMany" => {
            let mut args = Args::new(method, values, 1)?;
            let documents = args.required("documents", expect_documents)?;
            if documents.is_empty() {
                return Err(CommandError::args(method, "no documents to insert"));
            }
            CollectionOp::InsertMany { documents }
        }
        "updateOne" | "updateMany" => {
            let mut args = Args::new(method, values, 2)?;
            let filter = args.required("filter", expect_document)?;
            let update = args.required("update", expect_document)?;
            if method == "updateOne" {
                CollectionOp::UpdateOne { filter, update }
            } else {
                CollectionOp::UpdateMany { filter, update }
            }
        }
        // Deletes insist on an explicit filter, even if it is `{}`
        "deleteOne" | "deleteMany" => {
            let mut args = Args::new(method, values, 1)?;
            let filter = args.required("filter", expect_document)?;
            if method == "deleteOne" {
                CollectionOp::DeleteOne { filter }
            } else {
                CollectionOp::DeleteMany { filter }
            }
        }
        other => return Err(CommandError::UnsupportedMethod(other.to_string())),
    };
    Ok(op)
}

fn apply_modifier(op: &mut CollectionOp, call: &Call<'_>) -> Result<(), CommandError> {
    let CollectionOp::Find { options, .. } = op else {
        return Err(CommandError::args(
            call.name,
            format!("cannot be chained after {}", op.method()),
        ));
    };

    let mut values = parse_args(call.args).map_err(|reason| CommandError::args(call.name, reason))?;
    if values.len() != 1 {
        return Err(CommandError::args(call.name, "expected exactly one argument"));
    }
    let value = values.remove(0);
    let invalid = |reason: String| CommandError::args(call.name, reason);

    match call.name {
        "limit" => options.limit = Some(expect_integer(&value).map_err(invalid)?),
        "skip" => {
            let skip = expect_integer(&value).map_err(invalid)?;
            let skip = u64::try_from(skip).map_err(|_| invalid("must not be negative".into()))?;
            options.skip = Some(skip);
        }
        "sort" => options.sort = Some(expect_document(value).map_err(invalid)?),
        "projection" => options.projection = Some(expect_document(value).map_err(invalid)?),
        other => return Err(CommandError::UnsupportedMethod(other.to_string())),
    }
    Ok(())
}
