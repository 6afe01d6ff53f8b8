//! Decoding PostgreSQL column values

use dbcx_core::Value;
use std::error::Error;
use tokio_postgres::Row as PgRow;
use tokio_postgres::types::{FromSql, Type};

type DecodeResult<T> = std::result::Result<T, Box<dyn Error + Sync + Send>>;

fn get<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn array<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Value
where
    T: FromSql<'a>,
    F: Fn(T) -> Value,
{
    get::<Vec<T>>(row, idx)
        .map(|items| Value::Array(items.into_iter().map(wrap).collect()))
        .unwrap_or(Value::Null)
}

/// Convert one column of a row to our Value type
pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let Some(column) = row.columns().get(idx) else {
        return Value::Null;
    };

    let value = match column.type_().name() {
        "bool" => get(row, idx).map(Value::Bool),
        "int2" => get(row, idx).map(Value::Int16),
        "int4" => get(row, idx).map(Value::Int32),
        "int8" => get(row, idx).map(Value::Int64),
        "oid" => get::<u32>(row, idx).map(|v| Value::Int64(v as i64)),
        "float4" => get(row, idx).map(Value::Float32),
        "float8" => get(row, idx).map(Value::Float64),
        "numeric" => get::<PgNumeric>(row, idx).map(|n| Value::Decimal(n.0)),
        "text" | "varchar" | "bpchar" | "name" => get(row, idx).map(Value::String),
        "bytea" => get(row, idx).map(Value::Bytes),
        "uuid" => get(row, idx).map(Value::Uuid),
        "json" | "jsonb" => get(row, idx).map(Value::Json),
        "date" => get(row, idx).map(Value::Date),
        "time" => get(row, idx).map(Value::Time),
        "timestamp" => get(row, idx).map(Value::DateTime),
        "timestamptz" => get(row, idx).map(Value::DateTimeUtc),
        // Array type names carry a leading underscore
        "_text" | "_varchar" | "_bpchar" | "_name" => return array(row, idx, Value::String),
        "_int2" => return array(row, idx, Value::Int16),
        "_int4" => return array(row, idx, Value::Int32),
        "_int8" => return array(row, idx, Value::Int64),
        "_bool" => return array(row, idx, Value::Bool),
        // Enums, domains and other text-encoded types
        _ => get::<PgText>(row, idx).map(|text| Value::String(text.0)),
    };
    value.unwrap_or(Value::Null)
}

/// NUMERIC decoded into its exact decimal text
#[derive(Debug)]
pub(crate) struct PgNumeric(pub String);

impl PgNumeric {
    const NEGATIVE: u16 = 0x4000;
    const NAN: u16 = 0xC000;

    /// Decode the binary NUMERIC wire format: a header of
    /// `ndigits, weight, sign, dscale` followed by base-10000 digit groups.
    pub(crate) fn decode(raw: &[u8]) -> DecodeResult<String> {
        let header = |at: usize| -> DecodeResult<u16> {
            raw.get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| "truncated NUMERIC header".into())
        };
        let ndigits = header(0)? as usize;
        let weight = header(2)? as i16 as i32;
        let sign = header(4)?;
        let dscale = header(6)? as usize;

        if sign == Self::NAN {
            return Ok("NaN".to_string());
        }

        let groups: Vec<u16> = (0..ndigits)
            .map(|i| header(8 + i * 2))
            .collect::<DecodeResult<_>>()?;

        // Group i has decimal weight (weight - i) in base 10000
        let mut integer = String::new();
        for exp in (0..=weight.max(-1)).rev() {
            let pos = weight - exp;
            let group = groups.get(pos as usize).copied().unwrap_or(0);
            if integer.is_empty() {
                if group != 0 {
                    integer.push_str(&group.to_string());
                }
            } else {
                integer.push_str(&format!("{:04}", group));
            }
        }
        if integer.is_empty() {
            integer.push('0');
        }

        let mut fraction = String::new();
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            let group = if pos >= 0 {
                groups.get(pos as usize).copied().unwrap_or(0)
            } else {
                0
            };
            fraction.push_str(&format!("{:04}", group));
            pos += 1;
        }
        fraction.truncate(dscale);

        let mut out = String::new();
        if sign == Self::NEGATIVE {
            out.push('-');
        }
        out.push_str(&integer);
        if !fraction.is_empty() {
            out.push('.');
            out.push_str(&fraction);
        }
        Ok(out)
    }
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        Ok(Self(Self::decode(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw UTF-8 payload of any type
#[derive(Debug)]
struct PgText(String);

impl<'a> FromSql<'a> for PgText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}
