//! Schema metadata records returned by providers

use serde::{Deserialize, Serialize};

/// Database information. Document stores nest their collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<CollectionInfo>,
}

impl DatabaseInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: Vec::new(),
        }
    }
}

/// Document-store collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub estimated_count: Option<u64>,
}

/// Table information (basic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub schema: Option<String>,
    pub row_count: Option<i64>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            row_count: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// `schema.table`, or just the table name
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// Column information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Backend type name, as reported by the catalog
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub default_value: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_primary_key: false,
            is_foreign_key: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Whether `get_tables` needs a database argument.
///
/// Some backends list tables of whatever database was selected at connect
/// time; callers must not loop over databases for those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableScope {
    PerDatabase,
    Connection,
}

/// Split `schema.table` into its parts
pub fn split_qualified_table(table: &str) -> (Option<&str>, &str) {
    match table.rsplit_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (Some(schema), name),
        _ => (None, table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qualified_table() {
        assert_eq!(split_qualified_table("dbo.orders"), (Some("dbo"), "orders"));
        assert_eq!(split_qualified_table("orders"), (None, "orders"));
        assert_eq!(split_qualified_table(".orders"), (None, ".orders"));
    }

    #[test]
    fn test_qualified_name() {
        let t = TableInfo::new("users").with_schema("public");
        assert_eq!(t.qualified_name(), "public.users");
        assert_eq!(TableInfo::new("users").qualified_name(), "users");
    }
}
