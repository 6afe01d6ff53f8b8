//! Schema snapshots of live connections, kept for completion and lookup

mod cache;

pub use cache::{
    CachedDatabase, CachedTable, DEFAULT_MAX_TABLES_PER_DATABASE, DEFAULT_TTL, SchemaCache,
    SchemaCacheConfig, SchemaSnapshot,
};
