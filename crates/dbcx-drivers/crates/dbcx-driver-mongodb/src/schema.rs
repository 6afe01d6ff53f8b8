//! Collection introspection

use crate::connection::bson_type_name;
use bson::Document;
use dbcx_core::ColumnInfo;

/// Field name MongoDB uses as the primary key
pub(crate) const ID_FIELD: &str = "_id";

/// Top-level fields of a sampled document as column metadata. `_id` is the
/// key and is never nullable.
pub(crate) fn infer_columns(sample: &Document) -> Vec<ColumnInfo> {
    sample
        .iter()
        .map(|(name, value)| {
            let column = ColumnInfo::new(name.as_str(), bson_type_name(value));
            if name == ID_FIELD {
                column.primary_key()
            } else {
                column
            }
        })
        .collect()
}
