//! Row transcoding: pair each raw value with its column name.

use indexmap::IndexMap;

use crate::core::{Row, SqlValue, TableDescriptor};
use crate::error::{MigrateError, Result};

/// Column name to value, in column order.
pub type RecordMap = IndexMap<String, SqlValue>;

/// Turn a positional row into a record keyed by column name.
///
/// Values are moved into the record unchanged. A row whose length differs
/// from the table's column count is a [`MigrateError::SchemaMismatch`].
pub fn transcode(row: Row, table: &TableDescriptor) -> Result<RecordMap> {
    if row.len() != table.arity() {
        return Err(MigrateError::SchemaMismatch {
            table: table.name.clone(),
            expected: table.arity(),
            actual: row.len(),
        });
    }

    Ok(table
        .columns
        .iter()
        .map(|c| c.name.clone())
        .zip(row)
        .collect())
}

/// Transcode every row of a table, stopping at the first mismatch.
pub fn transcode_all(rows: Vec<Row>, table: &TableDescriptor) -> Result<Vec<RecordMap>> {
    rows.into_iter().map(|row| transcode(row, table)).collect()
}
