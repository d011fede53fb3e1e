//! SQLite source reader implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Connection, Row as _, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{connect, live, quote_ident};
use crate::config::DatabaseConfig;
use crate::core::{ColumnDescriptor, ForeignKey, Row, SqlNullType, SqlValue};
use crate::core::{SourceReader, TableDescriptor};
use crate::error::{MigrateError, Result};

/// SQLite source reader.
pub struct SqliteReader {
    conn: Mutex<Option<SqliteConnection>>,
}

impl SqliteReader {
    /// Open the source database file.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let conn = connect(config, "source").await?;
        info!("Connected to SQLite source: {}", config.describe());
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-open connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Decode one column of a row by the storage class of the stored value.
    ///
    /// Values are handed on exactly as stored: text stays text and integers
    /// stay integers whatever the declared type. The column kind only types
    /// NULLs.
    fn decode(row: &SqliteRow, idx: usize, col: &ColumnDescriptor) -> Result<SqlValue> {
        let storage = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                return Ok(SqlValue::Null(SqlNullType::from(col.kind)));
            }
            raw.type_info().name().to_string()
        };

        let value = match storage.as_str() {
            "INTEGER" => SqlValue::I64(row.try_get(idx)?),
            "REAL" => SqlValue::F64(row.try_get(idx)?),
            "BLOB" => SqlValue::Bytes(row.try_get(idx)?),
            _ => SqlValue::Text(row.try_get(idx)?),
        };
        Ok(value)
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(MigrateError::from))
            .collect()
    }

    async fn describe(&self, table: &str) -> Result<TableDescriptor> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT cid, name, type, \"notnull\" FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| MigrateError::schema(table, e.to_string()))?;

        if rows.is_empty() {
            return Err(MigrateError::schema(table, "table does not exist"));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let read = || -> std::result::Result<ColumnDescriptor, sqlx::Error> {
                let cid: i64 = row.try_get("cid")?;
                let name: String = row.try_get("name")?;
                let declared: String = row.try_get("type")?;
                let not_null: i64 = row.try_get("notnull")?;
                Ok(ColumnDescriptor::new(
                    name,
                    declared,
                    not_null == 0,
                    cid as i32 + 1,
                ))
            };
            columns.push(read().map_err(|e| MigrateError::schema(table, e.to_string()))?);
        }

        debug!("{}: {} columns", table, columns.len());
        Ok(TableDescriptor::new(table, columns))
    }

    async fn foreign_keys(&self, tables: &[String]) -> Result<Vec<ForeignKey>> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;
        let mut keys = Vec::new();

        for table in tables {
            let rows: Vec<SqliteRow> = sqlx::query(
                "SELECT id, \"table\", \"from\", \"to\" \
                 FROM pragma_foreign_key_list(?) ORDER BY id, seq",
            )
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;

            // Multi-column keys span several rows sharing an id.
            let mut by_id: BTreeMap<i64, ForeignKey> = BTreeMap::new();
            for row in &rows {
                let id: i64 = row.try_get("id")?;
                let to_table: String = row.try_get("table")?;
                let from: String = row.try_get("from")?;
                let to: Option<String> = row.try_get("to")?;

                let key = by_id
                    .entry(id)
                    .or_insert_with(|| ForeignKey::between(table.clone(), to_table));
                key.columns.push(from);
                if let Some(to) = to {
                    key.ref_columns.push(to);
                }
            }
            keys.extend(by_id.into_values());
        }

        Ok(keys)
    }

    async fn read_rows(&self, table: &TableDescriptor) -> Result<Vec<Row>> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let col_list: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {}",
            col_list.join(", "),
            quote_ident(&table.name)
        );
        debug!("{}", sql);

        let rows: Vec<SqliteRow> = sqlx::query(&sql).fetch_all(&mut *conn).await?;

        rows.iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| Self::decode(row, i, col))
                    .collect::<Result<Row>>()
            })
            .collect()
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        live(&mut guard)?.ping().await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.close().await.ok();
        }
    }
}
