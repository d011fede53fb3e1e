//! SQLite target writer implementation.

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection};
use sqlx::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{connect, live, quote_ident, SQLITE_MAX_VARIABLES};
use crate::config::DatabaseConfig;
use crate::core::{SqlNullType, SqlValue, TargetWriter};
use crate::error::Result;
use crate::transcode::RecordMap;

/// SQLite target writer.
pub struct SqliteWriter {
    conn: Mutex<Option<SqliteConnection>>,
}

impl SqliteWriter {
    /// Open the destination database file.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let conn = connect(config, "target").await?;
        info!("Connected to SQLite target: {}", config.describe());
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-open connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    fn insert_sql(table: &str, cols: &[&String], rows: usize) -> String {
        let col_list: Vec<String> = cols.iter().map(|c| quote_ident(c)).collect();
        let placeholders_per_row = format!("({})", vec!["?"; cols.len()].join(", "));
        let all_placeholders: Vec<String> =
            std::iter::repeat(placeholders_per_row).take(rows).collect();

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table),
            col_list.join(", "),
            all_placeholders.join(", ")
        )
    }
}

/// Bind one value, keeping NULLs typed.
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null(t) => match t {
            SqlNullType::Bool => query.bind(None::<bool>),
            SqlNullType::I16 | SqlNullType::I32 | SqlNullType::I64 => query.bind(None::<i64>),
            SqlNullType::F32 | SqlNullType::F64 => query.bind(None::<f64>),
            SqlNullType::Bytes => query.bind(None::<Vec<u8>>),
            _ => query.bind(None::<String>),
        },
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::I16(i) => query.bind(i64::from(*i)),
        SqlValue::I32(i) => query.bind(i64::from(*i)),
        SqlValue::I64(i) => query.bind(*i),
        SqlValue::F32(f) => query.bind(f64::from(*f)),
        SqlValue::F64(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Uuid(u) => query.bind(u.to_string()),
        // Stored as text to keep every digit.
        SqlValue::Decimal(d) => query.bind(d.to_string()),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::DateTimeOffset(dto) => query.bind(dto.to_rfc3339()),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Time(t) => query.bind(*t),
    }
}

#[async_trait]
impl TargetWriter for SqliteWriter {
    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let sql = if enabled {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        debug!("{}", sql);
        sqlx::query(sql).execute(&mut *conn).await?;
        Ok(())
    }

    async fn clear_table(&self, table: &str) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        let sql = format!("DELETE FROM {}", quote_ident(table));
        debug!("{}", sql);
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }

    async fn insert_chunk(&self, table: &str, records: &[RecordMap]) -> Result<u64> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        let cols: Vec<&String> = first.keys().collect();
        if cols.is_empty() {
            return Ok(0);
        }

        let mut guard = self.conn.lock().await;
        let conn = live(&mut guard)?;

        // Oversized chunks are split to stay under the bound-parameter limit.
        let rows_per_statement = (SQLITE_MAX_VARIABLES / cols.len()).max(1);
        let missing = SqlValue::Null(SqlNullType::String);
        let mut written = 0u64;

        for part in records.chunks(rows_per_statement) {
            let sql = Self::insert_sql(table, &cols, part.len());
            let mut query = sqlx::query(&sql);
            for record in part {
                for col in &cols {
                    query = bind_value(query, record.get(col.as_str()).unwrap_or(&missing));
                }
            }
            written += query.execute(&mut *conn).await?.rows_affected();
        }

        debug!("SQLite: wrote {} rows to {}", written, table);
        Ok(written)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql() {
        let id = "id".to_string();
        let name = "name".to_string();
        let sql = SqliteWriter::insert_sql("user", &[&id, &name], 2);
        assert_eq!(
            sql,
            "INSERT INTO \"user\" (\"id\", \"name\") VALUES (?, ?), (?, ?)"
        );
    }
}
