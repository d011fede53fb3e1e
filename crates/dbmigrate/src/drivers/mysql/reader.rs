//! MySQL/MariaDB source reader implementation.
//!
//! Uses one SQLx connection for catalog queries and row reads.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{ConnectOptions, Connection, Row as _, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{quote_ident, SslMode};
use crate::config::{DatabaseConfig, DEFAULT_MYSQL_PORT};
use crate::core::{ColumnDescriptor, ColumnKind, ForeignKey, Row, SqlNullType, SqlValue};
use crate::core::{SourceReader, TableDescriptor};
use crate::error::{MigrateError, Result};

/// How a column is selected and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decode {
    Bool,
    Int { unsigned: bool },
    BigInt { unsigned: bool },
    Float,
    Double,
    Decimal,
    Text,
    Bytes,
    Date,
    /// TIME spans -838:59:59 to 838:59:59, so it is read as text.
    Time,
    DateTime,
    /// Bit strings, selected as an unsigned integer.
    Bits,
    /// Anything else, selected as `CAST(... AS CHAR)`.
    Cast,
}

impl Decode {
    fn for_column(col: &ColumnDescriptor) -> Self {
        let declared = col.declared_type.to_ascii_lowercase();
        let unsigned = declared.contains("unsigned");
        let base = declared
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("");

        match base {
            "tinyint" if col.kind == ColumnKind::Boolean => Decode::Bool,
            "bool" | "boolean" => Decode::Bool,
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" => Decode::Int { unsigned },
            "bigint" => Decode::BigInt { unsigned },
            "float" => Decode::Float,
            "double" | "real" => Decode::Double,
            "decimal" | "numeric" => Decode::Decimal,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum"
            | "set" => Decode::Text,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                Decode::Bytes
            }
            "date" => Decode::Date,
            "time" => Decode::Time,
            "datetime" | "timestamp" => Decode::DateTime,
            "bit" => Decode::Bits,
            _ => Decode::Cast,
        }
    }

    fn select_expr(self, name: &str) -> String {
        let quoted = quote_ident(name);
        match self {
            Decode::Bits => format!("CAST({} AS UNSIGNED) AS {}", quoted, quoted),
            Decode::Cast | Decode::Time => format!("CAST({} AS CHAR) AS {}", quoted, quoted),
            _ => quoted,
        }
    }

    /// Dates chrono cannot represent (`0000-00-00`) are read from a text copy.
    fn has_text_fallback(self) -> bool {
        matches!(self, Decode::Date | Decode::DateTime)
    }
}

/// Select list for a table, plus the position of each column's text copy.
fn select_list(table: &TableDescriptor) -> (Vec<String>, Vec<Option<usize>>) {
    let plans: Vec<Decode> = table.columns.iter().map(Decode::for_column).collect();
    let mut select: Vec<String> = table
        .columns
        .iter()
        .zip(&plans)
        .map(|(c, d)| d.select_expr(&c.name))
        .collect();

    let mut fallbacks = vec![None; table.columns.len()];
    for (i, (col, decode)) in table.columns.iter().zip(&plans).enumerate() {
        if decode.has_text_fallback() {
            fallbacks[i] = Some(select.len());
            select.push(format!("CAST({} AS CHAR)", quote_ident(&col.name)));
        }
    }
    (select, fallbacks)
}

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    conn: Mutex<Option<MySqlConnection>>,
}

impl MysqlReader {
    /// Connect using the `source` section of the configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let ssl_mode = match SslMode::parse(&config.ssl_mode)? {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Prefer => MySqlSslMode::Preferred,
            SslMode::Require => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port.unwrap_or(DEFAULT_MYSQL_PORT))
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .charset("utf8mb4")
            .ssl_mode(ssl_mode);

        let conn = options
            .connect()
            .await
            .map_err(|e| MigrateError::connection(e, "opening MySQL source connection"))?;

        info!("Connected to MySQL source: {}", config.describe());

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn closed() -> MigrateError {
        MigrateError::connection("connection already closed", "mysql source")
    }

    fn decode(
        row: &MySqlRow,
        idx: usize,
        col: &ColumnDescriptor,
        fallback: Option<usize>,
    ) -> Result<SqlValue> {
        let decode = Decode::for_column(col);
        if row.try_get_raw(idx)?.is_null() {
            return Ok(SqlValue::Null(Self::null_type_for(decode)));
        }

        let value = match decode {
            Decode::Bool => SqlValue::Bool(row.try_get::<i8, _>(idx)? != 0),
            Decode::Int { unsigned: false } => SqlValue::I32(row.try_get(idx)?),
            Decode::Int { unsigned: true } => SqlValue::I64(i64::from(row.try_get::<u32, _>(idx)?)),
            Decode::BigInt { unsigned: false } => SqlValue::I64(row.try_get(idx)?),
            Decode::BigInt { unsigned: true } | Decode::Bits => {
                let v: u64 = row.try_get(idx)?;
                match i64::try_from(v) {
                    Ok(v) if col.kind == ColumnKind::Boolean => SqlValue::Bool(v != 0),
                    Ok(v) => SqlValue::I64(v),
                    Err(_) => SqlValue::Decimal(rust_decimal::Decimal::from(v)),
                }
            }
            Decode::Float => SqlValue::F32(row.try_get(idx)?),
            Decode::Double => SqlValue::F64(row.try_get(idx)?),
            Decode::Decimal => SqlValue::Decimal(row.try_get(idx)?),
            Decode::Text | Decode::Cast => SqlValue::Text(row.try_get(idx)?),
            Decode::Bytes => SqlValue::Bytes(row.try_get(idx)?),
            Decode::Time => SqlValue::Text(row.try_get(idx)?),
            Decode::Date => match row.try_get(idx) {
                Ok(d) => SqlValue::Date(d),
                Err(e) => Self::text_fallback(row, fallback, e)?,
            },
            Decode::DateTime => match row.try_get(idx) {
                Ok(dt) => SqlValue::DateTime(dt),
                Err(e) => Self::text_fallback(row, fallback, e)?,
            },
        };
        Ok(value)
    }

    fn text_fallback(
        row: &MySqlRow,
        fallback: Option<usize>,
        err: sqlx::Error,
    ) -> Result<SqlValue> {
        match fallback {
            Some(pos) => Ok(SqlValue::Text(row.try_get(pos)?)),
            None => Err(err.into()),
        }
    }

    /// Get the appropriate null type for a column's decoding.
    fn null_type_for(decode: Decode) -> SqlNullType {
        match decode {
            Decode::Bool => SqlNullType::Bool,
            Decode::Int { unsigned: false } => SqlNullType::I32,
            Decode::Int { unsigned: true } | Decode::BigInt { .. } | Decode::Bits => {
                SqlNullType::I64
            }
            Decode::Float => SqlNullType::F32,
            Decode::Double => SqlNullType::F64,
            Decode::Decimal => SqlNullType::Decimal,
            Decode::Text | Decode::Cast | Decode::Time => SqlNullType::String,
            Decode::Bytes => SqlNullType::Bytes,
            Decode::Date => SqlNullType::Date,
            Decode::DateTime => SqlNullType::DateTime,
        }
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        let rows: Vec<MySqlRow> = sqlx::query(
            r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("TABLE_NAME").map_err(MigrateError::from))
            .collect()
    }

    async fn describe(&self, table: &str) -> Result<TableDescriptor> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        // CAST string columns to CHAR and numeric to SIGNED to handle type differences
        let rows: Vec<MySqlRow> = sqlx::query(
            r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR) AS COLUMN_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
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
                Ok(ColumnDescriptor::new(
                    row.try_get::<String, _>("COLUMN_NAME")?,
                    row.try_get::<String, _>("COLUMN_TYPE")?,
                    row.try_get::<i64, _>("is_nullable")? == 1,
                    row.try_get::<i64, _>("ORDINAL_POSITION")? as i32,
                ))
            };
            columns.push(read().map_err(|e| MigrateError::schema(table, e.to_string()))?);
        }

        debug!("{}: {} columns", table, columns.len());
        Ok(TableDescriptor::new(table, columns))
    }

    async fn foreign_keys(&self, tables: &[String]) -> Result<Vec<ForeignKey>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        let rows: Vec<MySqlRow> = sqlx::query(
            r#"
            SELECT
                CAST(kcu.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
            WHERE kcu.TABLE_SCHEMA = DATABASE()
              AND kcu.REFERENCED_TABLE_SCHEMA = DATABASE()
              AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY kcu.TABLE_NAME, kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut keys: BTreeMap<(String, String), ForeignKey> = BTreeMap::new();
        for row in &rows {
            let from_table: String = row.try_get("TABLE_NAME")?;
            if !tables.contains(&from_table) {
                continue;
            }
            let name: String = row.try_get("CONSTRAINT_NAME")?;
            let to_table: String = row.try_get("REFERENCED_TABLE_NAME")?;

            let key = keys
                .entry((from_table.clone(), name.clone()))
                .or_insert_with(|| ForeignKey {
                    name: Some(name),
                    ..ForeignKey::between(from_table, to_table)
                });
            key.columns.push(row.try_get("COLUMN_NAME")?);
            key.ref_columns.push(row.try_get("REFERENCED_COLUMN_NAME")?);
        }

        Ok(keys.into_values().collect())
    }

    async fn read_rows(&self, table: &TableDescriptor) -> Result<Vec<Row>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        let (select, fallbacks) = select_list(table);
        let sql = format!(
            "SELECT {} FROM {}",
            select.join(", "),
            quote_ident(&table.name)
        );
        debug!("{}", sql);

        let rows: Vec<MySqlRow> = sqlx::query(&sql).fetch_all(&mut *conn).await?;

        rows.iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| Self::decode(row, i, col, fallbacks[i]))
                    .collect::<Result<Row>>()
            })
            .collect()
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        guard.as_mut().ok_or_else(Self::closed)?.ping().await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
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

    fn column(declared: &str) -> ColumnDescriptor {
        ColumnDescriptor::new("c", declared, true, 1)
    }

    #[test]
    fn test_decode_for_column() {
        assert_eq!(Decode::for_column(&column("tinyint(1)")), Decode::Bool);
        assert_eq!(
            Decode::for_column(&column("int(10) unsigned")),
            Decode::Int { unsigned: true }
        );
        assert_eq!(
            Decode::for_column(&column("bigint")),
            Decode::BigInt { unsigned: false }
        );
        assert_eq!(Decode::for_column(&column("varchar(120)")), Decode::Text);
        assert_eq!(Decode::for_column(&column("enum('a','b')")), Decode::Text);
        assert_eq!(Decode::for_column(&column("datetime(6)")), Decode::DateTime);
        assert_eq!(Decode::for_column(&column("json")), Decode::Cast);
        assert_eq!(Decode::for_column(&column("year")), Decode::Cast);
    }

    #[test]
    fn test_select_expr() {
        assert_eq!(Decode::Text.select_expr("name"), "`name`");
        assert_eq!(
            Decode::Cast.select_expr("doc"),
            "CAST(`doc` AS CHAR) AS `doc`"
        );
    }

    #[test]
    fn test_time_read_as_text() {
        assert_eq!(Decode::for_column(&column("time")), Decode::Time);
        assert_eq!(
            Decode::Time.select_expr("elapsed"),
            "CAST(`elapsed` AS CHAR) AS `elapsed`"
        );
        assert_eq!(MysqlReader::null_type_for(Decode::Time), SqlNullType::String);
    }

    #[test]
    fn test_select_list_appends_date_text_copies() {
        let table = TableDescriptor::new(
            "event",
            vec![
                ColumnDescriptor::new("id", "int", false, 1),
                ColumnDescriptor::new("day", "date", true, 2),
                ColumnDescriptor::new("elapsed", "time", true, 3),
                ColumnDescriptor::new("at", "datetime(6)", true, 4),
            ],
        );

        let (select, fallbacks) = select_list(&table);

        assert_eq!(
            select,
            vec![
                "`id`",
                "`day`",
                "CAST(`elapsed` AS CHAR) AS `elapsed`",
                "`at`",
                "CAST(`day` AS CHAR)",
                "CAST(`at` AS CHAR)",
            ]
        );
        assert_eq!(fallbacks, vec![None, Some(4), None, Some(5)]);
    }

    #[test]
    fn test_null_type_for() {
        assert_eq!(
            MysqlReader::null_type_for(Decode::Int { unsigned: false }),
            SqlNullType::I32
        );
        assert_eq!(
            MysqlReader::null_type_for(Decode::BigInt { unsigned: true }),
            SqlNullType::I64
        );
        assert_eq!(MysqlReader::null_type_for(Decode::Cast), SqlNullType::String);
        assert_eq!(MysqlReader::null_type_for(Decode::Bytes), SqlNullType::Bytes);
    }
}
