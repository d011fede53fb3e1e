//! MySQL/MariaDB target writer implementation.
//!
//! Uses one mysql_async connection so that `FOREIGN_KEY_CHECKS` set on the
//! session applies to the truncates and inserts that follow.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, SslOpts, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{quote_ident, SslMode};
use crate::config::{DatabaseConfig, DEFAULT_MYSQL_PORT};
use crate::core::{SqlValue, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::transcode::RecordMap;

/// MySQL max placeholders per prepared statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL target writer implementation using mysql_async.
pub struct MysqlWriter {
    conn: Mutex<Option<Conn>>,
}

impl MysqlWriter {
    /// Connect using the `target` section of the configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let ssl_opts = match SslMode::parse(&config.ssl_mode)? {
            SslMode::Disable => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            SslMode::Prefer | SslMode::Require => {
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
            SslMode::VerifyCa => {
                Some(SslOpts::default().with_danger_skip_domain_validation(true))
            }
            SslMode::VerifyFull => Some(SslOpts::default()),
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port.unwrap_or(DEFAULT_MYSQL_PORT))
            .db_name(Some(config.database.clone()))
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let opts: Opts = builder.into();
        let mut conn = Conn::new(opts)
            .await
            .map_err(|e| MigrateError::connection(e, "opening MySQL target connection"))?;

        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "testing MySQL target connection"))?;

        info!("Connected to MySQL target: {}", config.describe());

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn closed() -> MigrateError {
        MigrateError::connection("connection already closed", "mysql target")
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

fn date_value(d: NaiveDate, t: NaiveTime) -> Value {
    Value::Date(
        u16::try_from(d.year()).unwrap_or(0),
        d.month() as u8,
        d.day() as u8,
        t.hour() as u8,
        t.minute() as u8,
        t.second() as u8,
        // Leap-second nanos exceed one second.
        (t.nanosecond() / 1_000).min(999_999),
    )
}

fn datetime_value(dt: &NaiveDateTime) -> Value {
    date_value(dt.date(), dt.time())
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null(_) => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::I16(i) => Value::Int(i64::from(*i)),
        SqlValue::I32(i) => Value::Int(i64::from(*i)),
        SqlValue::I64(i) => Value::Int(*i),
        SqlValue::F32(f) => Value::Float(*f),
        SqlValue::F64(f) => Value::Double(*f),
        SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Uuid(u) => Value::Bytes(u.to_string().into_bytes()),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::DateTime(dt) => datetime_value(dt),
        SqlValue::DateTimeOffset(dto) => datetime_value(&dto.naive_utc()),
        SqlValue::Date(d) => date_value(*d, NaiveTime::MIN),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            (t.nanosecond() / 1_000).min(999_999),
        ),
    }
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        let sql = format!("SET FOREIGN_KEY_CHECKS = {}", u8::from(enabled));
        debug!("{}", sql);
        conn.query_drop(sql).await?;
        Ok(())
    }

    async fn clear_table(&self, table: &str) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        let sql = format!("TRUNCATE TABLE {}", quote_ident(table));
        debug!("{}", sql);
        conn.query_drop(sql).await?;
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
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        let rows_per_statement = (MYSQL_MAX_PLACEHOLDERS / cols.len()).max(1);
        let mut written = 0u64;

        for part in records.chunks(rows_per_statement) {
            let sql = Self::insert_sql(table, &cols, part.len());

            // Collect all values for binding
            let params: Vec<Value> = part
                .iter()
                .flat_map(|record| {
                    cols.iter().map(move |col| {
                        record
                            .get(col.as_str())
                            .map_or(Value::NULL, sql_value_to_mysql)
                    })
                })
                .collect();

            conn.exec_drop(sql, params).await?;
            written += conn.affected_rows();
        }

        debug!("MySQL: wrote {} rows to {}", written, table);
        Ok(written)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(Self::closed)?;

        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: Option<i64> = conn.query_first(sql).await?;
        Ok(count.unwrap_or(0))
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
            conn.disconnect().await.ok();
        }
    }
}
