//! In-memory source and destination used by the integration tests.
//!
//! The destination enforces foreign keys the way a real engine would when
//! checks are on: a child row needs a non-empty parent table, and a parent
//! table cannot be emptied while a child still holds rows.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dbmigrate::{
    ColumnDescriptor, ForeignKey, MigrateError, RecordMap, Result, Row, SourceReader, SqlValue,
    TableDescriptor, TargetWriter,
};

pub fn table(name: &str, columns: &[&str]) -> TableDescriptor {
    TableDescriptor::new(
        name,
        columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let declared = if *c == "id" || c.ends_with("_id") {
                    "INTEGER"
                } else {
                    "TEXT"
                };
                ColumnDescriptor::new(*c, declared, *c != "id", i as i32 + 1)
            })
            .collect(),
    )
}

/// `n` rows of `(id, label)`.
pub fn labelled_rows(n: usize, prefix: &str) -> Vec<Row> {
    (1..=n)
        .map(|i| {
            vec![
                SqlValue::I64(i as i64),
                SqlValue::Text(format!("{}-{}", prefix, i)),
            ]
        })
        .collect()
}

/// `n` rows of `(id, parent_id)` pointing at parent 1.
pub fn child_rows(n: usize) -> Vec<Row> {
    (1..=n)
        .map(|i| vec![SqlValue::I64(i as i64), SqlValue::I64(1)])
        .collect()
}

#[derive(Default)]
pub struct FakeSource {
    tables: Vec<(TableDescriptor, Vec<Row>)>,
    foreign_keys: Vec<ForeignKey>,
    pub closed: Arc<AtomicBool>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableDescriptor, rows: Vec<Row>) -> Self {
        self.tables.push((table, rows));
        self
    }

    pub fn with_fk(mut self, from: &str, to: &str) -> Self {
        self.foreign_keys.push(ForeignKey::between(from, to));
        self
    }

    pub fn foreign_keys(&self) -> Vec<ForeignKey> {
        self.foreign_keys.clone()
    }

    fn find(&self, name: &str) -> Option<&(TableDescriptor, Vec<Row>)> {
        self.tables.iter().find(|(t, _)| t.name == name)
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.iter().map(|(t, _)| t.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn describe(&self, table: &str) -> Result<TableDescriptor> {
        self.find(table)
            .map(|(t, _)| t.clone())
            .ok_or_else(|| MigrateError::schema(table, "table does not exist"))
    }

    async fn foreign_keys(&self, tables: &[String]) -> Result<Vec<ForeignKey>> {
        Ok(self
            .foreign_keys
            .iter()
            .filter(|fk| tables.contains(&fk.from_table))
            .cloned()
            .collect())
    }

    async fn read_rows(&self, table: &TableDescriptor) -> Result<Vec<Row>> {
        self.find(&table.name)
            .map(|(_, rows)| rows.clone())
            .ok_or_else(|| MigrateError::schema(&table.name, "table does not exist"))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        self.find(table)
            .map(|(_, rows)| rows.len() as i64)
            .ok_or_else(|| MigrateError::schema(table, "table does not exist"))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "fake"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Shared view of the fake destination, kept by the test after the writer
/// has been moved into the orchestrator.
#[derive(Default)]
pub struct TargetState {
    pub tables: HashMap<String, Vec<RecordMap>>,
    pub ops: Vec<String>,
    pub fk_checks: bool,
    pub closed: bool,
    chunks_seen: HashMap<String, usize>,
}

impl TargetState {
    pub fn rows(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, Vec::len)
    }
}

pub struct FakeTarget {
    pub state: Arc<Mutex<TargetState>>,
    foreign_keys: Vec<ForeignKey>,
    fail_chunk: Option<(String, usize)>,
    fail_clear: Option<String>,
    fail_enable: bool,
}

impl FakeTarget {
    /// A destination with `tables` created and empty.
    pub fn new(tables: &[&str], foreign_keys: Vec<ForeignKey>) -> Self {
        let mut state = TargetState {
            fk_checks: true,
            ..TargetState::default()
        };
        for t in tables {
            state.tables.insert(t.to_string(), Vec::new());
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            foreign_keys,
            fail_chunk: None,
            fail_clear: None,
            fail_enable: false,
        }
    }

    /// Reject the `chunk_index`-th insert (0-based) into `table`.
    pub fn failing_chunk(mut self, table: &str, chunk_index: usize) -> Self {
        self.fail_chunk = Some((table.to_string(), chunk_index));
        self
    }

    pub fn failing_clear(mut self, table: &str) -> Self {
        self.fail_clear = Some(table.to_string());
        self
    }

    pub fn failing_enable(mut self) -> Self {
        self.fail_enable = true;
        self
    }

    /// Pre-populate a table.
    pub fn seed(self, table: &str, records: Vec<RecordMap>) -> Self {
        self.state
            .lock()
            .unwrap()
            .tables
            .insert(table.to_string(), records);
        self
    }

    pub fn handle(&self) -> Arc<Mutex<TargetState>> {
        self.state.clone()
    }
}

#[async_trait]
impl TargetWriter for FakeTarget {
    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .ops
            .push(if enabled { "fk_on" } else { "fk_off" }.to_string());
        if enabled && self.fail_enable {
            return Err(MigrateError::connection("server has gone away", "fake"));
        }
        state.fk_checks = enabled;
        Ok(())
    }

    async fn clear_table(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(format!("clear {}", table));

        if self.fail_clear.as_deref() == Some(table) {
            return Err(MigrateError::connection("lock wait timeout", "fake"));
        }
        if !state.tables.contains_key(table) {
            return Err(MigrateError::schema(table, "no such table"));
        }
        if state.fk_checks {
            for fk in self.foreign_keys.iter().filter(|fk| fk.to_table == table) {
                if state.rows(&fk.from_table) > 0 {
                    return Err(MigrateError::connection(
                        format!("cannot truncate {}: referenced by {}", table, fk.from_table),
                        "fake",
                    ));
                }
            }
        }
        if let Some(rows) = state.tables.get_mut(table) {
            rows.clear();
        }
        Ok(())
    }

    async fn insert_chunk(&self, table: &str, records: &[RecordMap]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let chunk_index = {
            let seen = state.chunks_seen.entry(table.to_string()).or_insert(0);
            *seen += 1;
            *seen - 1
        };
        state.ops.push(format!("insert {} {}", table, records.len()));

        if let Some((fail_table, fail_index)) = &self.fail_chunk {
            if fail_table == table && *fail_index == chunk_index {
                return Err(MigrateError::connection("duplicate entry", "fake"));
            }
        }
        if !state.tables.contains_key(table) {
            return Err(MigrateError::schema(table, "no such table"));
        }
        if state.fk_checks {
            for fk in self.foreign_keys.iter().filter(|fk| fk.from_table == table) {
                if state.rows(&fk.to_table) == 0 {
                    return Err(MigrateError::connection(
                        format!("foreign key constraint fails: {} -> {}", table, fk.to_table),
                        "fake",
                    ));
                }
            }
        }
        if let Some(rows) = state.tables.get_mut(table) {
            rows.extend(records.iter().cloned());
        }
        Ok(records.len() as u64)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|rows| rows.len() as i64)
            .ok_or_else(|| MigrateError::schema(table, "no such table"))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "fake"
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}
