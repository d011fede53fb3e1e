//! Table, column and foreign-key metadata read from the source catalog.
//!
//! These types are built once per run by a [`SourceReader`](super::SourceReader)
//! and are read-only afterwards.

use serde::{Deserialize, Serialize};

/// Semantic type tag for a column, derived from its declared type.
///
/// Drivers use the tag to decode a raw value into the matching
/// [`SqlValue`](super::SqlValue) variant. It never drives conversion between
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    DateTime,
    Date,
    Time,
    Blob,
    Uuid,
    Json,
    Other,
}

impl ColumnKind {
    /// Classify a declared column type as reported by a catalog.
    ///
    /// Engine-specific names are matched first, then SQLite's affinity rules
    /// (substring checks on the upper-cased declaration) act as the fallback.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        // Strip length/precision: VARCHAR(255) -> VARCHAR
        let base = upper.split('(').next().unwrap_or("").trim();

        match base {
            "BOOL" | "BOOLEAN" => return ColumnKind::Boolean,
            "BIT" if upper == "BIT" || upper == "BIT(1)" => return ColumnKind::Boolean,
            "DATETIME" | "TIMESTAMP" | "DATETIME2" | "SMALLDATETIME" | "DATETIMEOFFSET" => {
                return ColumnKind::DateTime
            }
            "DATE" => return ColumnKind::Date,
            "TIME" => return ColumnKind::Time,
            "DECIMAL" | "NUMERIC" | "MONEY" => return ColumnKind::Decimal,
            "UUID" | "UNIQUEIDENTIFIER" => return ColumnKind::Uuid,
            "JSON" | "JSONB" => return ColumnKind::Json,
            "TINYINT" if upper == "TINYINT(1)" => return ColumnKind::Boolean,
            _ => {}
        }

        if upper.contains("INT") {
            ColumnKind::Integer
        } else if upper.contains("CHAR")
            || upper.contains("CLOB")
            || upper.contains("TEXT")
            || upper.contains("ENUM")
            || upper.contains("SET")
        {
            ColumnKind::Text
        } else if upper.contains("BLOB") || upper.contains("BINARY") || upper.is_empty() {
            ColumnKind::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnKind::Float
        } else {
            ColumnKind::Other
        }
    }
}

/// Description of one source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared type exactly as the catalog reports it.
    pub declared_type: String,

    /// Semantic tag derived from `declared_type`.
    pub kind: ColumnKind,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl ColumnDescriptor {
    /// Build a column, deriving its kind from the declared type.
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        is_nullable: bool,
        ordinal_pos: i32,
    ) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            kind: ColumnKind::from_declared(&declared_type),
            declared_type,
            is_nullable,
            ordinal_pos,
        }
    }
}

/// Description of one source table: its name and columns in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,

    /// Column definitions, ordered by ordinal position.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Number of columns.
    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}

/// A foreign key from `from_table` to `to_table`: `to_table` must be loaded first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name, if the catalog exposes one.
    pub name: Option<String>,

    /// Referencing table.
    pub from_table: String,

    /// Referencing columns.
    pub columns: Vec<String>,

    /// Referenced table.
    pub to_table: String,

    /// Referenced columns.
    pub ref_columns: Vec<String>,
}

impl ForeignKey {
    /// A foreign key described only by the two tables it connects.
    pub fn between(from_table: impl Into<String>, to_table: impl Into<String>) -> Self {
        Self {
            name: None,
            from_table: from_table.into(),
            columns: Vec::new(),
            to_table: to_table.into(),
            ref_columns: Vec::new(),
        }
    }

    /// Whether the key references its own table.
    pub fn is_self_reference(&self) -> bool {
        self.from_table == self.to_table
    }
}
