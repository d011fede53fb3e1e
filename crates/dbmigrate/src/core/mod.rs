//! Core abstractions for database-agnostic migration.
//!
//! - [`schema`]: table, column and foreign-key metadata
//! - [`value`]: SQL value representation
//! - [`traits`]: the reader and writer every driver implements
//!
//! Drivers (`drivers/sqlite`, `drivers/mysql`) implement these traits; the
//! planner, transcoder, loader and orchestrator only ever see the traits.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnDescriptor, ColumnKind, ForeignKey, TableDescriptor};
pub use traits::{SourceReader, TargetWriter};
pub use value::{Row, SqlNullType, SqlValue};
