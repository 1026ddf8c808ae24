//! Relational destination abstraction.
//!
//! Defines the [`Destination`] trait so the loader can drive MySQL in
//! production and an in-memory store in tests.

pub mod mysql;

#[cfg(test)]
pub mod memory;

use chrono::NaiveDateTime;

use crate::catalog::{Constraint, TableSchema};
use crate::error::LoadError;

/// A typed value ready to be bound into an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Int(i64),
    Timestamp(NaiveDateTime),
}

/// Rows in schema column order.
pub type Rows = Vec<Vec<Cell>>;

/// Async trait implemented by each database backend.
#[async_trait::async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    /// Create the target database when it does not exist yet.
    async fn ensure_database(&self) -> Result<(), LoadError>;

    /// Drop a table; succeeds when the table is already gone.
    async fn drop_table_if_exists(&self, table: &str) -> Result<(), LoadError>;

    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), LoadError>;

    /// Bulk-insert rows whose cells follow `schema.columns` order.
    async fn insert_rows(&self, table: &str, schema: &TableSchema, rows: Rows) -> Result<u64, LoadError>;

    async fn apply_constraint(&self, constraint: &Constraint) -> Result<(), LoadError>;
}
