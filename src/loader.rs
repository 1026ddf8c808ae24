//! Full-replace table loading and the constraint pass.

use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::info;

use crate::catalog::{ColumnType, Constraint, TableSchema};
use crate::destination::{Cell, Destination, Rows};
use crate::error::LoadError;
use crate::record::{RecordSet, DATE_FORMAT};

/// Drives a [`Destination`] through drop → create → insert for each table,
/// then applies key constraints once everything is populated.
pub struct TableLoader<D> {
    destination: D,
}

impl<D: Destination> TableLoader<D> {
    pub fn new(destination: D) -> Self {
        Self { destination }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub async fn ensure_database(&self) -> Result<(), LoadError> {
        self.destination.ensure_database().await
    }

    /// Drop tables in the given order. Callers pass children before parents
    /// so a previous run's foreign keys never block a drop.
    pub async fn reset(&self, tables: &[&str]) -> Result<(), LoadError> {
        for table in tables {
            self.destination.drop_table_if_exists(table).await?;
        }
        Ok(())
    }

    /// Replace `table_name` with exactly the rows in `records`.
    ///
    /// Columns declared by `schema` but missing from a record are stored as
    /// NULL; a record field the schema does not declare is an error.
    pub async fn load(&self, table_name: &str, records: &RecordSet, schema: &TableSchema) -> Result<u64, LoadError> {
        let rows = to_rows(table_name, records, schema)?;

        self.destination.drop_table_if_exists(table_name).await?;
        self.destination.create_table(table_name, schema).await?;
        let inserted = self.destination.insert_rows(table_name, schema, rows).await?;

        info!(
            "Loaded {} rows into {} ({})",
            inserted,
            table_name,
            self.destination.name()
        );
        Ok(inserted)
    }

    /// Apply constraints strictly in order; the first failure aborts.
    pub async fn apply_constraints(&self, constraints: &[Constraint]) -> Result<(), LoadError> {
        for constraint in constraints {
            self.destination.apply_constraint(constraint).await?;
            info!("Applied constraint {} on {}", constraint.name(), constraint.table());
        }
        Ok(())
    }
}

/// Convert records into typed rows in schema column order.
pub fn to_rows(table: &str, records: &RecordSet, schema: &TableSchema) -> Result<Rows, LoadError> {
    records
        .iter()
        .map(|record| {
            if let Some(unknown) = record.keys().find(|k| schema.column(k).is_none()) {
                return Err(LoadError::UnknownColumn {
                    table: table.to_string(),
                    column: unknown.clone(),
                });
            }

            schema
                .columns
                .iter()
                .map(|column| {
                    let value = record.get(column.name).unwrap_or(&Value::Null);
                    coerce(value, column.column_type).map_err(|reason| LoadError::Coercion {
                        table: table.to_string(),
                        column: column.name.to_string(),
                        value: value.to_string(),
                        reason,
                    })
                })
                .collect::<Result<Vec<Cell>, LoadError>>()
        })
        .collect()
}

fn coerce(value: &Value, column_type: ColumnType) -> Result<Cell, String> {
    if value.is_null() {
        return Ok(Cell::Null);
    }

    match column_type {
        ColumnType::String { max_len } => {
            let text = scalar_text(value)?;
            let len = text.chars().count();
            if len > max_len as usize {
                return Err(format!("{} characters exceeds limit of {}", len, max_len));
            }
            Ok(Cell::Text(text))
        }
        ColumnType::Identifier | ColumnType::Text => scalar_text(value).map(Cell::Text),
        ColumnType::Integer => match value {
            Value::Number(n) => n.as_i64().map(Cell::Int).ok_or_else(|| "not an integer".to_string()),
            Value::String(s) => s.trim().parse().map(Cell::Int).map_err(|e| format!("{}", e)),
            _ => Err("not an integer".to_string()),
        },
        ColumnType::Timestamp => match value {
            Value::String(s) => NaiveDateTime::parse_from_str(s, DATE_FORMAT)
                .map(Cell::Timestamp)
                .map_err(|e| e.to_string()),
            _ => Err("not a timestamp string".to_string()),
        },
    }
}

/// Text for scalar JSON values; nested values must be flattened upstream.
fn scalar_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) | Value::Object(_) => Err("nested value in a text column".to_string()),
        Value::Null => Ok(String::new()),
    }
}
