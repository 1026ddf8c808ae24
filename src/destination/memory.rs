//! In-memory destination for tests.
//!
//! Mirrors the MySQL behavior the pipeline relies on: creating an existing
//! table fails, and keys are validated against the stored rows when the
//! constraint is added.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{Cell, Destination, Rows};
use crate::catalog::{Constraint, TableSchema};
use crate::error::LoadError;

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Rows,
    pub constraints: Vec<String>,
}

impl MemoryTable {
    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column` in every row.
    pub fn column_values(&self, column: &str) -> Vec<Cell> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().map(|r| r[idx].clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Find a row by its `id` text.
    pub fn row_by_id(&self, id: &str) -> Option<HashMap<String, Cell>> {
        let idx = self.column_index("id")?;
        let row = self
            .rows
            .iter()
            .find(|r| r[idx] == Cell::Text(id.to_string()))?;
        Some(self.columns.iter().cloned().zip(row.iter().cloned()).collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDestination {
    database_ready: Mutex<bool>,
    tables: Mutex<HashMap<String, MemoryTable>>,
    /// Every operation, in call order, e.g. `drop:users`.
    log: Mutex<Vec<String>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    pub fn database_ready(&self) -> bool {
        *self.database_ready.lock().unwrap()
    }

    pub fn operations(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, op: String) {
        self.log.lock().unwrap().push(op);
    }

    fn violation(constraint: &Constraint, message: String) -> LoadError {
        LoadError::Constraint {
            name: constraint.name(),
            message,
        }
    }
}

#[async_trait::async_trait]
impl Destination for MemoryDestination {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_database(&self) -> Result<(), LoadError> {
        *self.database_ready.lock().unwrap() = true;
        self.record("ensure_database".to_string());
        Ok(())
    }

    async fn drop_table_if_exists(&self, table: &str) -> Result<(), LoadError> {
        self.tables.lock().unwrap().remove(table);
        self.record(format!("drop:{}", table));
        Ok(())
    }

    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), LoadError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(table) {
            return Err(LoadError::Table {
                table: table.to_string(),
                message: "already exists".to_string(),
            });
        }
        tables.insert(
            table.to_string(),
            MemoryTable {
                columns: schema.column_names().into_iter().map(String::from).collect(),
                ..Default::default()
            },
        );
        drop(tables);
        self.record(format!("create:{}", table));
        Ok(())
    }

    async fn insert_rows(&self, table: &str, _schema: &TableSchema, rows: Rows) -> Result<u64, LoadError> {
        let mut tables = self.tables.lock().unwrap();
        let target = tables.get_mut(table).ok_or_else(|| LoadError::Table {
            table: table.to_string(),
            message: "does not exist".to_string(),
        })?;
        let count = rows.len() as u64;
        target.rows.extend(rows);
        drop(tables);
        self.record(format!("insert:{}:{}", table, count));
        Ok(count)
    }

    async fn apply_constraint(&self, constraint: &Constraint) -> Result<(), LoadError> {
        let mut tables = self.tables.lock().unwrap();

        match constraint {
            Constraint::PrimaryKey { table, column } => {
                let target = tables
                    .get(*table)
                    .ok_or_else(|| Self::violation(constraint, format!("table {} missing", table)))?;
                let mut seen = HashSet::new();
                for value in target.column_values(column) {
                    if value == Cell::Null {
                        return Err(Self::violation(constraint, "null key".to_string()));
                    }
                    if !seen.insert(format!("{:?}", value)) {
                        return Err(Self::violation(constraint, format!("duplicate key {:?}", value)));
                    }
                }
            }
            Constraint::ForeignKey {
                table,
                column,
                references_table,
                references_column,
                ..
            } => {
                let parent = tables.get(*references_table).ok_or_else(|| {
                    Self::violation(constraint, format!("table {} missing", references_table))
                })?;
                let keys: HashSet<String> = parent
                    .column_values(references_column)
                    .iter()
                    .map(|v| format!("{:?}", v))
                    .collect();
                let child = tables
                    .get(*table)
                    .ok_or_else(|| Self::violation(constraint, format!("table {} missing", table)))?;
                for value in child.column_values(column) {
                    if value != Cell::Null && !keys.contains(&format!("{:?}", value)) {
                        return Err(Self::violation(
                            constraint,
                            format!("{:?} has no matching {}.{}", value, references_table, references_column),
                        ));
                    }
                }
            }
        }

        if let Some(target) = tables.get_mut(constraint.table()) {
            target.constraints.push(constraint.name());
        }
        drop(tables);
        self.record(format!("constraint:{}", constraint.name()));
        Ok(())
    }
}
