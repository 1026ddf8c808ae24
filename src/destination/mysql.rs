//! MySQL destination backed by sqlx.

use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::QueryBuilder;
use tracing::{debug, info};

use super::{Cell, Destination, Rows};
use crate::catalog::{ColumnType, Constraint, TableSchema};
use crate::config::DatabaseConfig;
use crate::error::LoadError;

/// MySQL caps a single statement at 65535 bound parameters.
const MAX_BIND_PARAMS: usize = 65_535;
const MAX_BATCH_ROWS: usize = 1_000;

pub struct MySqlDestination {
    /// Server-level pool, used only to create the database.
    server: MySqlPool,
    pool: MySqlPool,
    database: String,
}

impl MySqlDestination {
    /// Build lazily-connected pools; nothing touches the network until first use.
    pub fn new(config: &DatabaseConfig) -> Self {
        let server_options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password);
        let database_options = server_options.clone().database(&config.database);

        Self {
            server: MySqlPoolOptions::new()
                .max_connections(1)
                .connect_lazy_with(server_options),
            pool: MySqlPoolOptions::new()
                .max_connections(2)
                .connect_lazy_with(database_options),
            database: config.database.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Destination for MySqlDestination {
    fn name(&self) -> &str {
        "mysql"
    }

    async fn ensure_database(&self) -> Result<(), LoadError> {
        sqlx::raw_sql(&create_database_sql(&self.database))
            .execute(&self.server)
            .await?;
        info!("Database {} is ready", self.database);
        Ok(())
    }

    async fn drop_table_if_exists(&self, table: &str) -> Result<(), LoadError> {
        sqlx::raw_sql(&drop_table_sql(&self.database, table))
            .execute(&self.pool)
            .await?;
        debug!("Dropped table {} (if it existed)", table);
        Ok(())
    }

    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), LoadError> {
        let sql = create_table_sql(table, schema);
        debug!("Creating table: {}", sql);
        sqlx::raw_sql(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_rows(&self, table: &str, schema: &TableSchema, rows: Rows) -> Result<u64, LoadError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let batch_size = batch_rows(schema.columns.len());
        let prefix = insert_prefix(table, schema);
        let mut inserted = 0u64;

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(batch_size) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(&prefix);
            builder.push_values(chunk, |mut values, row| {
                for cell in row {
                    match cell {
                        Cell::Null => {
                            values.push_bind(None::<String>);
                        }
                        Cell::Text(s) => {
                            values.push_bind(s.clone());
                        }
                        Cell::Int(n) => {
                            values.push_bind(*n);
                        }
                        Cell::Timestamp(ts) => {
                            values.push_bind(*ts);
                        }
                    }
                }
            });

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
            debug!("Inserted batch of {} rows into {}", chunk.len(), table);
        }
        tx.commit().await?;

        Ok(inserted)
    }

    async fn apply_constraint(&self, constraint: &Constraint) -> Result<(), LoadError> {
        sqlx::raw_sql(&constraint_sql(constraint))
            .execute(&self.pool)
            .await
            .map_err(|e| LoadError::Constraint {
                name: constraint.name(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

// ============================================================================
// SQL generation
// ============================================================================

/// Backtick-quote an identifier, doubling embedded backticks.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn column_sql_type(column_type: ColumnType) -> String {
    match column_type {
        ColumnType::String { max_len } => format!("VARCHAR({})", max_len),
        ColumnType::Identifier => "VARCHAR(255)".to_string(),
        ColumnType::Integer => "INT".to_string(),
        ColumnType::Timestamp => "DATETIME".to_string(),
        ColumnType::Text => "TEXT".to_string(),
    }
}

pub fn create_database_sql(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database))
}

pub fn drop_table_sql(database: &str, table: &str) -> String {
    format!(
        "DROP TABLE IF EXISTS {}.{}",
        quote_ident(database),
        quote_ident(table)
    )
}

pub fn create_table_sql(table: &str, schema: &TableSchema) -> String {
    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(c.name), column_sql_type(c.column_type)))
        .collect();

    format!(
        "CREATE TABLE {} ({}) DEFAULT CHARSET=utf8mb4",
        quote_ident(table),
        columns.join(", ")
    )
}

pub fn constraint_sql(constraint: &Constraint) -> String {
    match constraint {
        Constraint::PrimaryKey { table, column } => format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            quote_ident(table),
            quote_ident(column)
        ),
        Constraint::ForeignKey {
            name,
            table,
            column,
            references_table,
            references_column,
        } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(table),
            quote_ident(name),
            quote_ident(column),
            quote_ident(references_table),
            quote_ident(references_column)
        ),
    }
}

fn insert_prefix(table: &str, schema: &TableSchema) -> String {
    let columns: Vec<String> = schema.columns.iter().map(|c| quote_ident(c.name)).collect();
    format!("INSERT INTO {} ({}) ", quote_ident(table), columns.join(", "))
}

fn batch_rows(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).clamp(1, MAX_BATCH_ROWS)
}
