//! Static schema catalog for the destination tables.
//!
//! Types here are dialect-free; `destination::mysql` decides how each one is
//! spelled in DDL.

use crate::record::ResourceKind;

/// Semantic column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Variable-length string up to `max_len` characters.
    String { max_len: u32 },
    /// Short key string, suitable for primary and foreign keys.
    Identifier,
    Integer,
    Timestamp,
    /// Unbounded text.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
}

const fn col(name: &'static str, column_type: ColumnType) -> ColumnDef {
    ColumnDef { name, column_type }
}

const fn string(max_len: u32) -> ColumnType {
    ColumnType::String { max_len }
}

/// Ordered column declarations for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[cfg(test)]
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

/// Key constraints, applied after every table is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    PrimaryKey {
        table: &'static str,
        column: &'static str,
    },
    ForeignKey {
        name: &'static str,
        table: &'static str,
        column: &'static str,
        references_table: &'static str,
        references_column: &'static str,
    },
}

impl Constraint {
    /// Stable name used in logs and errors.
    pub fn name(&self) -> String {
        match self {
            Constraint::PrimaryKey { table, .. } => format!("pk_{}", table),
            Constraint::ForeignKey { name, .. } => name.to_string(),
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Constraint::PrimaryKey { table, .. } | Constraint::ForeignKey { table, .. } => table,
        }
    }
}

const USERS: TableSchema = TableSchema {
    name: "users",
    columns: &[
        col("id", ColumnType::Identifier),
        col("title", string(255)),
        col("firstName", string(255)),
        col("lastName", string(255)),
        col("email", string(500)),
        col("picture", string(500)),
        col("dateOfBirth", ColumnType::Timestamp),
        col("registerDate", ColumnType::Timestamp),
        col("updatedDate", ColumnType::Timestamp),
        col("loc_street", string(255)),
        col("loc_city", string(255)),
        col("loc_state", string(255)),
        col("loc_country", string(255)),
        col("loc_timezone", string(255)),
    ],
};

const POSTS: TableSchema = TableSchema {
    name: "posts",
    columns: &[
        col("id", ColumnType::Identifier),
        col("likes", ColumnType::Integer),
        col("tags", ColumnType::Text),
        col("text", ColumnType::Text),
        col("publishDate", ColumnType::Timestamp),
        col("ownerId", ColumnType::Identifier),
        col("link", ColumnType::Text),
    ],
};

const COMMENTS: TableSchema = TableSchema {
    name: "comments",
    columns: &[
        col("id", ColumnType::Identifier),
        col("message", ColumnType::Text),
        col("post", ColumnType::Identifier),
        col("publishDate", ColumnType::Timestamp),
        col("ownerId", ColumnType::Identifier),
    ],
};

/// Table schemas and the constraint pass for the whole destination.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<TableSchema>,
    constraints: Vec<Constraint>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            tables: vec![USERS, POSTS, COMMENTS],
            // Order matters: a foreign key is only added once its parent key exists.
            // comments.post is intentionally left unconstrained.
            constraints: vec![
                Constraint::PrimaryKey { table: "users", column: "id" },
                Constraint::PrimaryKey { table: "posts", column: "id" },
                Constraint::ForeignKey {
                    name: "fk_posts_owner",
                    table: "posts",
                    column: "ownerId",
                    references_table: "users",
                    references_column: "id",
                },
                Constraint::PrimaryKey { table: "comments", column: "id" },
                Constraint::ForeignKey {
                    name: "fk_comments_owner",
                    table: "comments",
                    column: "ownerId",
                    references_table: "users",
                    references_column: "id",
                },
            ],
        }
    }
}

impl Catalog {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_for(&self, kind: ResourceKind) -> Option<&TableSchema> {
        self.table(kind.table_name())
    }

    /// Constraints in the order they must be applied.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}
