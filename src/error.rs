//! Error types for each pipeline stage.
//!
//! Every variant here aborts the run. Data-quality problems (null ids,
//! missing owners, negative likes) never surface as errors: the normalizer
//! drops those rows instead.

use thiserror::Error;

/// Failures while talking to the upstream API.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Malformed payload from {url}: {reason}")]
    MalformedPayload { url: String, reason: String },

    #[error("Cannot build request URL from {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failures while reshaping a record set.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Invalid {field} on record {id}: {value:?} does not match %Y-%m-%d %H:%M:%S")]
    InvalidDate {
        field: String,
        id: String,
        value: String,
    },

    #[error("Failed to encode tags on record {id}: {reason}")]
    TagEncoding { id: String, reason: String },
}

/// Failures while writing tables.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Column {column} is not declared for table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Cannot store {value} in {table}.{column}: {reason}")]
    Coercion {
        table: String,
        column: String,
        value: String,
        reason: String,
    },

    #[error("Table {table}: {message}")]
    Table { table: String, message: String },

    #[error("Constraint {name} could not be applied: {message}")]
    Constraint { name: String, message: String },
}

/// Invalid or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read resources file {path}: {reason}")]
    Resources { path: String, reason: String },
}

/// Top-level error for a pipeline run.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Load failed: {0}")]
    Load(#[from] LoadError),
}
