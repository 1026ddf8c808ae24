//! Pipeline configuration.
//!
//! Everything is read once at startup from the environment (a `.env` file is
//! honored by `main`) and then passed explicitly into each component.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::record::ResourceKind;

const DEFAULT_BASE_URL: &str = "https://dummyapi.io/data/v1";
const DEFAULT_DATABASE: &str = "dummyApi";

/// Page sizes the upstream API accepts.
pub const PAGE_SIZE_RANGE: std::ops::RangeInclusive<u32> = 5..=50;

/// Upstream API location and credentials.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent as the `app-id` header on every request.
    pub app_id: String,
}

/// MySQL connection settings.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// How to fetch one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub kind: ResourceKind,
    /// Endpoint path relative to the API base URL, e.g. `user`.
    pub path: String,
    pub page_size: u32,
    /// List pages only carry summary fields; fetch each id's detail payload.
    #[serde(default)]
    pub needs_detail_fetch: bool,
}

impl ResourceConfig {
    pub fn new(kind: ResourceKind, path: impl Into<String>, page_size: u32, needs_detail_fetch: bool) -> Self {
        Self {
            kind,
            path: path.into(),
            page_size,
            needs_detail_fetch,
        }
    }

    /// The stock dummyapi.io resources.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(ResourceKind::User, "user", 10, true),
            Self::new(ResourceKind::Post, "post", 20, true),
            Self::new(ResourceKind::Comment, "comment", 20, false),
        ]
    }

    /// Warn (but do not reject) page sizes the API is documented to refuse.
    pub fn check_page_size(&self) {
        if !PAGE_SIZE_RANGE.contains(&self.page_size) {
            warn!(
                "Page size {} for {} is outside {:?}; the API may reject or clamp it",
                self.page_size, self.kind, PAGE_SIZE_RANGE
            );
        }
    }
}

/// Complete configuration for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub resources: Vec<ResourceConfig>,
}

impl PipelineConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api = ApiConfig {
            base_url: get("DUMMYAPI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            app_id: get("DUMMYAPI_APP_ID").ok_or(ConfigError::Missing("DUMMYAPI_APP_ID"))?,
        };

        let port = match get("MYSQL_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "MYSQL_PORT",
                reason: e.to_string(),
            })?,
            None => 3306,
        };

        let database = DatabaseConfig {
            host: get("MYSQL_HOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            username: get("MYSQL_USER").ok_or(ConfigError::Missing("MYSQL_USER"))?,
            password: lookup("MYSQL_PASSWORD").unwrap_or_default(),
            database: get("MYSQL_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        };

        let resources = match get("DUMMYAPI_RESOURCES") {
            Some(path) => load_resources(Path::new(&path))?,
            None => ResourceConfig::defaults(),
        };

        Ok(Self {
            api,
            database,
            resources,
        })
    }
}

/// Load resource definitions from a JSON array file.
pub fn load_resources(path: &Path) -> Result<Vec<ResourceConfig>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Resources {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let resources: Vec<ResourceConfig> =
        serde_json::from_str(&content).map_err(|e| ConfigError::Resources {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    info!("Loaded {} resource definitions from {:?}", resources.len(), path);
    Ok(resources)
}
