//! End-to-end driver: fetch → normalize → load → constrain.

use std::collections::HashSet;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::catalog::Catalog;
use crate::config::ResourceConfig;
use crate::destination::Destination;
use crate::error::{ConfigError, EtlError, LoadError};
use crate::loader::TableLoader;
use crate::normalize::normalize;
use crate::record::{RecordSet, ResourceKind};

/// Row counts for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub table: &'static str,
    /// Records returned by the API, before normalization.
    pub fetched: usize,
    pub loaded: u64,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub tables: Vec<TableSummary>,
}

impl RunSummary {
    #[cfg(test)]
    pub fn loaded(&self, table: &str) -> Option<u64> {
        self.tables.iter().find(|t| t.table == table).map(|t| t.loaded)
    }
}

pub struct Pipeline<D> {
    api: ApiClient,
    loader: TableLoader<D>,
    catalog: Catalog,
    /// Sorted parents-first.
    resources: Vec<ResourceConfig>,
}

impl<D: Destination> Pipeline<D> {
    /// Validate the resource list: every kind must appear exactly once and
    /// have a table in the catalog.
    pub fn new(
        api: ApiClient,
        loader: TableLoader<D>,
        catalog: Catalog,
        mut resources: Vec<ResourceConfig>,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for resource in &resources {
            if !seen.insert(resource.kind) {
                return Err(ConfigError::Invalid {
                    key: "resources",
                    reason: format!("{} is configured more than once", resource.kind),
                });
            }
            if catalog.table_for(resource.kind).is_none() {
                return Err(ConfigError::Invalid {
                    key: "resources",
                    reason: format!("no table declared for {}", resource.kind),
                });
            }
        }
        if let Some(missing) = ResourceKind::ALL.iter().find(|k| !seen.contains(*k)) {
            return Err(ConfigError::Invalid {
                key: "resources",
                reason: format!("{} is not configured", missing),
            });
        }

        resources.sort_by_key(|r| r.kind);

        Ok(Self {
            api,
            loader,
            catalog,
            resources,
        })
    }

    #[cfg(test)]
    pub fn loader(&self) -> &TableLoader<D> {
        &self.loader
    }

    /// Run the whole pipeline once.
    ///
    /// Every resource is fetched and normalized before the database is
    /// touched, so an upstream failure leaves existing tables intact.
    pub async fn run(&self) -> Result<RunSummary, EtlError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("etl_run", %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary, EtlError> {
        info!("Starting run against {}", self.loader.destination().name());

        let mut staged: Vec<(ResourceKind, usize, RecordSet)> = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            let fetched = self.api.fetch_all(resource).await?;
            let fetched_count = fetched.len();
            let normalized = normalize(fetched, resource.kind)?;
            info!(
                "{}: {} fetched, {} kept after normalization",
                resource.kind,
                fetched_count,
                normalized.len()
            );
            staged.push((resource.kind, fetched_count, normalized));
        }

        self.loader.ensure_database().await?;

        let drop_order: Vec<&str> = staged.iter().rev().map(|(kind, _, _)| kind.table_name()).collect();
        self.loader.reset(&drop_order).await?;

        let mut tables = Vec::with_capacity(staged.len());
        for (kind, fetched, records) in &staged {
            let schema = self.catalog.table_for(*kind).ok_or_else(|| LoadError::Table {
                table: kind.table_name().to_string(),
                message: "not declared in catalog".to_string(),
            })?;
            let loaded = self.loader.load(kind.table_name(), records, schema).await?;
            tables.push(TableSummary {
                table: kind.table_name(),
                fetched: *fetched,
                loaded,
            });
        }

        self.loader.apply_constraints(self.catalog.constraints()).await?;

        info!("Run complete: {} tables loaded", tables.len());
        Ok(RunSummary { run_id, tables })
    }
}
