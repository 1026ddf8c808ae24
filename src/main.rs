//! dummyapi-etl - Load dummyapi.io users, posts and comments into MySQL.

mod api;
mod catalog;
mod config;
mod destination;
mod error;
mod loader;
mod normalize;
mod pipeline;
mod record;

use api::ApiClient;
use catalog::Catalog;
use config::PipelineConfig;
use destination::mysql::MySqlDestination;
use loader::TableLoader;
use pipeline::Pipeline;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "dummyapi_etl=info,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env()?;
    info!(
        "Loading {} resources from {} into {}@{}:{}/{}",
        config.resources.len(),
        config.api.base_url,
        config.database.username,
        config.database.host,
        config.database.port,
        config.database.database
    );

    let api = ApiClient::new(&config.api);
    let loader = TableLoader::new(MySqlDestination::new(&config.database));
    let pipeline = Pipeline::new(api, loader, Catalog::default(), config.resources)?;

    match pipeline.run().await {
        Ok(summary) => {
            for table in &summary.tables {
                info!("{}: {} fetched, {} loaded", table.table, table.fetched, table.loaded);
            }
            info!("Run {} finished", summary.run_id);
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
