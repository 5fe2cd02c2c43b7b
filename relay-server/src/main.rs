use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relay_core::config::StoreBackend;
use relay_core::models::TenantIntegration;
use relay_core::{GeminiClient, MemoryStore, PgStore, RelayConfig, RelayStore};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use relay_server::RelayState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "relay.toml")]
    config: String,

    /// Check the store and exit.
    #[arg(long)]
    health: bool,
}

async fn open_store(config: &RelayConfig) -> anyhow::Result<Arc<dyn RelayStore>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let pool = relay_core::db::create_pool(&config.database)
                .await
                .context("Failed to connect to database")?;
            relay_core::db::apply_schema(&pool)
                .await
                .context("Failed to apply schema")?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        StoreBackend::Memory => {
            let tenants = match &config.database.seed_file {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read seed file {}", path))?;
                    serde_json::from_str::<Vec<TenantIntegration>>(&raw)
                        .with_context(|| format!("Failed to parse seed file {}", path))?
                }
                None => Vec::new(),
            };
            tracing::info!(tenants = tenants.len(), "Using in-memory store");
            Ok(Arc::new(MemoryStore::with_tenants(tenants)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match RelayConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let store = match open_store(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ {} store healthy: {}", store.name(), v),
            Err(e) => {
                println!("❌ {} store check failed: {}", store.name(), e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let model = Arc::new(GeminiClient::new(&config.ai)?);
    let http = reqwest::Client::new();
    let (state, jobs) = RelayState::new(config, store, model, http);
    let state = Arc::new(state);

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    tokio::spawn(relay_server::worker::run_dispatch_worker(
        state.clone(),
        jobs,
        tx.subscribe(),
    ));

    relay_server::http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
