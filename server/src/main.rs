use std::sync::Arc;

use mo11y::api::{server, AppState};
use mo11y::core::config::Config;
use mo11y::core::shutdown::Shutdown;
use mo11y::data::duckdb::TelemetryStore;
use mo11y::data::sqlite::AuthStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let store = Arc::new(TelemetryStore::open(&config.db_path)?);
    tracing::info!(path = %store.db_path(), "connected to duckdb");

    let auth = match &config.auth {
        Some(auth_config) => {
            let auth = Arc::new(AuthStore::open(&auth_config.db_path, &auth_config.pepper).await?);
            auth.bootstrap(auth_config.bootstrap_key.as_deref().unwrap_or(""))
                .await?;
            tracing::info!(path = %auth_config.db_path, "auth enabled");
            Some(auth)
        }
        None => {
            tracing::warn!("auth disabled (MO11Y_AUTH_DISABLED=true)");
            None
        }
    };

    let shutdown = Shutdown::new();
    shutdown.install_signal_handlers();

    let retention_task = store.start_retention_task(config.retention.clone(), shutdown.subscribe());

    let state = AppState {
        store: store.clone(),
        auth: auth.clone(),
        retention: config.retention.clone(),
    };
    server::run(&config, state, shutdown.clone()).await?;

    // Shutdown order: retention worker, auth store, telemetry store
    shutdown.trigger();
    if let Some(task) = retention_task {
        let _ = task.await;
    }
    if let Some(auth) = auth {
        auth.close().await;
    }
    store.close().await?;

    tracing::info!("server exited");
    Ok(())
}
