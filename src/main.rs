//! Order sync service entrypoint.
//! Loads config, wires the Shopify client and the warehouse into the sync
//! service, then serves the invocation API (and the optional scheduler).

use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_sync::config::SyncConfig;
use order_sync::ingest::providers::shopify::ShopifyClient;
use order_sync::ingest::scheduler::spawn_scheduler;
use order_sync::metrics::Metrics;
use order_sync::warehouse::SqliteWarehouse;
use order_sync::{router, AppState, SyncService};

const DEFAULT_LOG_FILTER: &str = "order_sync=info,sync=info,api=info,scheduler=info,tower_http=info,warn";

/// `RUST_LOG` wins; `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = SyncConfig::load().context("loading sync config")?;
    tracing::info!(
        shop = %cfg.shop_base_url,
        api_key_len = cfg.api_key.len(),
        warehouse = %cfg.warehouse_path,
        dataset = %cfg.dataset,
        deadline_secs = cfg.deadline.as_secs(),
        "config loaded"
    );

    let metrics = Metrics::install()?;
    let source = ShopifyClient::from_config(&cfg)?;
    let warehouse = SqliteWarehouse::open(&cfg.warehouse_path)?;
    let service = SyncService::new(Arc::new(source), Arc::new(warehouse), cfg.job_options());

    let scheduler = cfg.interval.map(|every| {
        tracing::info!(every_secs = every.as_secs(), "scheduler enabled");
        spawn_scheduler(service.clone(), every)
    });

    let app = router(AppState { service })
        .merge(metrics.router())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!("listening on {}", cfg.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    tracing::info!("shut down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
