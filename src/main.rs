//! Publication list service: boots the Axum HTTP server over the SQLite store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use scholar_publications::config::{env_flag, highlight, AppConfig};
use scholar_publications::metrics::Metrics;
use scholar_publications::scholar::retry::{DynSleeper, TokioSleeper};
use scholar_publications::{app_state, build_fetcher, connect_store, live_source, logging, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    logging::init_tracing(env_flag("DEBUG"));

    let config = AppConfig::from_env()?;

    let aliases = highlight::load_aliases(&config.owner_name).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "highlight aliases not loaded");
        Vec::new()
    });

    let metrics = if config.metrics_enabled {
        match Metrics::init(&config.fetch) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let store = connect_store(&config).await;
    let sleeper: DynSleeper = Arc::new(TokioSleeper);
    let source = live_source(&config, sleeper.clone())?;
    let fetcher = build_fetcher(&config, source, sleeper, &aliases);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        %addr,
        scholar_id = %config.scholar_id,
        database = store.is_some(),
        static_dir = %config.static_dir.display(),
        "starting server"
    );

    let app = router(app_state(config, store, fetcher), metrics.as_ref());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
