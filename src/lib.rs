// src/lib.rs
// Public library surface shared by both binaries and the integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod scholar;
pub mod storage;
pub mod sync;

pub use crate::api::{router, AppState};

use std::sync::Arc;

use crate::config::AppConfig;
use crate::scholar::normalize::AuthorHighlighter;
use crate::scholar::providers::google_scholar::GoogleScholarSource;
use crate::scholar::retry::DynSleeper;
use crate::scholar::{DynSource, ScholarFetcher};
use crate::storage::Store;
use crate::sync::SyncOrchestrator;

/// Open the configured database. Failures are logged and yield `None` so the
/// server can still come up and answer with uniform errors.
pub async fn connect_store(config: &AppConfig) -> Option<Store> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::error!("DATABASE_URL not set; data routes are disabled");
        return None;
    };
    match Store::connect(url).await {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::error!(error = %e, "database connection failed; data routes are disabled");
            None
        }
    }
}

/// The real HTTP source, sleeping between listing pages on `sleeper`.
pub fn live_source(config: &AppConfig, sleeper: DynSleeper) -> anyhow::Result<DynSource> {
    let src = GoogleScholarSource::new(
        &config.scholar_base_url,
        config.fetch.page_size,
        config.fetch.request_timeout,
        sleeper,
        config.fetch.throttle,
    )?;
    Ok(Arc::new(src))
}

pub fn build_fetcher(
    config: &AppConfig,
    source: DynSource,
    sleeper: DynSleeper,
    aliases: &[String],
) -> ScholarFetcher {
    ScholarFetcher::new(
        source,
        sleeper,
        &config.fetch,
        AuthorHighlighter::new(&config.owner_name, aliases),
        &config.owner_name,
    )
}

/// Assemble router state; the sync trigger exists only when a store does.
pub fn app_state(config: AppConfig, store: Option<Store>, fetcher: ScholarFetcher) -> AppState {
    let sync = store
        .clone()
        .map(|s| Arc::new(SyncOrchestrator::new(fetcher, s, config.scholar_id.clone())));
    AppState {
        config: Arc::new(config),
        store,
        sync,
    }
}
