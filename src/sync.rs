// src/sync.rs
//! One sync run: fetch everything, replace the publication table, refresh the profile.
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::scholar::normalize::flatten_groups;
use crate::scholar::ScholarFetcher;
use crate::storage::Store;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Sync runs by outcome.");
        describe_gauge!(
            "sync_last_success_ts",
            "Unix timestamp of the last fully successful sync."
        );
        describe_histogram!("sync_duration_seconds", "Wall time of a sync run.");
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub total_publications: usize,
    pub skipped: usize,
    pub total_citations: i64,
    pub h_index: i64,
    pub i10_index: i64,
    pub fetch_secs: f64,
    pub insert_secs: f64,
}

pub struct SyncOrchestrator {
    fetcher: ScholarFetcher,
    store: Store,
    scholar_id: String,
    // Only one run at a time; a second caller is refused rather than queued.
    gate: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(fetcher: ScholarFetcher, store: Store, scholar_id: impl Into<String>) -> Self {
        Self {
            fetcher,
            store,
            scholar_id: scholar_id.into(),
            gate: Mutex::new(()),
        }
    }

    pub fn scholar_id(&self) -> &str {
        &self.scholar_id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        ensure_metrics_described();
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::warn!(target: "sync", scholar_id = %self.scholar_id, "sync already running");
            counter!("sync_runs_total", "outcome" => "already_running").increment(1);
            return Err(SyncError::AlreadyRunning);
        };

        let started = Instant::now();
        tracing::info!(target: "sync", scholar_id = %self.scholar_id, "sync started");
        let result = self.run().await;
        let elapsed = started.elapsed().as_secs_f64();
        histogram!("sync_duration_seconds").record(elapsed);

        match &result {
            Ok(report) => {
                counter!("sync_runs_total", "outcome" => "success").increment(1);
                gauge!("sync_last_success_ts").set(chrono::Utc::now().timestamp() as f64);
                tracing::info!(
                    target: "sync",
                    publications = report.total_publications,
                    skipped = report.skipped,
                    citations = report.total_citations,
                    h_index = report.h_index,
                    i10_index = report.i10_index,
                    fetch_secs = report.fetch_secs,
                    insert_secs = report.insert_secs,
                    "sync finished"
                );
            }
            Err(e) => {
                counter!("sync_runs_total", "outcome" => e.kind()).increment(1);
                tracing::error!(target: "sync", kind = e.kind(), error = %e, elapsed_secs = elapsed, "sync failed");
            }
        }
        result
    }

    async fn run(&self) -> Result<SyncReport, SyncError> {
        let t_fetch = Instant::now();
        let snapshot = self
            .fetcher
            .fetch_scholar_data(&self.scholar_id)
            .await
            .ok_or(SyncError::FetchFailed {
                attempts: self.fetcher.max_attempts(),
            })?;
        let fetch_secs = t_fetch.elapsed().as_secs_f64();

        let profile = snapshot.profile.clone();
        let skipped = snapshot.skipped;
        let records = flatten_groups(snapshot.publications_by_year);

        let t_insert = Instant::now();
        let replaced = self
            .store
            .bulk_replace(&records)
            .await
            .map_err(SyncError::Storage)?;
        let insert_secs = t_insert.elapsed().as_secs_f64();

        self.store
            .upsert_profile(&profile)
            .await
            .map_err(|source| SyncError::ProfileUpdate { replaced, source })?;

        Ok(SyncReport {
            total_publications: replaced,
            skipped,
            total_citations: profile.total_citations,
            h_index: profile.h_index,
            i10_index: profile.i10_index,
            fetch_secs,
            insert_secs,
        })
    }
}
