// src/metrics.rs
use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::FetchTuning;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and publish the static fetch tuning gauges.
    pub fn init(tuning: &FetchTuning) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow!("prometheus: install recorder: {e}"))?;

        gauge!("scholar_item_delay_min_ms").set(tuning.throttle.min.as_millis() as f64);
        gauge!("scholar_retry_max_attempts").set(f64::from(tuning.retry.max_attempts));

        Ok(Self { handle })
    }

    /// A handle backed by a recorder that is never installed globally (tests, tooling).
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
