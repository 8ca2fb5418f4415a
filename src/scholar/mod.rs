// src/scholar/mod.rs
//! Rate-limited fetcher: author profile + every publication's detail page.
pub mod normalize;
pub mod providers;
pub mod retry;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::config::FetchTuning;
use crate::model::{Publication, ProfileUpdate};
use crate::scholar::normalize::{group_by_year, normalize_record, AuthorHighlighter, YearGroup};
use crate::scholar::retry::{DynSleeper, RetryPolicy, Throttle};
use crate::scholar::types::{PublicationStub, RawAuthor, ScholarSource};

pub type DynSource = Arc<dyn ScholarSource>;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "scholar_fetch_attempts_total",
            "Full fetch attempts against the scholar source."
        );
        describe_counter!(
            "scholar_publications_fetched_total",
            "Publication detail pages fetched and normalized."
        );
        describe_counter!(
            "scholar_publications_skipped_total",
            "Publications skipped because their detail fetch failed."
        );
        describe_counter!("scholar_http_errors_total", "Scholar HTTP/transport errors.");
        describe_histogram!("scholar_fetch_seconds", "Wall time of a complete fetch.");
    });
}

/// Outcome of walking every publication stub once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Harvest {
    pub publications: Vec<Publication>,
    pub skipped: usize,
}

/// A complete, successful scrape, held by the orchestrator until committed.
#[derive(Debug, Clone)]
pub struct ScholarSnapshot {
    pub profile: ProfileUpdate,
    pub publications_by_year: Vec<YearGroup>,
    pub total_publications: usize,
    pub skipped: usize,
    pub fetched_at: DateTime<Utc>,
}

pub struct ScholarFetcher {
    source: DynSource,
    sleeper: DynSleeper,
    policy: RetryPolicy,
    throttle: Throttle,
    progress_every: usize,
    highlighter: AuthorHighlighter,
    default_name: String,
}

impl ScholarFetcher {
    pub fn new(
        source: DynSource,
        sleeper: DynSleeper,
        tuning: &FetchTuning,
        highlighter: AuthorHighlighter,
        default_name: &str,
    ) -> Self {
        Self {
            source,
            sleeper,
            policy: tuning.retry,
            throttle: tuning.throttle,
            progress_every: tuning.progress_every.max(1),
            highlighter,
            default_name: default_name.to_string(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts.max(1)
    }

    /// Fetch everything for `scholar_id`. `None` once the retry ceiling is exhausted.
    pub async fn fetch_scholar_data(&self, scholar_id: &str) -> Option<ScholarSnapshot> {
        ensure_metrics_described();
        let t0 = std::time::Instant::now();
        let out = self
            .policy
            .run(self.sleeper.as_ref(), scholar_id, |_attempt| async move {
                let author = self.source.fetch_author(scholar_id).await?;
                tracing::info!(
                    target: "fetch",
                    source = self.source.name(),
                    name = author.name.as_deref().unwrap_or("Unknown"),
                    total = author.publications.len(),
                    "author found"
                );
                let harvest = self.harvest(&author.publications).await;
                Ok::<_, anyhow::Error>(self.snapshot(scholar_id, author, harvest))
            })
            .await;

        metrics::histogram!("scholar_fetch_seconds").record(t0.elapsed().as_secs_f64());
        if let Some(s) = &out {
            tracing::info!(
                target: "fetch",
                name = %s.profile.name,
                publications = s.total_publications,
                skipped = s.skipped,
                citations = s.profile.total_citations,
                h_index = s.profile.h_index,
                "fetch complete"
            );
        }
        out
    }

    /// Fetch detail for every stub; failures are logged, counted and skipped.
    ///
    /// Sequence numbers are discovery positions, so survivors keep their original order.
    pub async fn harvest(&self, stubs: &[PublicationStub]) -> Harvest {
        let total = stubs.len();
        tracing::info!(target: "fetch", total, "processing publications");

        let mut out = Harvest {
            publications: Vec::with_capacity(total),
            skipped: 0,
        };
        for (i, stub) in stubs.iter().enumerate() {
            let n = i + 1;
            if i == 0 || n % self.progress_every == 0 {
                let pct = n as f64 / total as f64 * 100.0;
                tracing::info!(target: "fetch", processed = n, total, percent = %format!("{pct:.1}"), "progress");
            }

            match self.source.fetch_publication(stub).await {
                Ok(raw) => {
                    let seq = i32::try_from(n).unwrap_or(i32::MAX);
                    out.publications.push(normalize_record(seq, raw, &self.highlighter));
                    counter!("scholar_publications_fetched_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(target: "fetch", index = n, id = %stub.id, error = %format!("{e:#}"), "skipping publication");
                    counter!("scholar_publications_skipped_total").increment(1);
                    out.skipped += 1;
                }
            }

            // Every outbound detail call is followed by the throttle delay.
            self.sleeper.sleep(self.throttle.next_delay()).await;
        }

        tracing::info!(
            target: "fetch",
            processed = out.publications.len(),
            skipped = out.skipped,
            total,
            "publications processed"
        );
        out
    }

    fn snapshot(&self, scholar_id: &str, author: RawAuthor, harvest: Harvest) -> ScholarSnapshot {
        let total = harvest.publications.len();
        let profile = ProfileUpdate {
            name: author
                .name
                .unwrap_or_else(|| self.default_name.clone()),
            affiliation: author.affiliation.unwrap_or_default(),
            scholar_url: providers::google_scholar::scholar_profile_url(scholar_id),
            total_citations: author.stats.cited_by,
            h_index: author.stats.h_index,
            i10_index: author.stats.i10_index,
            total_publications: i64::try_from(total).unwrap_or(i64::MAX),
        };
        ScholarSnapshot {
            profile,
            publications_by_year: group_by_year(harvest.publications),
            total_publications: total,
            skipped: harvest.skipped,
            fetched_at: Utc::now(),
        }
    }
}
