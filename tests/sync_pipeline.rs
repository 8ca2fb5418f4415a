// tests/sync_pipeline.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scholar_publications::config::AppConfig;
use scholar_publications::error::SyncError;
use scholar_publications::model::YearFilter;
use scholar_publications::scholar::retry::{RecordingSleeper, Throttle};
use scholar_publications::scholar::types::{
    AuthorStats, PublicationStub, RawAuthor, RawPublication, ScholarSource,
};
use scholar_publications::storage::Store;
use scholar_publications::sync::SyncOrchestrator;
use scholar_publications::build_fetcher;
use tokio::sync::Notify;

/// Ten publications; the fifth detail page always fails. Optionally parks on `gate`.
struct MockSource {
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl ScholarSource for MockSource {
    async fn fetch_author(&self, _id: &str) -> Result<RawAuthor> {
        if let Some(g) = &self.gate {
            g.notified().await;
        }
        Ok(RawAuthor {
            name: None,
            affiliation: None,
            stats: AuthorStats {
                cited_by: 77,
                h_index: 4,
                i10_index: 2,
            },
            publications: (1..=10)
                .map(|i| PublicationStub {
                    id: i.to_string(),
                    title: format!("Paper {i}"),
                    year: Some(format!("{}", 2010 + i)),
                    citations: Some(i),
                })
                .collect(),
        })
    }

    async fn fetch_publication(&self, stub: &PublicationStub) -> Result<RawPublication> {
        if stub.id == "5" {
            return Err(anyhow!("detail page timed out"));
        }
        Ok(RawPublication {
            title: Some(stub.title.clone()),
            authors: Some("J Smith, Abhishek Dixit".into()),
            venue: Some("Journal of Lightwave Technology".into()),
            pub_year: stub.year.clone(),
            num_citations: stub.citations,
            pub_url: Some(format!("https://example.test/{}", stub.id)),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

async fn orchestrator(gate: Option<Arc<Notify>>) -> (tempfile::TempDir, Arc<SyncOrchestrator>) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("pipeline.db").display());
    let store = Store::connect(&url).await.unwrap();

    let mut config = AppConfig::default();
    config.fetch.throttle = Throttle::fixed(Duration::ZERO);
    let fetcher = build_fetcher(
        &config,
        Arc::new(MockSource { gate }),
        Arc::new(RecordingSleeper::new()),
        &[],
    );
    let orch = SyncOrchestrator::new(fetcher, store, config.scholar_id.clone());
    (dir, Arc::new(orch))
}

#[tokio::test]
async fn failing_item_is_skipped_and_rest_committed() {
    let (_dir, orch) = orchestrator(None).await;

    let report = orch.sync_now().await.expect("sync");
    assert_eq!(report.total_publications, 9);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.total_citations, 77);

    let page = orch
        .store()
        .list_publications(1, 20, YearFilter::All)
        .await
        .unwrap();
    let mut seqs: Vec<i32> = page.publications.iter().map(|p| p.pub_number).collect();
    seqs.sort();
    assert_eq!(seqs, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
    assert!(page.publications[0]
        .authors
        .contains("<strong>Abhishek Dixit</strong>"));

    // Name missing on the source side falls back to the configured owner.
    let profile = orch.store().get_profile().await.unwrap().unwrap();
    assert_eq!(profile.name, "Abhishek Dixit");
    assert_eq!(profile.total_publications, 9);
}

#[tokio::test]
async fn concurrent_sync_is_refused() {
    let gate = Arc::new(Notify::new());
    let (_dir, orch) = orchestrator(Some(gate.clone())).await;

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.sync_now().await })
    };
    // Wait until the first run holds the gate.
    for _ in 0..100 {
        if orch.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(orch.is_running());

    let second = orch.sync_now().await;
    assert!(matches!(second, Err(SyncError::AlreadyRunning)));

    gate.notify_one();
    let report = first.await.unwrap().expect("first sync");
    assert_eq!(report.total_publications, 9);
    assert!(!orch.is_running());
}
