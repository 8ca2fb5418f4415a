// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, static index
// - GET /api/publications (pagination, profile on page 1 only, bad params)
// - GET /api/years, /api/search, /api/test-db
// - POST /api/admin/sync-scholar (fake source, admin secret)
// - uniform JSON 404 / 405 / database-missing errors

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use scholar_publications::config::AppConfig;
use scholar_publications::metrics::Metrics;
use scholar_publications::model::Publication;
use scholar_publications::scholar::retry::{RecordingSleeper, Throttle};
use scholar_publications::scholar::types::{
    AuthorStats, PublicationStub, RawAuthor, RawPublication, ScholarSource,
};
use scholar_publications::storage::Store;
use scholar_publications::{app_state, build_fetcher, router};

const BODY_LIMIT: usize = 1024 * 1024;

struct TwoPaperSource;

#[async_trait]
impl ScholarSource for TwoPaperSource {
    async fn fetch_author(&self, _id: &str) -> Result<RawAuthor> {
        Ok(RawAuthor {
            name: Some("Abhishek Dixit".into()),
            affiliation: Some("IIT Delhi".into()),
            stats: AuthorStats {
                cited_by: 42,
                h_index: 2,
                i10_index: 1,
            },
            publications: vec![
                PublicationStub {
                    id: "a".into(),
                    title: "Neural access networks".into(),
                    year: Some("2022".into()),
                    citations: Some(30),
                },
                PublicationStub {
                    id: "b".into(),
                    title: "Untitled note".into(),
                    year: None,
                    citations: Some(12),
                },
            ],
        })
    }

    async fn fetch_publication(&self, stub: &PublicationStub) -> Result<RawPublication> {
        Ok(RawPublication {
            title: Some(stub.title.clone()),
            authors: Some("A Dixit, J Smith".into()),
            venue: Some("Optics Express".into()),
            pub_year: stub.year.clone(),
            num_citations: stub.citations,
            pub_url: None,
        })
    }

    fn name(&self) -> &'static str {
        "two-paper"
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    app: Router,
    store: Option<Store>,
}

async fn harness(with_db: bool, tweak: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let static_dir = dir.path().join("static");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("publications.html"), "<h1>Publications</h1>").unwrap();
    std::fs::write(static_dir.join("app.css"), "body{}").unwrap();

    let mut config = AppConfig {
        static_dir,
        ..AppConfig::default()
    };
    config.fetch.throttle = Throttle::fixed(Duration::ZERO);
    tweak(&mut config);

    let store = if with_db {
        let url = format!("sqlite://{}", dir.path().join("api.db").display());
        Some(Store::connect(&url).await.expect("connect"))
    } else {
        None
    };

    let fetcher = build_fetcher(
        &config,
        Arc::new(TwoPaperSource),
        Arc::new(RecordingSleeper::new()),
        &[],
    );
    let metrics = Metrics::detached();
    let app = router(app_state(config, store.clone(), fetcher), Some(&metrics));
    Harness {
        _dir: dir,
        app,
        store,
    }
}

async fn seeded(n: i32) -> Harness {
    let h = harness(true, |_| {}).await;
    let rows: Vec<Publication> = (1..=n)
        .map(|i| Publication {
            title: if i == 1 { "Neural nets".into() } else { format!("Paper {i}") },
            authors: "<strong>A Dixit</strong>".into(),
            venue: "Venue".into(),
            year: if i % 4 == 0 { None } else { Some(2015 + i % 3) },
            citations: i64::from(i),
            scholar_url: String::new(),
            pub_number: i,
        })
        .collect();
    h.store.as_ref().unwrap().bulk_replace(&rows).await.unwrap();
    h
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    send(app, "GET", uri).await
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Json) {
    let (status, bytes) = get(app, uri).await;
    let v: Json = serde_json::from_slice(&bytes).expect("json body");
    (status, v)
}

async fn post_sync(app: &Router, secret: Option<&str>) -> (StatusCode, Json) {
    let mut req = Request::builder()
        .method("POST")
        .uri("/api/admin/sync-scholar");
    if let Some(s) = secret {
        req = req.header("X-Admin-Secret", s);
    }
    let resp = app
        .clone()
        .oneshot(req.body(Body::empty()).unwrap())
        .await
        .expect("oneshot sync");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn health_and_static_index() {
    let h = harness(false, |_| {}).await;

    let (status, body) = get(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");

    let (status, body) = get(&h.app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Publications"));

    let (status, _) = get(&h.app, "/app.css").await;
    assert_eq!(status, StatusCode::OK);

    let (status, v) = get_json(&h.app, "/missing.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"], "Endpoint not found");
}

#[tokio::test]
async fn wrong_method_and_missing_asset_answer_json() {
    let h = seeded(3).await;

    let (status, body) = send(&h.app, "DELETE", "/api/publications").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let v: Json = serde_json::from_slice(&body).expect("json body");
    assert_eq!(v["error"], "Method not allowed");

    let (status, body) = send(&h.app, "GET", "/api/admin/sync-scholar").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let v: Json = serde_json::from_slice(&body).expect("json body");
    assert_eq!(v["error"], "Method not allowed");

    let (status, body) = send(&h.app, "POST", "/nested/missing.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let v: Json = serde_json::from_slice(&body).expect("json body");
    assert_eq!(v["error"], "Endpoint not found");
}

#[tokio::test]
async fn publications_first_page_carries_profile() {
    let h = seeded(12).await;

    let (status, v) = get_json(&h.app, "/api/publications").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["publications"].as_array().unwrap().len(), 5);
    assert_eq!(v["pagination"]["page"], 1);
    assert_eq!(v["pagination"]["per_page"], 5);
    assert_eq!(v["pagination"]["total"], 12);
    assert_eq!(v["pagination"]["total_pages"], 3);
    assert_eq!(v["pagination"]["has_next"], true);
    // No sync yet: placeholder profile.
    assert_eq!(v["profile"]["name"], "Abhishek Dixit");
    assert!(v["response_time"].is_u64());
    assert!(v["source"].is_string());
    assert!(v["last_updated"].is_string());

    let (_, v2) = get_json(&h.app, "/api/publications?page=3&per_page=5").await;
    assert!(v2["profile"].is_null());
    assert_eq!(v2["publications"].as_array().unwrap().len(), 2);
    assert_eq!(v2["pagination"]["has_next"], false);
}

#[tokio::test]
async fn publications_year_filter_and_unknown_label() {
    let h = seeded(12).await;

    let (status, v) = get_json(&h.app, "/api/publications?year=Unknown&per_page=50").await;
    assert_eq!(status, StatusCode::OK);
    let pubs = v["publications"].as_array().unwrap();
    assert_eq!(pubs.len(), 3);
    assert!(pubs.iter().all(|p| p["year"] == "Unknown"));

    let (_, v) = get_json(&h.app, "/api/publications?year=2016&per_page=50").await;
    assert!(v["publications"]
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["year"] == 2016));
}

#[tokio::test]
async fn bad_paging_params_are_400() {
    let h = seeded(3).await;
    for uri in [
        "/api/publications?page=abc",
        "/api/publications?page=0",
        "/api/publications?per_page=0",
        "/api/publications?year=soon",
        "/api/search?q=x&page=-1",
    ] {
        let (status, v) = get_json(&h.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(v["error"].is_string(), "{uri}");
    }

    let (status, v) = get_json(&h.app, "/api/publications?per_page=1000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["pagination"]["per_page"], 100);
}

#[tokio::test]
async fn years_are_ordered_with_unknown_last() {
    let h = seeded(12).await;
    let (status, bytes) = get(&h.app, "/api/years").await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_slice(&bytes).unwrap();
    let keys: Vec<&str> = v.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["2017", "2016", "2015", "Unknown"]);
    assert_eq!(v["Unknown"], 3);
}

#[tokio::test]
async fn search_requires_query_and_matches() {
    let h = seeded(12).await;

    let (status, v) = get_json(&h.app, "/api/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "Search query required");

    let (status, _) = get_json(&h.app, "/api/search?q=%20%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, v) = get_json(&h.app, "/api/search?q=NEURAL").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["total"], 1);
    assert_eq!(v["query"], "NEURAL");
    assert_eq!(v["page"], 1);
    assert_eq!(v["per_page"], 10);
    assert_eq!(v["publications"][0]["title"], "Neural nets");
}

#[tokio::test]
async fn test_db_reports_counts() {
    let h = seeded(4).await;
    let (status, v) = get_json(&h.app, "/api/test-db").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "success");
    assert_eq!(v["total_publications"], 4);
    assert!(v["database_version"].as_str().unwrap().starts_with("SQLite"));
}

#[tokio::test]
async fn missing_database_gives_uniform_500() {
    let h = harness(false, |_| {}).await;
    for uri in ["/api/publications", "/api/years", "/api/search?q=x", "/api/test-db"] {
        let (status, v) = get_json(&h.app, uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(v["error"], "Database not available", "{uri}");
        assert!(v["suggestion"].is_string(), "{uri}");
    }
    let (status, v) = post_sync(&h.app, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(v["error"], "Database not available");
}

#[tokio::test]
async fn unknown_api_route_is_json_404() {
    let h = harness(false, |_| {}).await;
    let (status, v) = get_json(&h.app, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"], "Endpoint not found");
}

#[tokio::test]
async fn admin_sync_replaces_store() {
    let h = seeded(12).await;

    let (status, v) = post_sync(&h.app, None).await;
    assert_eq!(status, StatusCode::OK, "{v}");
    assert_eq!(v["message"], "Data synced successfully");
    assert_eq!(v["total_publications"], 2);

    let (_, v) = get_json(&h.app, "/api/publications").await;
    assert_eq!(v["pagination"]["total"], 2);
    assert_eq!(v["profile"]["total_citations"], 42);
    assert_eq!(v["publications"][0]["year"], 2022);
    assert_eq!(
        v["publications"][0]["authors"],
        "<strong>A Dixit</strong>, J Smith"
    );
    assert_eq!(v["publications"][1]["year"], "Unknown");
}

#[tokio::test]
async fn admin_sync_can_require_secret() {
    let h = harness(true, |c| {
        c.sync_require_secret = true;
        c.secret_key = "s3cret".into();
    })
    .await;

    let (status, _) = post_sync(&h.app, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = post_sync(&h.app, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, v) = post_sync(&h.app, Some("s3cret")).await;
    assert_eq!(status, StatusCode::OK, "{v}");
}

#[tokio::test]
async fn metrics_route_is_mounted() {
    let h = harness(false, |_| {}).await;
    let (status, _) = get(&h.app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}
