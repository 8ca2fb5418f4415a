// src/api.rs
//! HTTP surface: publication reads, search, the sync trigger and the static frontend.
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    handler::HandlerWithoutStateExt,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::{StoreError, SyncError};
use crate::metrics::Metrics;
use crate::model::{Profile, YearFilter};
use crate::storage::Store;
use crate::sync::SyncOrchestrator;

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";
pub const MAX_PER_PAGE: u32 = 100;
const LIST_PER_PAGE: u32 = 5;
const SEARCH_PER_PAGE: u32 = 10;
const SOURCE_LABEL: &str = "sqlite_pool";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// `None` when the database could not be opened at startup.
    pub store: Option<Store>,
    pub sync: Option<Arc<SyncOrchestrator>>,
}

impl AppState {
    fn store(&self) -> Result<&Store, ApiError> {
        self.store.as_ref().ok_or(ApiError::DatabaseUnavailable)
    }
}

/// Build the full application router.
pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let index = static_dir.join("publications.html");

    let api = Router::new()
        .route("/publications", get(list_publications))
        .route("/test-db", get(test_db))
        .route("/years", get(years))
        .route("/search", get(search))
        .route("/admin/sync-scholar", post(sync_scholar))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(api_not_found);

    let assets = ServeDir::new(static_dir)
        .call_fallback_on_method_not_allowed(true)
        .not_found_service(api_not_found.into_service());

    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
        .route_service("/", ServeFile::new(index))
        .fallback_service(assets)
        .with_state(state);

    if let Some(m) = metrics {
        app = app.merge(m.router());
    }

    app.layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
}

// ---------- errors ----------

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    Conflict(String),
    DatabaseUnavailable,
    Internal { error: String, message: String },
}

impl ApiError {
    fn store(e: StoreError, message: &str) -> Self {
        tracing::error!(target: "api", error = %e, "{message}");
        ApiError::Internal {
            error: e.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::AlreadyRunning => ApiError::Conflict("Sync already in progress".into()),
            SyncError::FetchFailed { attempts } => ApiError::Internal {
                error: "Failed to fetch Scholar data".into(),
                message: format!("gave up after {attempts} attempts"),
            },
            SyncError::Storage(source) => ApiError::Internal {
                error: "Failed to sync data".into(),
                message: source.to_string(),
            },
            SyncError::ProfileUpdate { replaced, source } => ApiError::Internal {
                error: "Failed to update profile".into(),
                message: format!("{replaced} publications were saved; {source}"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Missing or invalid admin secret" }),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "Endpoint not found" })),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "Method not allowed" }),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::DatabaseUnavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Database not available",
                    "message": "Database connection failed during server startup. Check server logs.",
                    "suggestion": "Check DATABASE_URL and restart the server",
                }),
            ),
            ApiError::Internal { error, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": error, "message": message }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(target: "api", panic = detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

async fn api_not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

// ---------- query parsing ----------

fn page_param(q: &HashMap<String, String>, key: &str, default: u32) -> Result<u32, ApiError> {
    match q.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Err(ApiError::BadRequest(format!(
                "'{key}' must be a positive integer, got '{raw}'"
            ))),
        },
    }
}

fn paging(q: &HashMap<String, String>, default_per_page: u32) -> Result<(u32, u32), ApiError> {
    let page = page_param(q, "page", 1)?;
    let per_page = page_param(q, "per_page", default_per_page)?.min(MAX_PER_PAGE);
    Ok((page, per_page))
}

// ---------- handlers ----------

async fn list_publications(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store()?;
    let started = Instant::now();

    let (page, per_page) = paging(&q, LIST_PER_PAGE)?;
    let filter: YearFilter = q
        .get("year")
        .map(String::as_str)
        .unwrap_or("all")
        .parse()
        .map_err(ApiError::BadRequest)?;
    tracing::info!(target: "api", page, per_page, year = ?filter, "list publications");

    let result = store
        .list_publications(page, per_page, filter)
        .await
        .map_err(|e| ApiError::store(e, "Failed to fetch publications from database"))?;
    let profile = store
        .get_profile()
        .await
        .map_err(|e| ApiError::store(e, "Failed to fetch profile from database"))?
        .unwrap_or_else(|| {
            Profile::placeholder(&state.config.owner_name, &state.config.scholar_profile_url())
        });

    let last_updated = profile
        .last_updated
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339();
    let response_time = started.elapsed().as_millis() as u64;
    let first_page_profile = (page == 1).then_some(&profile);
    tracing::debug!(target: "api", response_time_ms = response_time, "publications served");

    Ok(Json(json!({
        "profile": first_page_profile,
        "publications": result.publications,
        "pagination": result.pagination,
        "response_time": response_time,
        "source": SOURCE_LABEL,
        "last_updated": last_updated,
    })))
}

async fn test_db(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = state.store()?;
    match store.smoke_check().await {
        Ok(h) => Ok(Json(json!({
            "status": "success",
            "message": "Database connection working",
            "connection_type": SOURCE_LABEL,
            "total_publications": h.total_publications,
            "database_version": h.database_version,
        }))),
        Err(e) => Err(ApiError::Internal {
            error: "Database test failed".into(),
            message: e.to_string(),
        }),
    }
}

async fn years(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let counts = state
        .store()?
        .year_counts()
        .await
        .map_err(|e| ApiError::store(e, "Failed to count publications per year"))?;
    let mut out = Map::new();
    for (label, n) in counts {
        out.insert(label.to_string(), Value::from(n));
    }
    Ok(Json(Value::Object(out)))
}

async fn search(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store()?;
    let query = q.get("q").map(|s| s.trim()).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Search query required".into()));
    }
    let (page, per_page) = paging(&q, SEARCH_PER_PAGE)?;
    tracing::info!(target: "api", query, page, per_page, "search");

    let result = store
        .search(query, page, per_page)
        .await
        .map_err(|e| ApiError::store(e, "Search failed"))?;
    Ok(Json(json!(result)))
}

async fn sync_scholar(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    if state.config.sync_require_secret {
        let given = headers
            .get(ADMIN_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if given != state.config.secret_key {
            tracing::warn!(target: "api", "sync request rejected: bad admin secret");
            return Err(ApiError::Unauthorized);
        }
    }
    let sync = state.sync.as_ref().ok_or(ApiError::DatabaseUnavailable)?;

    tracing::info!(target: "api", scholar_id = sync.scholar_id(), "manual sync requested");
    let report = sync.sync_now().await?;
    Ok(Json(json!({
        "message": "Data synced successfully",
        "total_publications": report.total_publications,
    })))
}
