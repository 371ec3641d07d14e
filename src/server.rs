//! HTTP feed server.
//!
//! Serves the live feed of one room session to browser overlays.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/feed` | Current feed as render-ready chat props |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/feed` accepts an optional `limit` query parameter returning only the
//! newest `limit` records.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "limit must be > 0" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so overlays hosted
//! anywhere can poll the feed.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chat_overlay_core::props::ChatProps;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::controller::FeedSnapshot;

/// Shared state passed to route handlers.
#[derive(Clone)]
pub struct AppState {
    room_id: Arc<str>,
    feed: watch::Receiver<FeedSnapshot>,
}

impl AppState {
    pub fn new(room_id: &str, feed: watch::Receiver<FeedSnapshot>) -> Self {
        Self {
            room_id: Arc::from(room_id),
            feed,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/feed", get(handle_feed))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `bind_addr` and serve until `shutdown` resolves.
pub async fn run_server<F>(bind_addr: &str, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "feed server listening");
    println!("Feed server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /feed ============

#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedResponse {
    room_id: String,
    records: Vec<ChatProps>,
}

async fn handle_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, AppError> {
    let snapshot = state.feed.borrow().clone();

    let skip = match query.limit {
        Some(0) => return Err(bad_request("limit must be > 0")),
        Some(limit) => snapshot.len().saturating_sub(limit),
        None => 0,
    };

    let records = snapshot.iter().skip(skip).map(ChatProps::from).collect();
    Ok(Json(FeedResponse {
        room_id: state.room_id.to_string(),
        records,
    }))
}
