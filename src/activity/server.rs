//! HTTP service that receives and lists activity records.
//!
//! ## Endpoints
//!
//! - `GET /api/`: service banner
//! - `POST /api/activity-log`: store a record, echo the stored form
//! - `GET /api/activity-log`: latest records, newest first

use super::ActivityRecord;
use super::store::{ActivityStore, StoredActivity};
use crate::config::ServerConfig;
use crate::error::{BellError, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Records returned by `GET /api/activity-log`.
pub const LIST_LIMIT: usize = 100;

#[derive(Clone)]
struct AppState {
    store: Arc<ActivityStore>,
}

/// Error body: `{"detail": "..."}` with a 500 status.
struct ApiError(BellError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("activity API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "detail": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Build the router over `store`.
pub fn router(store: Arc<ActivityStore>) -> Router {
    Router::new()
        .route("/api/", get(handle_root))
        .route("/api/activity-log", get(handle_list).post(handle_create))
        .with_state(AppState { store })
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Workbell Activity Log API" }))
}

async fn handle_create(
    State(state): State<AppState>,
    Json(record): Json<ActivityRecord>,
) -> std::result::Result<Json<StoredActivity>, ApiError> {
    let stored = state.store.insert(&record).map_err(ApiError)?;
    info!(event_type = %stored.event_type, event_time = %stored.event_time, "activity stored");
    Ok(Json(stored))
}

async fn handle_list(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<StoredActivity>>, ApiError> {
    state.store.recent(LIST_LIMIT).map(Json).map_err(ApiError)
}

/// Open the store named by `config.database`, or an in-memory one.
pub fn open_store(config: &ServerConfig) -> Result<ActivityStore> {
    match &config.database {
        Some(path) => ActivityStore::open(path),
        None => ActivityStore::open_in_memory(),
    }
}

/// A running activity-log server.
pub struct ActivityServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ActivityServer {
    /// Bind to `config.host:config.port` and serve in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`BellError::Io`] if the address cannot be bound.
    pub async fn start(store: Arc<ActivityStore>, config: &ServerConfig) -> Result<Self> {
        let app = router(store);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        let addr = listener.local_addr()?;
        info!("activity log server listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("activity log server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}
