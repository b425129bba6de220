//! HTTP surface: axum handlers over the sync service, costs aggregator,
//! and the link/override stores.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::ResolvedConfig;
use crate::costs::{CostDocument, CostsAggregator, PeriodType};
use crate::feed::{HttpTransactionFeed, TransactionFeed};
use crate::models::CategoryBucket;
use crate::storage::stores::{LinkStore, OverrideStore, SyncStateStore};
use crate::storage::{BlobStore, JsonFileBlobStore};
use crate::sync::{AssignReport, Assignment, SyncReport, SyncService};

/// Error responses carry the raw message in an `error` field. This is an
/// internal tool-grade API; the message text is not a stable contract.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "Request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Shared state behind every handler.
pub struct AppState {
    pub sync: SyncService,
    pub costs: CostsAggregator,
    pub links: LinkStore,
    pub overrides: OverrideStore,
}

impl AppState {
    /// Wire the full pipeline over one blob store and one feed client.
    pub fn new(blobs: Arc<dyn BlobStore>, feed: Arc<dyn TransactionFeed>) -> Self {
        let links = LinkStore::new(blobs.clone());
        let sync_state = SyncStateStore::new(blobs.clone());
        let overrides = OverrideStore::new(blobs.clone());
        let costs = CostsAggregator::new(blobs);

        let sync = SyncService::new(
            feed,
            links.clone(),
            sync_state,
            overrides.clone(),
            costs.clone(),
        );

        Self {
            sync,
            costs,
            links,
            overrides,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    username: String,
    #[serde(default)]
    account_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AssignRequest {
    username: String,
    assignments: Vec<Assignment>,
}

#[derive(Debug, Deserialize)]
struct OverrideRequest {
    username: String,
    merchant: String,
    category: CategoryBucket,
}

#[derive(Debug, Deserialize)]
struct LinkTokenRequest {
    username: String,
    item_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct LinkAccountsRequest {
    username: String,
    item_id: String,
    account_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Empty {}

async fn sync_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>, ApiError> {
    let report = state
        .sync
        .sync(&request.username, request.account_ids.as_deref())
        .await?;
    Ok(Json(report))
}

async fn assign_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<AssignReport>, ApiError> {
    let report = state
        .sync
        .assign(&request.username, &request.assignments)
        .await?;
    Ok(Json(report))
}

async fn get_costs_handler(
    State(state): State<Arc<AppState>>,
    Path((username, period)): Path<(String, String)>,
) -> Result<Json<CostDocument>, ApiError> {
    let period: PeriodType = period
        .parse()
        .map_err(|err: crate::costs::ParsePeriodError| ApiError::bad_request(err.to_string()))?;
    let document = state.costs.get_costs(&username, period).await?;
    Ok(Json(document))
}

async fn override_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<Empty>, ApiError> {
    state
        .overrides
        .save_override(&request.username, &request.merchant, request.category)
        .await?;
    Ok(Json(Empty {}))
}

async fn link_token_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LinkTokenRequest>,
) -> Result<Json<Empty>, ApiError> {
    state
        .links
        .save_access_token(&request.username, &request.item_id, &request.access_token)
        .await?;
    Ok(Json(Empty {}))
}

async fn link_accounts_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LinkAccountsRequest>,
) -> Result<Json<Empty>, ApiError> {
    state
        .links
        .save_selected_accounts(&request.username, &request.item_id, &request.account_ids)
        .await?;
    Ok(Json(Empty {}))
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sync", post(sync_handler))
        .route("/costs/assign", post(assign_handler))
        .route("/costs/{username}/{period}", get(get_costs_handler))
        .route("/category/override", post(override_handler))
        .route("/link/token", post(link_token_handler))
        .route("/link/accounts", post(link_accounts_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until ctrl-c.
pub async fn serve(config: &ResolvedConfig) -> Result<()> {
    let client_id = config
        .feed_client_id
        .clone()
        .context("Missing feed client id (set SPENDBOOK_FEED_CLIENT_ID or feed.client_id)")?;
    let secret = config
        .feed_secret
        .clone()
        .context("Missing feed secret (set SPENDBOOK_FEED_SECRET or feed.secret)")?;

    let feed = HttpTransactionFeed::new(
        config.feed_base_url.clone(),
        client_id,
        secret,
        config.feed_request_timeout,
    )
    .context("Failed to build feed client")?;

    let blobs: Arc<dyn BlobStore> = Arc::new(JsonFileBlobStore::new(&config.data_dir));
    let state = Arc::new(AppState::new(blobs, Arc::new(feed)));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, data_dir = %config.data_dir.display(), "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    Ok(())
}
