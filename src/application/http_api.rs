use crate::application::connection_service::ConnectionService;
use crate::application::sync_state_service::SyncStateService;
use crate::domain::api::{
    ConnectionActionRequest, ConnectionActionResponse, ErrorBody, SyncStateEnvelope,
};
use crate::domain::models::{
    ConnectionAction, ConnectionSnapshot, IdeKind, SyncState, SyncStatePatch,
};
use crate::infrastructure::error::InfraError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncStateService>,
    pub connection: Arc<ConnectionService>,
}

impl AppState {
    pub fn new(sync: SyncStateService, connection: ConnectionService) -> Self {
        Self {
            sync: Arc::new(sync),
            connection: Arc::new(connection),
        }
    }
}

#[derive(Debug)]
pub struct ApiError(InfraError);

impl From<InfraError> for ApiError {
    fn from(error: InfraError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            warn!(event = "request_rejected", error = %self.0);
            StatusCode::BAD_REQUEST
        } else {
            error!(event = "request_failed", error = %self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(ErrorBody::new(self.0.to_string()))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/sync-state",
            get(get_sync_state)
                .post(post_sync_state)
                .delete(delete_sync_state),
        )
        .route(
            "/ide-connection",
            get(get_ide_connection)
                .post(post_ide_connection)
                .delete(delete_ide_connection),
        )
        .layer(cors)
        .with_state(state)
}

fn parse_body<T>(body: &Bytes, what: &str) -> Result<T, InfraError>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(body)
        .map_err(|error| InfraError::InvalidRequest(format!("invalid {what} body: {error}")))
}

async fn get_sync_state(State(state): State<AppState>) -> Json<SyncState> {
    Json(state.sync.get().await)
}

async fn post_sync_state(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SyncStateEnvelope>, ApiError> {
    let patch: SyncStatePatch = parse_body(&body, "sync state")?;
    let merged = state.sync.merge(&patch).await?;
    Ok(Json(SyncStateEnvelope::ok(merged)))
}

async fn delete_sync_state(
    State(state): State<AppState>,
) -> Result<Json<SyncStateEnvelope>, ApiError> {
    let reset = state.sync.reset().await?;
    Ok(Json(SyncStateEnvelope::ok(reset)))
}

async fn get_ide_connection(State(state): State<AppState>) -> Json<ConnectionSnapshot> {
    Json(state.connection.snapshot().await)
}

async fn post_ide_connection(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ConnectionActionResponse>, ApiError> {
    let request: ConnectionActionRequest = parse_body(&body, "ide connection")?;
    let action = request
        .action
        .parse::<ConnectionAction>()
        .map_err(InfraError::InvalidRequest)?;
    let ide = request.ide.as_deref().map(IdeKind::parse_lenient);
    let outcome = state.connection.apply(action, ide).await?;
    Ok(Json(outcome.into()))
}

async fn delete_ide_connection(
    State(state): State<AppState>,
) -> Result<Json<ConnectionActionResponse>, ApiError> {
    let snapshot = state.connection.reset().await?;
    Ok(Json(ConnectionActionResponse {
        success: true,
        state: Some(snapshot.state),
        history: Some(snapshot.history),
        ..ConnectionActionResponse::default()
    }))
}
