use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::routing::{delete, get};
use serde::Serialize;

use platform_link::{Activity, CallbackQuery, ConnectionSummary};

use super::error::ApiError;
use super::{AppState, AuthUser};

const ACTIVITY_FEED_LIMIT: i64 = 20;

pub(super) fn router(state: AppState) -> Router {
    Router::new()
        .route("/initiate/{platform}", get(initiate))
        .route("/callback", get(callback))
        .route("/connections", get(list_connections))
        .route("/connections/{id}", delete(delete_connection))
        .route("/activities", get(list_activities))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateResponse {
    auth_url: String,
}

async fn initiate(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    user: AuthUser,
) -> Result<Json<InitiateResponse>, ApiError> {
    let auth_url = state.manager.begin_authorization(&user.user_id, &platform)?;
    Ok(Json(InitiateResponse { auth_url }))
}

/// Provider redirect target. Unauthenticated by design: the browser arrives
/// here from the provider, and the signed `state` parameter identifies the
/// user who initiated the flow.
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let outcome = state.manager.handle_callback(query).await?;
    tracing::debug!(platform = %outcome.platform, "callback completed, redirecting to dashboard");
    Ok(Redirect::to(&format!(
        "{}/?connected={}",
        state.public_base_url.trim_end_matches('/'),
        urlencoding::encode(outcome.platform.as_str())
    )))
}

async fn list_connections(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ConnectionSummary>>, ApiError> {
    let connections = state.manager.list_connections(&user.user_id).await?;
    Ok(Json(connections))
}

async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.manager.disconnect(&user.user_id, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn list_activities(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let activities = state
        .manager
        .recent_activities(&user.user_id, ACTIVITY_FEED_LIMIT)
        .await?;
    Ok(Json(activities))
}
