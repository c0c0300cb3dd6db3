use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::{HeaderMap, Method},
    response::Response,
};

use crate::{error::AppError, state::AppState, utils::forward};

const BATCH_ENTITIES: [&str; 3] = ["guests", "events", "checkin"];

/// `POST /api/batch/{entity}`: multi-page batch fetch. The entity is
/// validated here so a typo fails fast instead of round-tripping.
pub async fn batch_handler(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    if !BATCH_ENTITIES.contains(&entity.as_str()) {
        return Err(AppError::UnknownEntity(entity));
    }

    let body = Bytes::from(body.to_string());
    forward(
        &state,
        Method::POST,
        &format!("/api/batch/{entity}"),
        &headers,
        Some(body),
    )
    .await
}

/// Pass-through for every other `/api/*` route: auth, CRUD, bulk
/// operations, backend cache administration. The path, query string,
/// method, and body all travel upstream untouched.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(uri.path());

    let body = if body.is_empty() { None } else { Some(body) };
    forward(&state, method, path_and_query, &headers, body).await
}
