use axum::{
    body::Bytes,
    http::{
        HeaderMap, Method,
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::{error::AppError, state::AppState};

/// Forward one request to the upstream backend and mirror its answer.
///
/// Only `Authorization` and `Cookie` travel upstream: the former for
/// bearer-authenticated CRUD calls, the latter so the refresh endpoint
/// sees its HTTP-only refresh cookie. `Set-Cookie` values come back so
/// the upstream can rotate that cookie through us.
pub async fn forward(
    state: &AppState,
    method: Method,
    path_and_query: &str,
    headers: &HeaderMap,
    body: Option<Bytes>,
) -> Result<Response, AppError> {
    let url = format!("{}{}", state.config.backend_url, path_and_query);
    debug!(%method, %url, "forwarding to backend");

    let mut request = state.http.request(method, &url);
    for name in [AUTHORIZATION, COOKIE, CONTENT_TYPE] {
        if let Some(value) = headers.get(&name) {
            request = request.header(name, value);
        }
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    let upstream = request.send().await?;

    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let cookies: Vec<_> = upstream
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .cloned()
        .collect();
    let bytes = upstream.bytes().await?;

    let mut response = (status, bytes).into_response();
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    for cookie in cookies {
        response.headers_mut().append(SET_COOKIE, cookie);
    }

    Ok(response)
}
