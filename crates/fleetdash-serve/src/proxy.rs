use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/proxy?endpoint=<path>&... forwards the remaining parameters to
/// the upstream path and mirrors its status.
pub(crate) async fn get_proxy(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let (endpoint, forwarded) = split_endpoint(params);
    let endpoint = endpoint.ok_or_else(|| ApiError::bad_request("No endpoint specified"))?;

    match state.api.fetch(&endpoint, &forwarded).await {
        Ok(resp) => Ok(Json(json!({
            "status": resp.status,
            "duration": resp.duration_ms,
            "data": resp.body,
        }))
        .into_response()),
        Err(err) => {
            tracing::warn!(
                endpoint = %endpoint,
                status = err.status(),
                duration_ms = err.duration_ms(),
                error = %err,
                "proxied request failed"
            );
            let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_GATEWAY);
            let body = json!({
                "status": err.status(),
                "duration": err.duration_ms(),
                "error": err.body(),
            });
            Ok((status, Json(body)).into_response())
        }
    }
}

/// Pull `endpoint` out of the query; every other pair is forwarded in order.
fn split_endpoint(params: Vec<(String, String)>) -> (Option<String>, Vec<(String, String)>) {
    let mut endpoint = None;
    let mut forwarded = Vec::with_capacity(params.len());
    for (key, value) in params {
        if key == "endpoint" {
            endpoint.get_or_insert(value);
        } else {
            forwarded.push((key, value));
        }
    }
    (endpoint.filter(|e| !e.is_empty()), forwarded)
}
