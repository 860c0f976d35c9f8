use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use fleetdash_core::EnrichedVehicle;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

// ── GET /api/dashboard/timestamp ──

#[derive(Serialize)]
pub(crate) struct TimestampResponse {
    timestamp: Option<String>,
}

pub(crate) async fn get_timestamp(State(state): State<AppState>) -> Json<TimestampResponse> {
    Json(TimestampResponse {
        timestamp: state.refresher.store().timestamp(),
    })
}

// ── GET /api/dashboard ──

#[derive(Deserialize)]
pub(crate) struct DashboardQuery {
    refresh: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct DashboardResponse {
    data: Vec<EnrichedVehicle>,
    timestamp: String,
}

/// Serve the composed snapshot. `refresh=true` first runs (or joins) a
/// forced cycle; its failure is not reported, the handler falls through to
/// whatever is published.
pub(crate) async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardQuery>,
) -> ApiResult<Json<DashboardResponse>> {
    if params.refresh.as_deref() == Some("true") {
        let outcome = state.refresher.refresh(true).await;
        tracing::debug!(?outcome, "client-triggered refresh finished");
    }

    let item_cap = state.refresher.config().item_cap;
    let view = state
        .refresher
        .store()
        .view(item_cap)
        .ok_or_else(|| ApiError::unavailable("Dashboard data not loaded yet"))?;

    Ok(Json(DashboardResponse {
        data: view.vehicles,
        timestamp: view.timestamp,
    }))
}
