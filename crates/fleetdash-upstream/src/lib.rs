//! Typed access to the upstream telematics API.
//!
//! Every call goes through [`UpstreamApi::fetch`], which returns either the
//! parsed response body with its status and latency, or an [`UpstreamError`]
//! carrying whatever the upstream sent back. Nothing here retries.

pub mod http;
pub mod mock;
pub mod paging;

use serde_json::Value;

pub use http::{HttpUpstream, UpstreamConfig};
pub use mock::{MockReply, MockUpstream};
pub use paging::{fetch_all, DEFAULT_MAX_PAGES};

/// Upstream resource paths used by the refresh pipeline.
pub mod endpoints {
    pub const VEHICLES: &str = "/fleet/vehicles";
    pub const VEHICLE_STATS: &str = "/fleet/vehicles/stats";
    pub const VEHICLE_LOCATIONS: &str = "/fleet/vehicles/locations";
    pub const HOS_CLOCKS: &str = "/fleet/hos/clocks";
    pub const DVIR_HISTORY: &str = "/fleet/dvirs/history";
    pub const TRIPS: &str = "/v1/fleet/trips";
}

/// Query string pairs, forwarded in order.
pub type QueryParams = Vec<(String, String)>;

/// A 2xx upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub duration_ms: u64,
    pub body: Value,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// No response arrived (connect, TLS, timeout, body read).
    #[error("upstream request failed: {message}")]
    Transport { message: String, duration_ms: u64 },
    /// The upstream answered with a non-2xx status.
    #[error("upstream responded with status {status}")]
    Status {
        status: u16,
        body: Value,
        duration_ms: u64,
    },
}

impl UpstreamError {
    /// Status to report to callers; 500 when nothing came back.
    pub fn status(&self) -> u16 {
        match self {
            UpstreamError::Transport { .. } => 500,
            UpstreamError::Status { status, .. } => *status,
        }
    }

    /// Upstream error body, or a generic `{ "message": ... }` for transport failures.
    pub fn body(&self) -> Value {
        match self {
            UpstreamError::Transport { message, .. } => serde_json::json!({ "message": message }),
            UpstreamError::Status { body, .. } => body.clone(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            UpstreamError::Transport { duration_ms, .. }
            | UpstreamError::Status { duration_ms, .. } => *duration_ms,
        }
    }
}

/// Authenticated GET access to the upstream API. Implemented by
/// [`HttpUpstream`] (real) and [`MockUpstream`] (tests).
#[async_trait::async_trait]
pub trait UpstreamApi: Send + Sync {
    async fn fetch(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Build a [`QueryParams`] list from borrowed pairs.
pub fn query<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> QueryParams {
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
