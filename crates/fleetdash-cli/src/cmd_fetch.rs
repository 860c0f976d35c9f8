use fleetdash_upstream::{HttpUpstream, UpstreamApi, UpstreamError, UpstreamResponse};
use serde_json::{json, Value};

use crate::UpstreamArgs;

/// One authenticated GET, printed as `{status, duration, data|error}`.
pub fn execute(upstream: &UpstreamArgs, endpoint: &str, params: &[(String, String)]) -> anyhow::Result<()> {
    let api = HttpUpstream::new(upstream.config())?;
    let result = tokio::runtime::Runtime::new()?.block_on(api.fetch(endpoint, params));

    println!("{}", serde_json::to_string_pretty(&envelope(&result))?);
    result?;
    Ok(())
}

fn envelope(result: &Result<UpstreamResponse, UpstreamError>) -> Value {
    match result {
        Ok(resp) => json!({
            "status": resp.status,
            "duration": resp.duration_ms,
            "data": resp.body,
        }),
        Err(err) => json!({
            "status": err.status(),
            "duration": err.duration_ms(),
            "error": err.body(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_carries_data() {
        let out = envelope(&Ok(UpstreamResponse {
            status: 200,
            duration_ms: 41,
            body: json!({ "data": [] }),
        }));
        assert_eq!(out, json!({ "status": 200, "duration": 41, "data": { "data": [] } }));
    }

    #[test]
    fn failure_envelope_carries_error() {
        let out = envelope(&Err(UpstreamError::Transport {
            message: "dns error".into(),
            duration_ms: 7,
        }));
        assert_eq!(out["status"], 500);
        assert_eq!(out["error"]["message"], "dns error");
        assert!(out.get("data").is_none());
    }
}
