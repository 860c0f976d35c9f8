use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::{UpstreamApi, UpstreamError, UpstreamResponse};

// ── Config ──

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Service credential, sent as a bearer token on every call.
    pub token: String,
    pub timeout: Duration,
}

// ── Client ──

/// reqwest-backed upstream client.
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpUpstream {
    pub fn new(config: UpstreamConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    /// Resolve an API path against the base URL. The path is always placed
    /// under the configured host, never treated as an absolute URL.
    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait::async_trait]
impl UpstreamApi for HttpUpstream {
    async fn fetch(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        let started = Instant::now();
        let elapsed_ms = |started: Instant| started.elapsed().as_millis() as u64;

        let response = self
            .client
            .get(self.url_for(path))
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|err| UpstreamError::Transport {
                message: err.to_string(),
                duration_ms: elapsed_ms(started),
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| UpstreamError::Transport {
                message: err.to_string(),
                duration_ms: elapsed_ms(started),
            })?;
        let body = parse_body(&bytes);
        let duration_ms = elapsed_ms(started);

        tracing::debug!(path, status = status.as_u16(), duration_ms, "upstream call");

        if status.is_success() {
            Ok(UpstreamResponse {
                status: status.as_u16(),
                duration_ms,
                body,
            })
        } else {
            Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
                duration_ms,
            })
        }
    }
}

/// JSON when it parses, the raw text otherwise, `null` for an empty body.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpUpstream {
        HttpUpstream::new(UpstreamConfig {
            base_url: base.to_string(),
            token: "token".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn url_joins_with_single_slash() {
        let c = client("https://api.example.com/");
        assert_eq!(c.url_for("/fleet/vehicles"), "https://api.example.com/fleet/vehicles");
        assert_eq!(c.url_for("fleet/vehicles"), "https://api.example.com/fleet/vehicles");
    }

    #[test]
    fn absolute_urls_stay_under_base_host() {
        let c = client("https://api.example.com");
        assert_eq!(
            c.url_for("http://elsewhere.test/x"),
            "https://api.example.com/http://elsewhere.test/x"
        );
    }

    #[test]
    fn body_parsing_falls_back_to_text() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#)["a"], 1);
        assert_eq!(parse_body(b"Bad Gateway"), Value::String("Bad Gateway".into()));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_failure() {
        let c = client("http://127.0.0.1:9");
        let err = c.fetch("/fleet/vehicles", &[]).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport { .. }));
        assert_eq!(err.status(), 500);
    }
}
