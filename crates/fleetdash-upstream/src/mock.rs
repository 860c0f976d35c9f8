use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use crate::{UpstreamApi, UpstreamError, UpstreamResponse};

/// Scripted reply for a mocked route.
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok(Value),
    Status(u16, Value),
    Transport(String),
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

struct Route {
    path: String,
    when: Option<(String, String)>,
    reply: MockReply,
}

/// In-memory upstream for tests. Routes match on path and, optionally, one
/// query parameter; a route with a query condition wins over a bare one.
/// Unrouted paths answer 404.
#[derive(Default)]
pub struct MockUpstream {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    /// path -> (currently unresolved, peak unresolved)
    per_path: Mutex<HashMap<String, (usize, usize)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer every call to `path` with `reply`, replacing any earlier route.
    pub fn respond(&self, path: &str, reply: MockReply) {
        self.set_route(path, None, reply);
    }

    /// Answer calls to `path` whose `key` parameter equals `value`.
    pub fn respond_when(&self, path: &str, key: &str, value: &str, reply: MockReply) {
        self.set_route(path, Some((key.to_string(), value.to_string())), reply);
    }

    fn set_route(&self, path: &str, when: Option<(String, String)>, reply: MockReply) {
        let mut routes = lock(&self.routes);
        routes.retain(|r| !(r.path == path && r.when == when));
        routes.push(Route {
            path: path.to_string(),
            when,
            reply,
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.path == path)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Highest number of calls that were unresolved at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Like [`peak_in_flight`](Self::peak_in_flight), counting only calls to `path`.
    pub fn peak_in_flight_to(&self, path: &str) -> usize {
        lock(&self.per_path).get(path).map(|(_, peak)| *peak).unwrap_or(0)
    }

    fn enter(&self, path: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let mut per_path = lock(&self.per_path);
        let entry = per_path.entry(path.to_string()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = entry.1.max(entry.0);
    }

    fn leave(&self, path: &str) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(entry) = lock(&self.per_path).get_mut(path) {
            entry.0 = entry.0.saturating_sub(1);
        }
    }

    fn lookup(&self, path: &str, query: &[(String, String)]) -> Option<MockReply> {
        let routes = lock(&self.routes);
        let conditional = routes.iter().find(|r| {
            r.path == path
                && r.when
                    .as_ref()
                    .is_some_and(|(k, v)| query.iter().any(|(qk, qv)| qk == k && qv == v))
        });
        conditional
            .or_else(|| routes.iter().find(|r| r.path == path && r.when.is_none()))
            .map(|r| r.reply.clone())
    }
}

struct InFlight<'a> {
    mock: &'a MockUpstream,
    path: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.mock.leave(self.path);
    }
}

#[async_trait::async_trait]
impl UpstreamApi for MockUpstream {
    async fn fetch(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        lock(&self.calls).push(RecordedCall {
            path: path.to_string(),
            query: query.to_vec(),
        });

        self.enter(path);
        let _guard = InFlight { mock: self, path };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let duration_ms = self.delay.map(|d| d.as_millis() as u64).unwrap_or(0);
        match self.lookup(path, query) {
            Some(MockReply::Ok(body)) => Ok(UpstreamResponse {
                status: 200,
                duration_ms,
                body,
            }),
            Some(MockReply::Status(status, body)) => Err(UpstreamError::Status {
                status,
                body,
                duration_ms,
            }),
            Some(MockReply::Transport(message)) => Err(UpstreamError::Transport {
                message,
                duration_ms,
            }),
            None => Err(UpstreamError::Status {
                status: 404,
                body: serde_json::json!({ "message": format!("no mock route for {path}") }),
                duration_ms,
            }),
        }
    }
}
