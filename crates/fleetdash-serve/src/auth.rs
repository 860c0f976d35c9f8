//! Session-cookie-or-Basic-auth gate in front of everything but the health probe.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

pub const SESSION_COOKIE: &str = "fleetdash_session";
const REALM: &str = "Basic realm=\"fleetdash\"";

/// Configured credentials plus the session token derived from them.
pub struct AuthGate {
    username: String,
    password: String,
    token: String,
}

impl AuthGate {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let password = password.into();
        let token = session_token(&username, &password);
        Self {
            username,
            password,
            token,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn has_session(&self, jar: &CookieJar) -> bool {
        jar.get(SESSION_COOKIE)
            .is_some_and(|cookie| cookie.value() == self.token)
    }

    fn has_basic(&self, headers: &HeaderMap) -> bool {
        basic_credentials(headers)
            .is_some_and(|(user, pass)| user == self.username && pass == self.password)
    }

    fn session_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, self.token.clone()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::days(7))
            .build()
    }
}

/// Lowercase hex SHA-256 over the configured credentials.
pub fn session_token(username: &str, password: &str) -> String {
    let digest = Sha256::digest(format!("fleetdash-session:{username}:{password}").as_bytes());
    hex::encode(digest)
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Middleware: pass with a valid session cookie; pass with valid Basic
/// credentials and issue the cookie; otherwise 401 with a Basic challenge.
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if gate.has_session(&jar) {
        return next.run(request).await;
    }

    if gate.has_basic(request.headers()) {
        let response = next.run(request).await;
        return (jar.add(gate.session_cookie()), response).into_response();
    }

    tracing::debug!(uri = %request.uri(), "rejecting unauthenticated request");
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "authentication required" })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn gated() -> Router {
        let gate = Arc::new(AuthGate::new("admin", "secret"));
        Router::new()
            .route("/private", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(gate, require_auth))
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{pass}")))
    }

    #[test]
    fn token_is_derived_from_credentials() {
        let gate = AuthGate::new("admin", "secret");
        assert_eq!(gate.token(), session_token("admin", "secret"));
        assert_ne!(gate.token(), session_token("admin", "other"));
        assert_eq!(
            gate.token(),
            "a933eb5f56bf5d8a71a952c1b801f1e068413646854d0aca325bad5b41292f4c"
        );
    }

    #[tokio::test]
    async fn missing_credentials_get_challenge() {
        let resp = gated()
            .oneshot(HttpRequest::builder().uri("/private").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[WWW_AUTHENTICATE], REALM);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "authentication required");
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let resp = gated()
            .oneshot(
                HttpRequest::builder()
                    .uri("/private")
                    .header(AUTHORIZATION, basic("admin", "nope"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn basic_login_issues_session_cookie() {
        let resp = gated()
            .oneshot(
                HttpRequest::builder()
                    .uri("/private")
                    .header(AUTHORIZATION, basic("admin", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!(
            "{SESSION_COOKIE}={}",
            session_token("admin", "secret")
        )));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=604800"));
    }

    #[tokio::test]
    async fn session_cookie_is_enough() {
        let token = session_token("admin", "secret");
        let resp = gated()
            .oneshot(
                HttpRequest::builder()
                    .uri("/private")
                    .header(COOKIE, format!("{SESSION_COOKIE}={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn forged_cookie_is_rejected() {
        let resp = gated()
            .oneshot(
                HttpRequest::builder()
                    .uri("/private")
                    .header(COOKIE, format!("{SESSION_COOKIE}=deadbeef"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn basic_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&basic("a", "b:c")).unwrap());
        assert_eq!(
            basic_credentials(&headers),
            Some(("a".to_string(), "b:c".to_string()))
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(basic_credentials(&headers), None);
    }
}
