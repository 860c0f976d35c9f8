use serde_json::Value;

use crate::{UpstreamApi, UpstreamError};

/// Upper bound on pages followed for one bulk listing.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Fetch a cursor-paginated listing and concatenate its `data` arrays.
///
/// Follows `pagination.endCursor` (sent back as `after`) while
/// `pagination.hasNextPage` is true, up to `max_pages` pages. Any page failing
/// fails the whole listing.
pub async fn fetch_all<A: UpstreamApi + ?Sized>(
    api: &A,
    path: &str,
    query: &[(String, String)],
    max_pages: usize,
) -> Result<Vec<Value>, UpstreamError> {
    let max_pages = max_pages.max(1);
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 1..=max_pages {
        let mut params = query.to_vec();
        if let Some(after) = cursor.take() {
            params.push(("after".to_string(), after));
        }

        let response = api.fetch(path, &params).await?;
        let (data, next) = split_page(response.body);
        items.extend(data);

        match next {
            Some(after) if page < max_pages => cursor = Some(after),
            Some(_) => {
                tracing::warn!(path, max_pages, "page limit reached, listing truncated");
                break;
            }
            None => break,
        }
    }

    Ok(items)
}

/// Split a page body into its records and the cursor of the next page.
fn split_page(body: Value) -> (Vec<Value>, Option<String>) {
    let next = next_cursor(&body);
    let data = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    (data, next)
}

fn next_cursor(body: &Value) -> Option<String> {
    let pagination = body.get("pagination")?;
    if !pagination.get("hasNextPage")?.as_bool()? {
        return None;
    }
    pagination
        .get("endCursor")?
        .as_str()
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockReply, MockUpstream};
    use serde_json::json;

    #[tokio::test]
    async fn follows_cursor_until_last_page() {
        let mock = MockUpstream::new();
        mock.respond(
            "/fleet/vehicles",
            MockReply::Ok(json!({
                "data": [{ "id": "1" }, { "id": "2" }],
                "pagination": { "endCursor": "c1", "hasNextPage": true }
            })),
        );
        mock.respond_when(
            "/fleet/vehicles",
            "after",
            "c1",
            MockReply::Ok(json!({
                "data": [{ "id": "3" }],
                "pagination": { "endCursor": "", "hasNextPage": false }
            })),
        );

        let items = fetch_all(&mock, "/fleet/vehicles", &[], DEFAULT_MAX_PAGES)
            .await
            .unwrap();
        assert_eq!(items.len(), 3);

        let calls = mock.calls_to("/fleet/vehicles");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].param("after"), None);
        assert_eq!(calls[1].param("after"), Some("c1"));
    }

    #[tokio::test]
    async fn stops_at_page_limit() {
        let mock = MockUpstream::new();
        mock.respond(
            "/loop",
            MockReply::Ok(json!({
                "data": [{ "id": "x" }],
                "pagination": { "endCursor": "again", "hasNextPage": true }
            })),
        );
        let items = fetch_all(&mock, "/loop", &[], 3).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn keeps_caller_query_on_every_page() {
        let mock = MockUpstream::new();
        mock.respond("/stats", MockReply::Ok(json!({ "data": [] })));
        let q = crate::query([("types", "engineStates")]);
        fetch_all(&mock, "/stats", &q, 5).await.unwrap();
        assert_eq!(mock.calls()[0].param("types"), Some("engineStates"));
    }

    #[tokio::test]
    async fn failing_page_fails_listing() {
        let mock = MockUpstream::new();
        mock.respond("/x", MockReply::Status(401, json!({ "message": "bad token" })));
        let err = fetch_all(&mock, "/x", &[], 5).await.unwrap_err();
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn bare_array_bodies_are_accepted() {
        let (data, next) = split_page(json!([1, 2]));
        assert_eq!(data.len(), 2);
        assert!(next.is_none());
    }
}
