//! `GET /api/image-proxy?url=...`: fetch an allow-listed image and stream it back

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::allow_list;

const CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { http })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    pub url: Option<String>,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

pub async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

pub async fn image_proxy(
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
) -> Response {
    let Some(raw) = params.url.filter(|url| !url.is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "Missing url parameter").into_response();
    };
    let target = match Url::parse(&raw) {
        Ok(url) if allow_list::is_proxyable(&url) => url,
        _ => return api_error(StatusCode::BAD_REQUEST, "Invalid url").into_response(),
    };
    if !allow_list::is_allowed(&target) {
        warn!("blocked image proxy request for {target}");
        return api_error(StatusCode::FORBIDDEN, "Domain not allowed").into_response();
    }

    debug!("proxying {target}");
    let resp = match state.http.get(target.clone()).send().await {
        Ok(resp) => resp,
        Err(err) => {
            error!("image fetch failed: {target} -> {err}");
            return api_error(StatusCode::BAD_GATEWAY, "Failed to fetch image").into_response();
        }
    };
    if !resp.status().is_success() {
        warn!("upstream answered {} for {target}", resp.status());
        return api_error(StatusCode::BAD_GATEWAY, "Failed to fetch image").into_response();
    }

    let content_type = resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL),
    );

    (StatusCode::OK, headers, Body::from_stream(resp.bytes_stream())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .unwrap(),
        }
    }

    async fn call(url: Option<&str>) -> Response {
        image_proxy(
            State(state()),
            Query(ProxyParams {
                url: url.map(str::to_string),
            }),
        )
        .await
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_disallowed_domain_is_forbidden() {
        let resp = call(Some("https://evil-domain.com/x.jpg")).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(resp).await, json!({ "error": "Domain not allowed" }));
    }

    #[tokio::test]
    async fn test_allowed_domain_is_not_forbidden() {
        let resp = call(Some("https://localhost/test.jpg")).await;
        assert_ne!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let resp = call(None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await, json!({ "error": "Missing url parameter" }));
    }

    #[tokio::test]
    async fn test_unparseable_url_is_bad_request() {
        let resp = call(Some("not a url")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await, json!({ "error": "Invalid url" }));
    }
}
