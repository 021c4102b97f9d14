use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{error, info};

use crate::{
    context::Context,
    identity::resolve_identity,
    limiter::{LimitResult, RateLimiter},
    metrics::Metrics,
};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

const TOO_MANY_REQUESTS_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Shared state for the rate limit middleware
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub token_header: HeaderName,
    pub request_timeout: Duration,
}

/// Axum middleware: limit by token when the request carries one, by client
/// IP otherwise.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (identity, limit_type) =
        resolve_identity(req.headers(), remote_addr, state.token_header.as_str());

    state.metrics.record_total_request(limit_type);
    let timer = state.metrics.start_request_timer();
    let ctx = Context::with_timeout(state.request_timeout);
    let result = state.limiter.check(&ctx, &identity, limit_type).await;
    drop(timer);

    match result {
        Ok(result) if result.allowed => {
            state.metrics.record_allowed_request(limit_type);
            let mut response = next.run(req).await;
            apply_rate_limit_headers(response.headers_mut(), &result);
            response
        }
        Ok(result) => {
            state.metrics.record_denied_request(limit_type);
            info!(%limit_type, "request rate limited");
            too_many_requests(&result)
        }
        Err(e) => {
            state.metrics.record_error(e.kind());
            error!(%limit_type, error = %e, "rate limit check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// Attach `X-RateLimit-*` headers describing `result`
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, result: &LimitResult) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(result.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(result.remaining));
    if let Ok(reset) = HeaderValue::from_str(&result.reset_time.to_rfc3339()) {
        headers.insert(RESET_HEADER, reset);
    }
}

fn too_many_requests(result: &LimitResult) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": TOO_MANY_REQUESTS_MESSAGE })),
    )
        .into_response();
    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, result);
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(result.retry_after_secs()),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_apply_rate_limit_headers() {
        let result = LimitResult {
            allowed: true,
            limit: 10,
            remaining: 7,
            reset_time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        };
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&mut headers, &result);

        assert_eq!(headers[LIMIT_HEADER], "10");
        assert_eq!(headers[REMAINING_HEADER], "7");
        assert_eq!(headers[RESET_HEADER], "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_too_many_requests_response() {
        let result = LimitResult {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_time: Utc::now() + chrono::Duration::seconds(60),
        };
        let response = too_many_requests(&result);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[LIMIT_HEADER], "5");
        assert_eq!(response.headers()[REMAINING_HEADER], "0");
        let retry: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((59..=60).contains(&retry));
    }
}
