use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

use super::request_id::RequestId;

/// Threshold for the slow request warning. `/separate` is exempt.
const SLOW_REQUEST_MS: u128 = 5_000;

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        target: "metrics",
        method = %method,
        uri = %uri,
        request_id = %request_id,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "request_completed"
    );

    if latency.as_millis() > SLOW_REQUEST_MS && !uri.path().starts_with("/separate") {
        warn!(target: "metrics", uri = %uri, latency_ms = %latency.as_millis(), "slow_request");
    }

    response
}
