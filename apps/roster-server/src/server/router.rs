use anyhow::anyhow;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, StatusCode},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{
    core::{AppConfig, AppState},
    realtime::gateway_ws,
    types::{health, metrics},
};

/// Build the axum router with global middleware.
///
/// # Errors
/// Returns an error if configured gateway limits are invalid or the token
/// key / directory seed cannot be loaded.
pub fn build_router(config: &AppConfig) -> anyhow::Result<Router> {
    if config.max_gateway_event_bytes > roster_protocol::MAX_EVENT_BYTES {
        return Err(anyhow!(
            "gateway event limit cannot exceed protocol max of {} bytes",
            roster_protocol::MAX_EVENT_BYTES
        ));
    }
    if config.max_gateway_event_bytes == 0 {
        return Err(anyhow!("gateway event limit must be at least 1 byte"));
    }
    if config.gateway_outbound_queue == 0 {
        return Err(anyhow!(
            "gateway outbound queue must hold at least 1 event"
        ));
    }

    let app_state = AppState::new(config)?;
    let request_id_header = HeaderName::from_static("x-request-id");

    Ok(Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/gateway/ws", get(gateway_ws))
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
                .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                )),
        ))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::build_router;
    use crate::server::core::AppConfig;

    #[tokio::test]
    async fn health_endpoint_responds_ok() {
        let app = build_router(&AppConfig::default()).expect("router should build");
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should execute");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_prometheus_text() {
        let app = build_router(&AppConfig::default()).expect("router should build");
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should execute");
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let text = String::from_utf8(body.to_vec()).expect("body should be utf8");
        assert!(text.contains("roster_session_evictions_total"));
    }

    #[tokio::test]
    async fn gateway_upgrade_without_credential_is_refused() {
        let app = build_router(&AppConfig::default()).expect("router should build");
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/gateway/ws")
                    .header("connection", "upgrade")
                    .header("upgrade", "websocket")
                    .header("sec-websocket-version", "13")
                    .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should execute");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn router_rejects_zero_sized_gateway_limits() {
        assert!(build_router(&AppConfig {
            gateway_outbound_queue: 0,
            ..AppConfig::default()
        })
        .is_err());
        assert!(build_router(&AppConfig {
            max_gateway_event_bytes: 0,
            ..AppConfig::default()
        })
        .is_err());
    }

    #[test]
    fn router_rejects_event_limit_above_protocol_max() {
        assert!(build_router(&AppConfig {
            max_gateway_event_bytes: roster_protocol::MAX_EVENT_BYTES + 1,
            ..AppConfig::default()
        })
        .is_err());
    }
}
