//! 应用状态、路由组装与请求追踪 ID 中间件。

use crate::routes::create_api_router;
use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
};
use ems_pipeline::Gateway;
use ems_telemetry::new_request_ids;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// 组装完整应用：`/health` 与 `/api/*`，附带追踪中间件。
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(crate::handlers::health))
        .nest("/api", create_api_router())
        .with_state(state)
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http())
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}
