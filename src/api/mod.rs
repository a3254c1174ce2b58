//! HTTP surface.
//!
//! - `/`, fallback          app pages, behind the install gate
//! - `/auth`, `/auth/callback` install flow
//! - `/webhooks/*`          signed platform webhooks
//! - `/api/*`, `/graphql`   embedded UI endpoints (session token)
//! - `/status`              health check

pub mod routes;


use axum::{
    extract::{Request, State},
    http::{header::CONTENT_SECURITY_POLICY, HeaderValue},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::{normalize_shop, query_param};
use crate::SharedState;

pub fn router(state: SharedState) -> Router {
    routes::app_router(state.clone())
        .layer(middleware::from_fn_with_state(state, frame_ancestors))
        .layer(TraceLayer::new_for_http())
}

/// Value of the `Content-Security-Policy` header for a request.
pub fn frame_ancestors_policy(embedded: bool, shop: Option<&str>) -> String {
    match shop {
        Some(shop) if embedded => {
            format!("frame-ancestors https://{shop} https://admin.shopify.com;")
        }
        _ => "frame-ancestors 'none';".to_string(),
    }
}

/// Only the shop's admin may frame the app.
async fn frame_ancestors(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let shop = query_param(req.uri(), "shop").and_then(|s| normalize_shop(&s).ok());
    let policy = frame_ancestors_policy(state.config.embedded, shop.as_deref());

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&policy) {
        response.headers_mut().insert(CONTENT_SECURITY_POLICY, value);
    }
    response
}
