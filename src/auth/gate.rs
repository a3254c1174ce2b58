//! Install gate: lets a request through only when its shop is installed.
//!
//! ```text
//! unauthenticated --registry miss--> redirect /auth?shop=…   (handler not run)
//! unauthenticated --registry hit---> handler
//! unauthenticated --registry down--> 503                      (never "not installed")
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use super::{normalize_shop, query_param};
use crate::error::AppError;
use crate::store::{ShopLookup, ShopRegistry};
use crate::SharedState;

#[derive(Debug)]
pub enum GateDecision {
    Proceed,
    /// Location of the install flow for this shop.
    Install(String),
    Fail(AppError),
}

/// URL of the install flow for `shop`.
pub fn install_url(shop: &str) -> String {
    let shop: String = url::form_urlencoded::byte_serialize(shop.as_bytes()).collect();
    format!("/auth?shop={shop}")
}

/// Decide the fate of a request for `shop`. Read-only against the registry.
pub async fn decide(registry: &dyn ShopRegistry, shop: &str) -> GateDecision {
    match registry.lookup(shop).await {
        ShopLookup::Found(record) if record.is_installed() => GateDecision::Proceed,
        ShopLookup::Found(_) => {
            tracing::info!("[Gate] {shop} is registered but uninstalled, sending to install");
            GateDecision::Install(install_url(shop))
        }
        ShopLookup::NotFound => {
            tracing::info!("[Gate] {shop} not installed, sending to install");
            GateDecision::Install(install_url(shop))
        }
        ShopLookup::Unavailable(e) => {
            tracing::error!("[Gate] registry unavailable for {shop}: {e}");
            GateDecision::Fail(e)
        }
    }
}

/// axum middleware wrapping the app pages.
///
/// The shop comes from `?shop=`, falling back to the configured default
/// shop for local use.
pub async fn install_gate(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let raw_shop = query_param(req.uri(), "shop")
        .filter(|s| !s.is_empty())
        .or_else(|| state.config.default_shop.clone());

    let Some(raw_shop) = raw_shop else {
        return AppError::BadRequest("missing shop parameter".into()).into_response();
    };
    let shop = match normalize_shop(&raw_shop) {
        Ok(shop) => shop,
        Err(e) => return e.into_response(),
    };

    match decide(state.shops.as_ref(), &shop).await {
        GateDecision::Proceed => next.run(req).await,
        GateDecision::Install(location) => Redirect::temporary(&location).into_response(),
        GateDecision::Fail(e) => e.into_response(),
    }
}
