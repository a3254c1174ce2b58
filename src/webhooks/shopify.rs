/// Platform webhook endpoints.
///
/// Every route reads the body as raw `Bytes`, checks the HMAC header against
/// the API secret and answers with a bare status code: 401 when the
/// signature does not match, 200 once accepted.
///
/// Only `app/uninstalled` has a side effect: the shop is flagged uninstalled
/// in the registry and its offline session is dropped. The three privacy
/// compliance topics are acknowledged without processing.
use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode};

use super::verify::{self, HMAC_HEADER, SHOP_DOMAIN_HEADER, TOPIC_HEADER};
use crate::auth::normalize_shop;
use crate::error::AppError;
use crate::store::offline_session_id;
use crate::SharedState;

const APP_UNINSTALLED: &str = "app/uninstalled";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Check the signature. Never errors: a failed check is just `false`.
fn authenticate(state: &SharedState, headers: &HeaderMap, body: &[u8]) -> bool {
    let ok = verify::verify(body, header(headers, HMAC_HEADER), &state.config.api_secret);
    if !ok {
        tracing::warn!(
            "[Webhook] signature mismatch shop={} topic={}, dropping",
            header(headers, SHOP_DOMAIN_HEADER).unwrap_or("-"),
            header(headers, TOPIC_HEADER).unwrap_or("-"),
        );
    }
    ok
}

/// POST /webhooks: general topic endpoint.
pub async fn app_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !authenticate(&state, &headers, &body) {
        return StatusCode::UNAUTHORIZED;
    }

    let topic = header(&headers, TOPIC_HEADER).unwrap_or_default();
    let shop = header(&headers, SHOP_DOMAIN_HEADER).unwrap_or_default();
    tracing::info!("[Webhook] topic={topic} shop={shop}");

    let result = match topic {
        APP_UNINSTALLED => match normalize_shop(shop) {
            Ok(shop) => handle_uninstalled(&state, &shop).await,
            Err(_) => {
                tracing::warn!("[Webhook] uninstall with unusable shop domain {shop:?}, ignoring");
                Ok(())
            }
        },
        _ => Ok(()),
    };

    match result {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            // 500 makes the platform retry the delivery.
            tracing::error!("[Webhook] handler error for {topic} shop={shop}: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// POST /webhooks/customers/redact, /webhooks/shop/redact,
/// /webhooks/customers/data_request
pub async fn compliance_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !authenticate(&state, &headers, &body) {
        return StatusCode::UNAUTHORIZED;
    }

    tracing::info!(
        "[Webhook] compliance topic={} shop={} acknowledged",
        header(&headers, TOPIC_HEADER).unwrap_or("-"),
        header(&headers, SHOP_DOMAIN_HEADER).unwrap_or("-"),
    );
    StatusCode::OK
}

async fn handle_uninstalled(state: &SharedState, shop: &str) -> Result<(), AppError> {
    let known = state.shops.mark_uninstalled(shop).await?;
    state.sessions.delete(&offline_session_id(shop)).await?;

    if known {
        tracing::info!("[Webhook] {shop} uninstalled, record flagged invalid");
    } else {
        tracing::warn!("[Webhook] uninstall for unregistered shop {shop}");
    }
    Ok(())
}
