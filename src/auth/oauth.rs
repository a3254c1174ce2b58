//! Offline-access OAuth install flow.
//!
//! `GET /auth` creates a nonce session and redirects to the shop's
//! authorization page. `GET /auth/callback` checks the signed query, consumes
//! the nonce, exchanges the code and hands the token to
//! [`complete_install`](super::complete_install).

use axum::{
    extract::{Query, RawQuery, State},
    response::{IntoResponse, Redirect, Response},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use super::{complete_install, normalize_shop};
use crate::error::AppError;
use crate::store::offline_session_id;
use crate::SharedState;

type HmacSha256 = Hmac<Sha256>;

/// A nonce session older than this is refused at callback time.
const STATE_TTL_SECS: i64 = 600;

#[derive(Deserialize)]
pub struct BeginQuery {
    shop: Option<String>,
}

/// GET /auth: start the install flow for a shop.
pub async fn begin(
    State(state): State<SharedState>,
    Query(q): Query<BeginQuery>,
) -> Result<Response, AppError> {
    let raw_shop = q
        .shop
        .filter(|s| !s.is_empty())
        .or_else(|| state.config.default_shop.clone())
        .ok_or_else(|| AppError::BadRequest("missing shop parameter".into()))?;
    let shop = normalize_shop(&raw_shop)?;

    let nonce = uuid::Uuid::new_v4().to_string();
    state
        .sessions
        .store(
            &nonce,
            &json!({
                "id": nonce,
                "shop": shop,
                "state": nonce,
                "is_online": false,
                "created_at": chrono::Utc::now().timestamp(),
            }),
        )
        .await?;

    let signed_state = state.crypto.sign_state(&nonce)?;
    let auth_url = state.platform.authorize_url(
        &shop,
        &state.config.scopes,
        &signed_state,
        &state.config.callback_url(),
    );

    tracing::info!("[Auth] starting install for {shop}");
    Ok(Redirect::temporary(&auth_url).into_response())
}

/// Check the platform's signature over the callback query string.
///
/// The message is every parameter except `hmac` and `signature`, sorted by
/// key and joined as `k=v&k=v`; the digest is hex HMAC-SHA256 under the API
/// secret.
pub fn verify_query_hmac(params: &[(String, String)], secret: &str) -> bool {
    let Some(provided) = params.iter().find(|(k, _)| k == "hmac").map(|(_, v)| v) else {
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };

    let mut pairs: Vec<&(String, String)> = params
        .iter()
        .filter(|(k, _)| k != "hmac" && k != "signature")
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let message = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message.as_bytes());
    mac.verify_slice(&provided).is_ok()
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// GET /auth/callback: finish the install flow.
///
/// The nonce is loaded, checked and deleted as separate store calls, so two
/// concurrent callbacks carrying the same state can both get past the check.
/// That race is accepted: both exchange a code for the same shop and the
/// registry upsert is idempotent, so the outcome is one installed record.
pub async fn finish(
    State(state): State<SharedState>,
    RawQuery(raw): RawQuery,
) -> Result<Response, AppError> {
    let raw = raw.ok_or_else(|| AppError::BadRequest("missing callback parameters".into()))?;
    let params: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();

    if !verify_query_hmac(&params, &state.config.api_secret) {
        tracing::warn!("[Auth] callback signature mismatch");
        return Err(AppError::AuthenticationFailure);
    }

    let shop = normalize_shop(
        param(&params, "shop").ok_or_else(|| AppError::BadRequest("missing shop".into()))?,
    )?;
    let code = param(&params, "code").ok_or_else(|| AppError::BadRequest("missing code".into()))?;
    let signed_state = param(&params, "state").ok_or(AppError::InvalidState)?;
    let host = param(&params, "host");

    let nonce = state.crypto.verify_state(signed_state)?;
    let pending = state
        .sessions
        .load(&nonce)
        .await?
        .ok_or(AppError::InvalidState)?;
    check_pending_session(&pending, &shop, chrono::Utc::now().timestamp())?;
    state.sessions.delete(&nonce).await?;

    let token = state.platform.exchange_code(&shop, code).await?;

    // Replace the nonce session with the long-lived offline session.
    let offline_id = offline_session_id(&shop);
    state
        .sessions
        .store(
            &offline_id,
            &json!({
                "id": offline_id,
                "shop": shop,
                "state": nonce,
                "is_online": false,
                "scope": token.scope,
                "access_token": state.crypto.encrypt(&token.access_token)?,
            }),
        )
        .await?;

    let target = complete_install(
        state.shops.as_ref(),
        &shop,
        &token.access_token,
        &token.scope,
        host,
    )
    .await?;

    Ok(Redirect::temporary(&target).into_response())
}

fn check_pending_session(pending: &Value, shop: &str, now: i64) -> Result<(), AppError> {
    if pending.get("shop").and_then(Value::as_str) != Some(shop) {
        tracing::warn!("[Auth] state was issued for a different shop than {shop}");
        return Err(AppError::InvalidState);
    }

    let created_at = pending
        .get("created_at")
        .and_then(Value::as_i64)
        .ok_or(AppError::InvalidState)?;
    if now - created_at > STATE_TTL_SECS {
        return Err(AppError::BadRequest("OAuth session expired".into()));
    }

    Ok(())
}
