//! Route table and handlers.
//!
//! UI-facing endpoints answer with a `{ success, data | error }` envelope;
//! webhook endpoints answer with a bare status code.

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    handler::Handler,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{self, authorize_shop_request, install_gate, normalize_shop};
use crate::error::AppError;
use crate::settings::GeneralSettings;
use crate::webhooks::shopify as webhooks;
use crate::SharedState;

// =============================================================================
// Router
// =============================================================================

pub fn app_router(state: SharedState) -> Router {
    let gate = middleware::from_fn_with_state(state.clone(), install_gate);

    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── App pages (gated) ────────────────────────────────────────────
        .route("/", get(app_page.layer(gate.clone())))
        // ── Install flow ─────────────────────────────────────────────────
        .route("/auth", get(auth::oauth::begin))
        .route("/auth/callback", get(auth::oauth::finish))
        // ── Webhooks ─────────────────────────────────────────────────────
        .route("/webhooks", post(webhooks::app_webhook))
        .route("/webhooks/customers/redact", post(webhooks::compliance_webhook))
        .route("/webhooks/shop/redact", post(webhooks::compliance_webhook))
        .route(
            "/webhooks/customers/data_request",
            post(webhooks::compliance_webhook),
        )
        // ── Embedded UI API ──────────────────────────────────────────────
        .route("/api/get-setting", post(get_setting))
        .route("/api/save_change", post(save_change))
        .route("/graphql", post(graphql_proxy))
        .fallback(app_page.layer(gate))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "shopgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// App pages
// =============================================================================

/// Downstream of the install gate. The UI bundle is served elsewhere; this
/// answers with the tenant context the page boots from.
async fn app_page(State(state): State<SharedState>, req: Request) -> Response {
    let uri = req.uri();
    let shop = auth::query_param(uri, "shop").or_else(|| state.config.default_shop.clone());
    let host = auth::query_param(uri, "host");

    Json(json!({
        "data": {
            "path": uri.path(),
            "shop": shop,
            "host": host,
            "api_key": state.config.api_key,
        }
    }))
    .into_response()
}

// =============================================================================
// Settings
// =============================================================================

fn envelope<T: Serialize>(result: Result<T, AppError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response(),
        Err(e) => {
            let mut error = json!({ "code": e.code(), "message": e.to_string() });
            let status = match &e {
                AppError::UpstreamApiFailure { status, .. } => {
                    error["status"] = json!(status);
                    StatusCode::from_u16(*status)
                        .ok()
                        .filter(|s| s.is_client_error() || s.is_server_error())
                        .unwrap_or(StatusCode::BAD_GATEWAY)
                }
                _ => e.status(),
            };
            if status.is_server_error() {
                tracing::error!("{e}");
            }
            (status, Json(json!({ "success": false, "error": error }))).into_response()
        }
    }
}

#[derive(Deserialize)]
struct GetSettingBody {
    shop: String,
}

#[derive(Serialize)]
struct SettingsData {
    settings: Option<GeneralSettings>,
}

/// POST /api/get-setting: read the shop's settings metafield.
async fn get_setting(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<GetSettingBody>, JsonRejection>,
) -> Response {
    let result = match payload {
        Ok(Json(body)) => read_settings(&state, &headers, &body.shop).await,
        Err(rejection) => Err(rejection.into()),
    };
    envelope(result)
}

async fn read_settings(
    state: &SharedState,
    headers: &HeaderMap,
    shop: &str,
) -> Result<SettingsData, AppError> {
    let shop = normalize_shop(shop)?;
    let authorized = authorize_shop_request(state, headers, &shop).await?;

    let Some(owner_id) = state
        .platform
        .current_app_installation(&authorized.shop, &authorized.access_token)
        .await?
    else {
        return Ok(SettingsData { settings: None });
    };

    let raw = state
        .platform
        .get_settings_metafield(&authorized.shop, &authorized.access_token, &owner_id)
        .await?;

    Ok(SettingsData {
        settings: raw.as_deref().map(GeneralSettings::from_stored).transpose()?,
    })
}

#[derive(Deserialize)]
struct SaveChangeBody {
    shop: String,
    config: Value,
}

/// POST /api/save_change: validate and write the shop's settings.
async fn save_change(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<SaveChangeBody>, JsonRejection>,
) -> Response {
    let result = match payload {
        Ok(Json(body)) => write_settings(&state, &headers, body).await,
        Err(rejection) => Err(rejection.into()),
    };
    envelope(result)
}

async fn write_settings(
    state: &SharedState,
    headers: &HeaderMap,
    body: SaveChangeBody,
) -> Result<SettingsData, AppError> {
    let shop = normalize_shop(&body.shop)?;
    let authorized = authorize_shop_request(state, headers, &shop).await?;
    let settings = GeneralSettings::from_request(body.config)?;

    let owner_id = state
        .platform
        .current_app_installation(&authorized.shop, &authorized.access_token)
        .await?
        .ok_or_else(|| AppError::UpstreamApiFailure {
            status: 404,
            message: "app installation not found".into(),
        })?;

    state
        .platform
        .set_settings_metafield(
            &authorized.shop,
            &authorized.access_token,
            &owner_id,
            &settings.to_json()?,
        )
        .await?;

    tracing::info!("[Settings] saved v{} settings for {shop}", settings.version);
    Ok(SettingsData {
        settings: Some(settings),
    })
}

// =============================================================================
// GraphQL proxy
// =============================================================================

#[derive(Deserialize)]
struct ShopQuery {
    shop: String,
}

/// POST /graphql?shop=…: forward a GraphQL body to the shop's Admin API.
async fn graphql_proxy(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(q): Query<ShopQuery>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let shop = normalize_shop(&q.shop)?;
    let authorized = authorize_shop_request(&state, &headers, &shop).await?;

    let (status, value) = state
        .platform
        .graphql(&authorized.shop, &authorized.access_token, &body)
        .await?;

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, Json(value)).into_response())
}
