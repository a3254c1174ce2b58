//! Session-token verification for requests coming from the embedded UI.
//!
//! The admin frame hands the UI a short-lived HS256 JWT signed with the app's
//! API secret. `aud` is the API key, `dest` is `https://{shop}` and `iss` is
//! `https://{shop}/admin`.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::offline_session_id;
use crate::AppState;

/// Clock skew tolerated on `exp` / `nbf`.
const LEEWAY_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub dest: String,
    pub aud: String,
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub sid: Option<String>,
}

impl SessionClaims {
    /// Shop domain from `dest`.
    pub fn shop(&self) -> Option<&str> {
        self.dest
            .strip_prefix("https://")
            .map(|s| s.trim_end_matches('/'))
            .filter(|s| !s.is_empty())
    }
}

/// Verify signature, audience and lifetime, and check that `iss` and `dest`
/// name the same shop.
pub fn verify_session_token(
    token: &str,
    api_key: &str,
    api_secret: &str,
) -> Result<SessionClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[api_key]);
    validation.validate_nbf = true;
    validation.leeway = LEEWAY_SECS;

    let claims = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(api_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| AppError::InvalidToken(format!("session token rejected: {e}")))?
    .claims;

    let shop = claims
        .shop()
        .ok_or_else(|| AppError::InvalidToken("session token has no shop".into()))?;
    let iss_shop = claims
        .iss
        .strip_prefix("https://")
        .and_then(|s| s.strip_suffix("/admin"));
    if iss_shop != Some(shop) {
        return Err(AppError::InvalidToken("session token iss/dest mismatch".into()));
    }

    Ok(claims)
}

/// Extract the bearer token from `Authorization`.
pub fn bearer(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// A shop request that passed session checks, with the token to call the
/// Admin API with.
#[derive(Debug)]
pub struct AuthorizedShop {
    pub shop: String,
    pub access_token: String,
}

/// Gate for UI-facing API routes.
///
/// The bearer token must be valid and issued for `shop`; the shop must have
/// an offline session and an installed registry record.
pub async fn authorize_shop_request(
    state: &AppState,
    headers: &HeaderMap,
    shop: &str,
) -> Result<AuthorizedShop, AppError> {
    let token = bearer(headers)?;
    let claims = verify_session_token(token, &state.config.api_key, &state.config.api_secret)?;

    if claims.shop() != Some(shop) {
        tracing::warn!(
            "[Auth] session token for {:?} used against {shop}",
            claims.shop()
        );
        return Err(AppError::Unauthorized);
    }

    if state.sessions.load(&offline_session_id(shop)).await?.is_none() {
        return Err(AppError::NotInstalled(shop.to_string()));
    }

    let record = state
        .shops
        .find_by_shop(shop)
        .await?
        .filter(|r| r.is_installed())
        .ok_or_else(|| AppError::NotInstalled(shop.to_string()))?;

    Ok(AuthorizedShop {
        shop: record.shop,
        // is_installed() guarantees a non-empty token
        access_token: record.token.unwrap_or_default(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) fn claims_for(shop: &str, api_key: &str) -> SessionClaims {
        let now = chrono::Utc::now().timestamp();
        SessionClaims {
            iss: format!("https://{shop}/admin"),
            dest: format!("https://{shop}"),
            aud: api_key.to_string(),
            sub: Some("42".into()),
            exp: now + 60,
            nbf: now - 5,
            iat: now - 5,
            jti: Some("jti-1".into()),
            sid: Some("sid-1".into()),
        }
    }

    pub(crate) fn sign(claims: &SessionClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_shop() {
        let token = sign(&claims_for("acme.example", "key"), "secret");
        let claims = verify_session_token(&token, "key", "secret").unwrap();
        assert_eq!(claims.shop(), Some("acme.example"));
    }

    #[test]
    fn wrong_secret_or_audience_is_rejected() {
        let token = sign(&claims_for("acme.example", "key"), "secret");
        assert!(verify_session_token(&token, "key", "other").is_err());
        assert!(verify_session_token(&token, "other-key", "secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = claims_for("acme.example", "key");
        claims.exp = chrono::Utc::now().timestamp() - 120;
        let token = sign(&claims, "secret");
        assert!(verify_session_token(&token, "key", "secret").is_err());
    }

    #[test]
    fn issuer_must_match_destination() {
        let mut claims = claims_for("acme.example", "key");
        claims.iss = "https://evil.example/admin".into();
        let token = sign(&claims, "secret");
        assert!(verify_session_token(&token, "key", "secret").is_err());
    }

    #[test]
    fn bearer_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert!(bearer(&headers).is_err());
        headers.insert("authorization", "Token abc".parse().unwrap());
        assert!(bearer(&headers).is_err());
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(bearer(&headers).unwrap(), "abc");
    }
}
