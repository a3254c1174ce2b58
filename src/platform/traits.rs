use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// Offline access token returned by the platform after code exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub scope: String,
}

/// The calls this app makes against a shop's Admin API.
///
/// Every method talks to `https://{shop}/…` and is bounded by the client's
/// timeout.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Build the authorization URL the merchant is redirected to.
    fn authorize_url(&self, shop: &str, scopes: &[String], state: &str, redirect_uri: &str)
        -> String;

    /// Exchange an authorization code for an offline access token.
    async fn exchange_code(&self, shop: &str, code: &str) -> Result<AccessToken, AppError>;

    /// GraphQL id of this app's installation on `shop`, used as metafield owner.
    async fn current_app_installation(
        &self,
        shop: &str,
        token: &str,
    ) -> Result<Option<String>, AppError>;

    /// Raw JSON string stored in the settings metafield, if any.
    async fn get_settings_metafield(
        &self,
        shop: &str,
        token: &str,
        owner_id: &str,
    ) -> Result<Option<String>, AppError>;

    async fn set_settings_metafield(
        &self,
        shop: &str,
        token: &str,
        owner_id: &str,
        value_json: &str,
    ) -> Result<(), AppError>;

    /// Forward a GraphQL request body verbatim. Returns upstream status + JSON.
    async fn graphql(&self, shop: &str, token: &str, body: &Value)
        -> Result<(u16, Value), AppError>;
}
