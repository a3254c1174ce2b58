use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::traits::{AccessToken, PlatformApi};
use crate::config::Config;
use crate::error::AppError;

pub const SETTINGS_NAMESPACE: &str = "app_settings";
pub const SETTINGS_KEY: &str = "general_setting";

const CURRENT_APP_INSTALLATION: &str = "query { currentAppInstallation { id } }";

const GET_SETTINGS: &str = r#"query AppSetting($id: ID!) {
  appInstallation(id: $id) {
    metafield(namespace: "app_settings", key: "general_setting") { value }
  }
}"#;

const SET_SETTINGS: &str = r#"mutation CreateAppDataMetafield($metafieldsSetInput: [MetafieldsSetInput!]!) {
  metafieldsSet(metafields: $metafieldsSetInput) {
    metafields { id namespace key }
    userErrors { field message }
  }
}"#;

/// Admin API client for one app, shared across shops.
///
/// Quirks:
/// - The access-token header is `X-Shopify-Access-Token`, not `Authorization`.
/// - GraphQL failures arrive with HTTP 200 and an `errors` array; throttling
///   is `errors[].extensions.code == "THROTTLED"`.
/// - Offline tokens do not expire, so there is no refresh call.
pub struct AdminClient {
    api_key: String,
    api_secret: String,
    api_version: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    scope: String,
}

impl AdminClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_version: config.api_version.clone(),
            http,
        })
    }

    fn graphql_url(&self, shop: &str) -> String {
        format!("https://{shop}/admin/api/{}/graphql.json", self.api_version)
    }

    /// POST a GraphQL document and fail on transport, HTTP or GraphQL errors.
    async fn query(&self, shop: &str, token: &str, body: &Value) -> Result<Value, AppError> {
        let (status, value) = self.graphql(shop, token, body).await?;

        if !(200..300).contains(&status) {
            return Err(AppError::UpstreamApiFailure {
                status,
                message: value.to_string(),
            });
        }
        graphql_errors(&value)?;

        Ok(value)
    }
}

/// Admin API responses are always JSON objects; anything else is an
/// upstream failure rather than an empty result.
fn parse_body(status: u16, text: &str) -> Result<Value, AppError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(AppError::UpstreamApiFailure {
            status,
            message: format!("expected a JSON object, got {other}"),
        }),
        Err(e) => Err(AppError::UpstreamApiFailure {
            status,
            message: format!("failed to parse Admin API response: {e}"),
        }),
    }
}

/// Map a GraphQL `errors` array to an upstream failure.
fn graphql_errors(value: &Value) -> Result<(), AppError> {
    let Some(errors) = value.get("errors").and_then(Value::as_array) else {
        return Ok(());
    };
    if errors.is_empty() {
        return Ok(());
    }

    let throttled = errors.iter().any(|e| {
        e.pointer("/extensions/code").and_then(Value::as_str) == Some("THROTTLED")
    });
    let message = errors
        .iter()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("; ");

    Err(AppError::UpstreamApiFailure {
        status: if throttled { 429 } else { 422 },
        message,
    })
}

#[async_trait]
impl PlatformApi for AdminClient {
    fn authorize_url(
        &self,
        shop: &str,
        scopes: &[String],
        state: &str,
        redirect_uri: &str,
    ) -> String {
        format!(
            "https://{shop}/admin/oauth/authorize?\
             client_id={client_id}\
             &scope={scope}\
             &redirect_uri={redirect_uri}\
             &state={state}",
            client_id = urlencoding(&self.api_key),
            scope = urlencoding(&scopes.join(",")),
            redirect_uri = urlencoding(redirect_uri),
            state = urlencoding(state),
        )
    }

    async fn exchange_code(&self, shop: &str, code: &str) -> Result<AccessToken, AppError> {
        let resp = self
            .http
            .post(format!("https://{shop}/admin/oauth/access_token"))
            .header("Accept", "application/json")
            .json(&json!({
                "client_id": self.api_key,
                "client_secret": self.api_secret,
                "code": code,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::UpstreamApiFailure {
                status: status.as_u16(),
                message: format!("token exchange failed: {body}"),
            });
        }

        let token: TokenResponse = resp.json().await.map_err(|e| AppError::UpstreamApiFailure {
            status: status.as_u16(),
            message: format!("failed to parse token response: {e}"),
        })?;

        Ok(AccessToken {
            access_token: token.access_token,
            scope: token.scope,
        })
    }

    async fn current_app_installation(
        &self,
        shop: &str,
        token: &str,
    ) -> Result<Option<String>, AppError> {
        let body = json!({ "query": CURRENT_APP_INSTALLATION, "variables": {} });
        let value = self.query(shop, token, &body).await?;

        Ok(value
            .pointer("/data/currentAppInstallation/id")
            .and_then(Value::as_str)
            .map(String::from))
    }

    async fn get_settings_metafield(
        &self,
        shop: &str,
        token: &str,
        owner_id: &str,
    ) -> Result<Option<String>, AppError> {
        let body = json!({ "query": GET_SETTINGS, "variables": { "id": owner_id } });
        let value = self.query(shop, token, &body).await?;

        Ok(value
            .pointer("/data/appInstallation/metafield/value")
            .and_then(Value::as_str)
            .map(String::from))
    }

    async fn set_settings_metafield(
        &self,
        shop: &str,
        token: &str,
        owner_id: &str,
        value_json: &str,
    ) -> Result<(), AppError> {
        let body = json!({
            "query": SET_SETTINGS,
            "variables": {
                "metafieldsSetInput": [{
                    "namespace": SETTINGS_NAMESPACE,
                    "key": SETTINGS_KEY,
                    "type": "json",
                    "value": value_json,
                    "ownerId": owner_id,
                }]
            }
        });
        let value = self.query(shop, token, &body).await?;

        if let Some(errors) = value
            .pointer("/data/metafieldsSet/userErrors")
            .and_then(Value::as_array)
            .filter(|e| !e.is_empty())
        {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AppError::UpstreamApiFailure {
                status: 422,
                message,
            });
        }

        Ok(())
    }

    async fn graphql(
        &self,
        shop: &str,
        token: &str,
        body: &Value,
    ) -> Result<(u16, Value), AppError> {
        let resp = self
            .http
            .post(self.graphql_url(shop))
            .header("X-Shopify-Access-Token", token)
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let text = resp.text().await?;
        Ok((status, parse_body(status, &text)?))
    }
}

fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
