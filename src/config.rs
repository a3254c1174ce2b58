use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_SCOPES: &str =
    "read_content,write_content,read_script_tags,write_script_tags,read_products,read_themes";

/// Application configuration, loaded once from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    /// Externally reachable origin, e.g. `https://app.example.com`.
    pub app_url: String,

    // ── Platform app credentials ────────────────────────────────────────
    pub api_key: String,
    /// Also the webhook signing secret and the session-token signing key.
    pub api_secret: String,
    pub scopes: Vec<String>,
    pub api_version: String,
    pub embedded: bool,

    // ── Storage ─────────────────────────────────────────────────────────
    /// PostgreSQL connection string. Absent means in-memory stores.
    pub database_url: Option<String>,
    /// 32-byte base64-encoded key for access-token encryption at rest.
    pub master_key: Option<String>,
    /// Key for signing OAuth state. Derived from the API secret when unset.
    pub state_secret: String,

    // ── Dev ─────────────────────────────────────────────────────────────
    /// Shop used by the install gate when a request carries no `?shop=`.
    pub default_shop: Option<String>,

    /// Budget for each platform API call and each store round-trip.
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_secret = std::env::var("SHOPIFY_API_SECRET")
            .context("SHOPIFY_API_SECRET is required")?;

        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let master_key = std::env::var("MASTER_KEY").ok().filter(|s| !s.is_empty());
        if database_url.is_some() && master_key.is_none() {
            bail!("MASTER_KEY is required when DATABASE_URL is set (32 bytes, base64)");
        }

        let timeout_secs: u64 = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .context("Invalid UPSTREAM_TIMEOUT_SECS")?;

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8081".into())
                .parse()
                .context("Invalid PORT")?,
            app_url: std::env::var("APP_URL")
                .context("APP_URL is required (externally reachable https origin)")?
                .trim_end_matches('/')
                .to_string(),

            api_key: std::env::var("SHOPIFY_API_KEY").context("SHOPIFY_API_KEY is required")?,
            state_secret: std::env::var("STATE_SECRET").unwrap_or_else(|_| api_secret.clone()),
            api_secret,
            scopes: parse_scopes(
                &std::env::var("SCOPES").unwrap_or_else(|_| DEFAULT_SCOPES.into()),
            ),
            api_version: std::env::var("SHOPIFY_API_VERSION")
                .unwrap_or_else(|_| "2022-04".into()),
            embedded: std::env::var("EMBEDDED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),

            database_url,
            master_key,

            default_shop: std::env::var("SHOP").ok().filter(|s| !s.is_empty()),
            upstream_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// The redirect URI registered with the platform for the install flow.
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.app_url)
    }
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
impl Config {
    /// Fixed configuration for unit and router tests.
    pub fn for_tests() -> Self {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            app_url: "https://app.test".into(),
            api_key: "test-api-key".into(),
            api_secret: "test-api-secret".into(),
            scopes: parse_scopes(DEFAULT_SCOPES),
            api_version: "2022-04".into(),
            embedded: true,
            database_url: None,
            master_key: None,
            state_secret: "test-state-secret".into(),
            default_shop: None,
            upstream_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_trimmed_and_empty_entries_dropped() {
        assert_eq!(
            parse_scopes(" read_products, ,write_products "),
            vec!["read_products".to_string(), "write_products".to_string()]
        );
    }

    #[test]
    fn callback_url_is_under_app_url() {
        let config = Config::for_tests();
        assert_eq!(config.callback_url(), "https://app.test/auth/callback");
    }
}
