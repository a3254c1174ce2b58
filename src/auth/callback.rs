use crate::error::AppError;
use crate::store::ShopRegistry;

/// Finish an install once the OAuth handshake has produced a token.
///
/// Writes the token into the registry and, only if that write succeeded,
/// returns the app home URL to redirect to. A registry failure is returned
/// as-is so the caller answers 5xx instead of a redirect.
pub async fn complete_install(
    registry: &dyn ShopRegistry,
    shop: &str,
    access_token: &str,
    scope: &str,
    host: Option<&str>,
) -> Result<String, AppError> {
    registry.upsert_token(shop, access_token).await.map_err(|e| {
        tracing::error!("[Auth] failed to record install for {shop}: {e}");
        e
    })?;

    tracing::info!("[Auth] {shop} installed (scope: {scope})");
    Ok(home_url(shop, host))
}

/// `/?shop=…&host=…`
pub fn home_url(shop: &str, host: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("shop", shop);
    if let Some(host) = host.filter(|h| !h.is_empty()) {
        query.append_pair("host", host);
    }
    format!("/?{}", query.finish())
}
