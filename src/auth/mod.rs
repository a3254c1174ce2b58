//! Tenant authentication: install gating, the OAuth install flow, and
//! session-token checks for the embedded UI endpoints.

pub mod callback;
pub mod gate;
pub mod oauth;
pub mod session_token;

use axum::http::Uri;

use crate::error::AppError;

pub use callback::complete_install;
pub use gate::install_gate;
pub use session_token::{authorize_shop_request, AuthorizedShop, SessionClaims};

/// First value of query parameter `name`, percent-decoded.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Validate a shop domain and return it lowercased.
///
/// Shop domains end up in outbound URLs (`https://{shop}/admin/...`), so
/// anything that is not a plain hostname is refused.
pub fn normalize_shop(raw: &str) -> Result<String, AppError> {
    let shop = raw.trim().to_ascii_lowercase();

    let valid = !shop.is_empty()
        && shop.len() <= 255
        && shop.contains('.')
        && shop
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && shop
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'));

    if valid {
        Ok(shop)
    } else {
        Err(AppError::BadRequest(format!("invalid shop domain: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_hostnames() {
        assert_eq!(normalize_shop("acme.example").unwrap(), "acme.example");
        assert_eq!(
            normalize_shop(" Acme-Store.myshopify.com ").unwrap(),
            "acme-store.myshopify.com"
        );
    }

    #[test]
    fn refuses_anything_that_could_redirect_a_request() {
        for bad in [
            "",
            "localhost",
            "evil.com/path",
            "evil.com?x=1",
            "user@evil.com",
            "evil.com:8080",
            ".acme.example",
            "acme..example",
            "-acme.example",
            "acme.example-",
        ] {
            assert!(normalize_shop(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn query_param_decodes_values() {
        let uri: Uri = "/?host=YWRtaW4%3D&shop=acme.example".parse().unwrap();
        assert_eq!(query_param(&uri, "shop").as_deref(), Some("acme.example"));
        assert_eq!(query_param(&uri, "host").as_deref(), Some("YWRtaW4="));
        assert_eq!(query_param(&uri, "missing"), None);
    }
}
