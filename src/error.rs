use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the shopgate service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ── Backing stores ──────────────────────────────────────────────────
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Shop registry unavailable: {0}")]
    RegistryUnavailable(String),

    // ── Auth Errors ─────────────────────────────────────────────────────
    #[error("Webhook authentication failed")]
    AuthenticationFailure,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid state parameter")]
    InvalidState,

    // ── Tenant Errors ───────────────────────────────────────────────────
    #[error("Shop {0} is not installed")]
    NotInstalled(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // ── Upstream ────────────────────────────────────────────────────────
    #[error("Platform API error ({status}): {message}")]
    UpstreamApiFailure { status: u16, message: String },

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, shared by the error body and the
    /// settings envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::RegistryUnavailable(_) => "registry_unavailable",
            AppError::AuthenticationFailure => "authentication_failure",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::InvalidState => "invalid_state",
            AppError::NotInstalled(_) => "not_installed",
            AppError::BadRequest(_) => "bad_request",
            AppError::UpstreamApiFailure { .. } => "upstream_api_failure",
            AppError::CryptoError(_) => "crypto_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::StoreUnavailable(_) | AppError::RegistryUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::AuthenticationFailure
            | AppError::Unauthorized
            | AppError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidState | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotInstalled(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamApiFailure { .. } => StatusCode::BAD_GATEWAY,
            AppError::CryptoError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16()).unwrap_or(502);
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        };
        tracing::warn!("Platform API transport error: {message}");
        AppError::UpstreamApiFailure { status, message }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_failures_are_server_errors() {
        assert_eq!(
            AppError::RegistryUnavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::StoreUnavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::AuthenticationFailure.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn upstream_failure_keeps_status_in_message() {
        let err = AppError::UpstreamApiFailure {
            status: 429,
            message: "throttled".into(),
        };
        assert_eq!(err.code(), "upstream_api_failure");
        assert!(err.to_string().contains("429"));
    }
}
