pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod platform;
pub mod settings;
pub mod store;
pub mod webhooks;

pub use config::Config;
pub use error::AppError;

use std::sync::Arc;

/// Shared application state passed to all handlers and middleware.
///
/// Holds only clients. All tenant state lives behind `sessions` and `shops`.
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<dyn store::SessionStore>,
    pub shops: Arc<dyn store::ShopRegistry>,
    pub platform: Arc<dyn platform::PlatformApi>,
    pub crypto: Arc<crypto::CryptoEngine>,
}

pub type SharedState = Arc<AppState>;
