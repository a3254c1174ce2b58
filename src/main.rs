use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use shopgate::crypto::CryptoEngine;
use shopgate::platform::AdminClient;
use shopgate::store::{
    self, MemorySessionStore, MemoryShopRegistry, PgSessionStore, PgShopRegistry, SessionStore,
    ShopRegistry,
};
use shopgate::{api, AppState, Config, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopgate=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("shopgate v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    let crypto: Arc<CryptoEngine>;
    let sessions: Arc<dyn SessionStore>;
    let shops: Arc<dyn ShopRegistry>;
    match (&config.database_url, &config.master_key) {
        (Some(db_url), Some(master_key)) => {
            crypto = Arc::new(CryptoEngine::new(master_key, &config.state_secret)?);
            let pool = store::db::connect(db_url, config.upstream_timeout).await?;
            store::db::migrate(&pool).await?;
            info!("Database connected and migrated ✓");
            sessions = Arc::new(PgSessionStore::new(pool.clone()));
            shops = Arc::new(PgShopRegistry::new(pool, crypto.clone()));
        }
        _ => {
            warn!("DATABASE_URL not set: sessions and shops are kept in memory and lost on restart");
            crypto = Arc::new(CryptoEngine::ephemeral(&config.state_secret)?);
            sessions = Arc::new(MemorySessionStore::new());
            shops = Arc::new(MemoryShopRegistry::new());
        }
    }

    let platform = Arc::new(AdminClient::new(&config)?);

    if let Some(shop) = &config.default_shop {
        info!("Default shop for requests without ?shop=: {shop}");
    }

    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        sessions,
        shops,
        platform,
        crypto,
    });

    let app = api::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}
