//! Shop registry: one durable record per shop domain.
//!
//! The registry is the only authority on whether a shop is installed. There
//! is no process-local cache in front of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::crypto::CryptoEngine;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShopRecord {
    pub shop: String,
    /// Current offline access token. Never serialized out.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub active: bool,
    pub invalid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShopRecord {
    /// A record whose token was never set, or that an uninstall flagged, does
    /// not count as installed.
    pub fn is_installed(&self) -> bool {
        !self.invalid && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Outcome of a registry lookup. Keeps "not installed" apart from "could not
/// ask".
#[derive(Debug)]
pub enum ShopLookup {
    Found(ShopRecord),
    NotFound,
    Unavailable(AppError),
}

impl From<Result<Option<ShopRecord>, AppError>> for ShopLookup {
    fn from(result: Result<Option<ShopRecord>, AppError>) -> Self {
        match result {
            Ok(Some(record)) => ShopLookup::Found(record),
            Ok(None) => ShopLookup::NotFound,
            Err(e) => ShopLookup::Unavailable(e),
        }
    }
}

#[async_trait]
pub trait ShopRegistry: Send + Sync {
    async fn find_by_shop(&self, shop: &str) -> Result<Option<ShopRecord>, AppError>;

    /// Insert the shop with `token`, or replace the token of the existing
    /// record. Concurrent calls for one shop resolve last-writer-wins.
    async fn upsert_token(&self, shop: &str, token: &str) -> Result<ShopRecord, AppError>;

    /// Flag the shop as uninstalled and drop its token. The row is kept.
    /// Returns `false` when the shop was never registered.
    async fn mark_uninstalled(&self, shop: &str) -> Result<bool, AppError>;

    async fn lookup(&self, shop: &str) -> ShopLookup {
        self.find_by_shop(shop).await.into()
    }
}

fn unavailable(e: sqlx::Error) -> AppError {
    tracing::error!("Shop registry error: {e}");
    AppError::RegistryUnavailable(e.to_string())
}

/// Registry backed by the `shops` table. Tokens are AES-GCM encrypted.
pub struct PgShopRegistry {
    pool: PgPool,
    crypto: Arc<CryptoEngine>,
}

impl PgShopRegistry {
    pub fn new(pool: PgPool, crypto: Arc<CryptoEngine>) -> Self {
        Self { pool, crypto }
    }

    fn record_from_row(&self, row: &PgRow) -> Result<ShopRecord, AppError> {
        let enc_token: Option<String> = row.try_get("token").map_err(unavailable)?;
        let token = match enc_token {
            Some(ref t) if !t.is_empty() => Some(self.crypto.decrypt(t)?),
            _ => None,
        };

        Ok(ShopRecord {
            shop: row.try_get("shop").map_err(unavailable)?,
            token,
            active: row.try_get("active").map_err(unavailable)?,
            invalid: row.try_get("invalid").map_err(unavailable)?,
            created_at: row.try_get("created_at").map_err(unavailable)?,
            updated_at: row.try_get("updated_at").map_err(unavailable)?,
        })
    }
}

#[async_trait]
impl ShopRegistry for PgShopRegistry {
    async fn find_by_shop(&self, shop: &str) -> Result<Option<ShopRecord>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT shop, token, active, invalid, created_at, updated_at
            FROM shops
            WHERE shop = $1
            "#,
        )
        .bind(shop)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(|r| self.record_from_row(&r)).transpose()
    }

    async fn upsert_token(&self, shop: &str, token: &str) -> Result<ShopRecord, AppError> {
        let enc_token = self.crypto.encrypt(token)?;

        let row = sqlx::query(
            r#"
            INSERT INTO shops (shop, token, active, invalid)
            VALUES ($1, $2, true, false)
            ON CONFLICT (shop) DO UPDATE SET
                token      = EXCLUDED.token,
                active     = true,
                invalid    = false,
                updated_at = NOW()
            RETURNING shop, token, active, invalid, created_at, updated_at
            "#,
        )
        .bind(shop)
        .bind(&enc_token)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        self.record_from_row(&row)
    }

    async fn mark_uninstalled(&self, shop: &str) -> Result<bool, AppError> {
        let affected = sqlx::query(
            r#"
            UPDATE shops
            SET token = NULL, active = false, invalid = true, updated_at = NOW()
            WHERE shop = $1
            "#,
        )
        .bind(shop)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?
        .rows_affected();

        Ok(affected > 0)
    }
}

/// Process-local registry for tests and single-instance dev runs.
#[derive(Default)]
pub struct MemoryShopRegistry {
    shops: RwLock<HashMap<String, ShopRecord>>,
}

impl MemoryShopRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShopRegistry for MemoryShopRegistry {
    async fn find_by_shop(&self, shop: &str) -> Result<Option<ShopRecord>, AppError> {
        Ok(self.shops.read().await.get(shop).cloned())
    }

    async fn upsert_token(&self, shop: &str, token: &str) -> Result<ShopRecord, AppError> {
        let now = Utc::now();
        let mut shops = self.shops.write().await;
        let record = shops
            .entry(shop.to_string())
            .and_modify(|r| {
                r.token = Some(token.to_string());
                r.active = true;
                r.invalid = false;
                r.updated_at = now;
            })
            .or_insert_with(|| ShopRecord {
                shop: shop.to_string(),
                token: Some(token.to_string()),
                active: true,
                invalid: false,
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn mark_uninstalled(&self, shop: &str) -> Result<bool, AppError> {
        let mut shops = self.shops.write().await;
        match shops.get_mut(shop) {
            Some(r) => {
                r.token = None;
                r.active = false;
                r.invalid = true;
                r.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
