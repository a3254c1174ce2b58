//! Credential store for OAuth sessions.
//!
//! Sessions are opaque JSON blobs keyed by the id the install flow hands out.
//! Nothing outside the install flow looks inside them.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::AppError;

/// Id of the long-lived offline session for a shop.
pub fn offline_session_id(shop: &str) -> String {
    format!("offline_{shop}")
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist `value` under `id`, replacing any previous value.
    async fn store(&self, id: &str, value: &Value) -> Result<(), AppError>;

    /// `Ok(None)` when nothing is stored under `id`.
    async fn load(&self, id: &str) -> Result<Option<Value>, AppError>;

    /// Remove `id`. Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

fn unavailable(e: sqlx::Error) -> AppError {
    tracing::error!("Session store error: {e}");
    AppError::StoreUnavailable(e.to_string())
}

/// Session store backed by the `shopify_sessions` table.
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn store(&self, id: &str, value: &Value) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO shopify_sessions (id, payload)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                payload    = EXCLUDED.payload,
                updated_at = NOW()
            "#,
        )
        .bind(id)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Value>, AppError> {
        let row = sqlx::query("SELECT payload FROM shopify_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(row.map(|r| r.get::<Value, _>(0)))
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM shopify_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

/// Process-local session store for tests and single-instance dev runs.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Value>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn store(&self, id: &str, value: &Value) -> Result<(), AppError> {
        self.sessions
            .write()
            .await
            .insert(id.to_string(), value.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Value>, AppError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn load_returns_what_was_stored() {
        let store = MemorySessionStore::new();
        let blob = json!({ "shop": "acme.example", "scope": "read_products", "is_online": false });

        store.store("sess-1", &blob).await.unwrap();
        assert_eq!(store.load("sess-1").await.unwrap(), Some(blob));
    }

    #[tokio::test]
    async fn store_replaces_the_whole_record() {
        let store = MemorySessionStore::new();
        store.store("sess-1", &json!({ "a": 1, "b": 2 })).await.unwrap();
        store.store("sess-1", &json!({ "a": 3 })).await.unwrap();

        assert_eq!(store.load("sess-1").await.unwrap(), Some(json!({ "a": 3 })));
    }

    #[tokio::test]
    async fn delete_then_load_is_not_found() {
        let store = MemorySessionStore::new();
        store.store("sess-1", &json!({})).await.unwrap();

        store.delete("sess-1").await.unwrap();
        assert_eq!(store.load("sess-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_idempotent() {
        let store = MemorySessionStore::new();
        store.delete("never-stored").await.unwrap();
        store.delete("never-stored").await.unwrap();
        assert_eq!(store.load("never-stored").await.unwrap(), None);
    }

    #[test]
    fn offline_id_is_keyed_by_shop() {
        assert_eq!(offline_session_id("acme.example"), "offline_acme.example");
    }
}
