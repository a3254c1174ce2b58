//! Durable state: OAuth sessions and the shop registry.
//!
//! Both have a PostgreSQL backend for production and an in-memory backend
//! used by tests and by local runs without `DATABASE_URL`.

pub mod db;
pub mod sessions;
pub mod shops;

pub use sessions::{offline_session_id, MemorySessionStore, PgSessionStore, SessionStore};
pub use shops::{MemoryShopRegistry, PgShopRegistry, ShopLookup, ShopRecord, ShopRegistry};
