//! Session state: a TTL cache in front of a durable store.
//!
//! Three expiration classes — file snapshots (long), session context
//! (medium), generic keyed state (short) — each slide on access. The cache
//! is an accelerator only: every read path falls back to the durable store,
//! so a disconnected cache degrades latency, never correctness. Change
//! records are append-only once written.

mod cache;
mod store;

pub use cache::{content_hash, CacheConfig, SessionCache};
pub use store::{DurableStore, JsonFileStore, SessionStore};
