use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};

use reweave_types::{ProjectFileMap, SessionContext};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// TTLs for the three expiration classes.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// File snapshots are expensive to rebuild; they live the longest.
    pub snapshot_ttl: Duration,
    pub context_ttl: Duration,
    /// Generic keyed state is the most volatile class.
    pub state_ttl: Duration,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(30 * 60),
            context_ttl: Duration::from_secs(10 * 60),
            state_ttl: Duration::from_secs(2 * 60),
            max_entries: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionCache
// ---------------------------------------------------------------------------

/// In-memory TTL cache keyed by session id. Reads slide the entry's TTL by
/// re-inserting it. When the backing service is flagged disconnected, reads
/// miss and writes drop; callers fall back to the durable store.
pub struct SessionCache {
    config: CacheConfig,
    snapshots: Cache<String, Arc<ProjectFileMap>>,
    contexts: Cache<String, SessionContext>,
    state: Cache<String, Arc<serde_json::Value>>,
    /// Which state keys each session owns, so clear_session can find them.
    state_keys: Mutex<HashMap<String, HashSet<String>>>,
    connected: AtomicBool,
}

impl SessionCache {
    pub fn new(config: CacheConfig) -> Self {
        let snapshots = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.snapshot_ttl)
            .build();
        let contexts = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.context_ttl)
            .build();
        let state = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.state_ttl)
            .build();
        Self {
            config,
            snapshots,
            contexts,
            state,
            state_keys: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
        }
    }

    // --- snapshots ---

    pub async fn get_snapshot(&self, session: &str) -> Option<Arc<ProjectFileMap>> {
        if !self.is_connected() {
            return None;
        }
        let hit = self.snapshots.get(session).await?;
        // Sliding expiration: access resets the clock.
        self.snapshots
            .insert(session.to_string(), Arc::clone(&hit))
            .await;
        Some(hit)
    }

    pub async fn set_snapshot(&self, session: &str, map: ProjectFileMap) {
        if !self.is_connected() {
            return;
        }
        self.snapshots.insert(session.to_string(), Arc::new(map)).await;
    }

    // --- session context ---

    pub async fn get_context(&self, session: &str) -> Option<SessionContext> {
        if !self.is_connected() {
            return None;
        }
        let hit = self.contexts.get(session).await?;
        self.contexts.insert(session.to_string(), hit.clone()).await;
        Some(hit)
    }

    pub async fn set_context(&self, session: &str, context: SessionContext) {
        if !self.is_connected() {
            return;
        }
        self.contexts.insert(session.to_string(), context).await;
    }

    // --- generic keyed state ---

    pub async fn get_state(&self, session: &str, key: &str) -> Option<Arc<serde_json::Value>> {
        if !self.is_connected() {
            return None;
        }
        let full = state_key(session, key);
        let hit = self.state.get(&full).await?;
        self.state.insert(full, Arc::clone(&hit)).await;
        Some(hit)
    }

    pub async fn set_state(&self, session: &str, key: &str, value: serde_json::Value) {
        if !self.is_connected() {
            return;
        }
        let full = state_key(session, key);
        if let Ok(mut keys) = self.state_keys.lock() {
            keys.entry(session.to_string())
                .or_default()
                .insert(key.to_string());
        }
        self.state.insert(full, Arc::new(value)).await;
    }

    pub async fn has_state(&self, session: &str, key: &str) -> bool {
        self.is_connected() && self.state.contains_key(&state_key(session, key))
    }

    // --- lifecycle ---

    /// Refresh every entry the session holds without reading it.
    pub async fn extend(&self, session: &str) {
        if !self.is_connected() {
            return;
        }
        self.prune_state_keys();
        if let Some(map) = self.snapshots.get(session).await {
            self.snapshots.insert(session.to_string(), map).await;
        }
        if let Some(ctx) = self.contexts.get(session).await {
            self.contexts.insert(session.to_string(), ctx).await;
        }
        let keys: Vec<String> = self
            .state_keys
            .lock()
            .map(|m| m.get(session).map(|s| s.iter().cloned().collect()))
            .ok()
            .flatten()
            .unwrap_or_default();
        for key in keys {
            let full = state_key(session, &key);
            if let Some(value) = self.state.get(&full).await {
                self.state.insert(full, value).await;
            }
        }
    }

    /// Best-effort removal of all three classes for one session.
    pub async fn clear_session(&self, session: &str) {
        self.snapshots.invalidate(session).await;
        self.contexts.invalidate(session).await;
        let keys: Vec<String> = self
            .state_keys
            .lock()
            .map(|mut m| {
                m.remove(session)
                    .map(|s| s.into_iter().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        for key in keys {
            self.state.invalidate(&state_key(session, &key)).await;
        }
        self.prune_state_keys();
        tracing::debug!(session, "session cache entries cleared");
    }

    /// Drop tracked state keys whose cache entries have expired. Sessions
    /// that are never explicitly cleared would otherwise pin their key sets
    /// in the tracking map forever.
    fn prune_state_keys(&self) {
        if let Ok(mut map) = self.state_keys.lock() {
            map.retain(|session, keys| {
                keys.retain(|key| self.state.contains_key(&state_key(session, key)));
                !keys.is_empty()
            });
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Flip the health flag, e.g. when the backing service drops.
    pub fn set_connected(&self, connected: bool) {
        if !connected {
            tracing::warn!("session cache marked disconnected; reads fall through to durable store");
        }
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn state_key(session: &str, key: &str) -> String {
    format!("{session}\u{1}{key}")
}

/// Stable hex digest of file text. Analysis results are keyed by content,
/// so identical content is never reanalyzed.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn short_lived() -> SessionCache {
        SessionCache::new(CacheConfig {
            snapshot_ttl: Duration::from_millis(60),
            context_ttl: Duration::from_millis(60),
            state_ttl: Duration::from_millis(60),
            max_entries: 100,
        })
    }

    fn context() -> SessionContext {
        SessionContext {
            build_id: "b-1".into(),
            working_dir: PathBuf::from("/tmp/b-1"),
            last_summary: None,
            last_activity: Utc::now(),
        }
    }

    #[tokio::test]
    async fn entry_is_retrievable_before_ttl_and_gone_after() {
        let cache = short_lived();
        cache.set_context("b-1", context()).await;
        assert!(cache.get_context("b-1").await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get_context("b-1").await.is_none());
    }

    #[tokio::test]
    async fn access_slides_expiration() {
        let cache = short_lived();
        cache.set_context("b-1", context()).await;
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert!(cache.get_context("b-1").await.is_some());
        }
    }

    #[tokio::test]
    async fn extend_refreshes_without_reading() {
        let cache = short_lived();
        cache.set_context("b-1", context()).await;
        cache
            .set_state("b-1", "analysis", serde_json::json!({"nodes": 3}))
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.extend("b-1").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get_context("b-1").await.is_some());
        assert!(cache.has_state("b-1", "analysis").await);
    }

    #[tokio::test]
    async fn clear_session_removes_all_classes() {
        let cache = SessionCache::default();
        cache.set_snapshot("b-1", ProjectFileMap::new()).await;
        cache.set_context("b-1", context()).await;
        cache
            .set_state("b-1", "analysis", serde_json::json!(true))
            .await;
        cache.set_context("b-2", context()).await;

        cache.clear_session("b-1").await;
        assert!(cache.get_snapshot("b-1").await.is_none());
        assert!(cache.get_context("b-1").await.is_none());
        assert!(!cache.has_state("b-1", "analysis").await);
        assert!(cache.get_context("b-2").await.is_some());
    }

    #[tokio::test]
    async fn expired_state_keys_are_dropped_from_tracking() {
        let cache = short_lived();
        cache
            .set_state("b-1", "analysis", serde_json::json!(1))
            .await;
        assert!(cache
            .state_keys
            .lock()
            .unwrap()
            .contains_key("b-1"));

        tokio::time::sleep(Duration::from_millis(120)).await;
        // Touching any session sweeps the whole tracking map.
        cache.extend("b-2").await;
        assert!(!cache
            .state_keys
            .lock()
            .unwrap()
            .contains_key("b-1"));
    }

    #[tokio::test]
    async fn disconnected_cache_misses_and_drops_writes() {
        let cache = SessionCache::default();
        cache.set_context("b-1", context()).await;
        cache.set_connected(false);
        assert!(!cache.is_connected());
        assert!(cache.get_context("b-1").await.is_none());
        cache.set_context("b-2", context()).await;

        cache.set_connected(true);
        assert!(cache.get_context("b-1").await.is_some());
        assert!(cache.get_context("b-2").await.is_none());
    }

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        let a = content_hash("<div>hello</div>");
        let b = content_hash("<div>hello</div>");
        let c = content_hash("<div>changed</div>");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
