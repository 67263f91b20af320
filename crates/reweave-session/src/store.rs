use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::SessionCache;
use reweave_types::{
    ModificationChange, ProjectFileMap, Result, ReweaveError, SessionContext,
};

// ---------------------------------------------------------------------------
// DurableStore
// ---------------------------------------------------------------------------

/// Slower mirror of the session cache. Implementations persist snapshots,
/// contexts, and the append-only change history keyed by session id.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn load_snapshot(&self, session: &str) -> Result<Option<ProjectFileMap>>;
    async fn save_snapshot(&self, session: &str, map: &ProjectFileMap) -> Result<()>;
    async fn load_context(&self, session: &str) -> Result<Option<SessionContext>>;
    async fn save_context(&self, session: &str, context: &SessionContext) -> Result<()>;
    async fn load_changes(&self, session: &str) -> Result<Vec<ModificationChange>>;
    /// Appends; existing records are never rewritten.
    async fn append_changes(&self, session: &str, changes: &[ModificationChange]) -> Result<()>;
    async fn clear_session(&self, session: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Durable store backed by one directory per session holding
/// `snapshot.json`, `context.json`, and `changes.json`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session: &str) -> Result<PathBuf> {
        if session.is_empty()
            || session.contains('/')
            || session.contains('\\')
            || session.contains("..")
        {
            return Err(ReweaveError::SessionSetup(format!(
                "invalid session id '{session}'"
            )));
        }
        Ok(self.root.join(session))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, text).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn load_snapshot(&self, session: &str) -> Result<Option<ProjectFileMap>> {
        Self::read_json(&self.session_dir(session)?.join("snapshot.json")).await
    }

    async fn save_snapshot(&self, session: &str, map: &ProjectFileMap) -> Result<()> {
        Self::write_json(&self.session_dir(session)?.join("snapshot.json"), map).await
    }

    async fn load_context(&self, session: &str) -> Result<Option<SessionContext>> {
        Self::read_json(&self.session_dir(session)?.join("context.json")).await
    }

    async fn save_context(&self, session: &str, context: &SessionContext) -> Result<()> {
        Self::write_json(&self.session_dir(session)?.join("context.json"), context).await
    }

    async fn load_changes(&self, session: &str) -> Result<Vec<ModificationChange>> {
        let path = self.session_dir(session)?.join("changes.json");
        Ok(Self::read_json(&path).await?.unwrap_or_default())
    }

    async fn append_changes(&self, session: &str, changes: &[ModificationChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let path = self.session_dir(session)?.join("changes.json");
        let mut log: Vec<ModificationChange> = Self::read_json(&path).await?.unwrap_or_default();
        log.extend_from_slice(changes);
        Self::write_json(&path, &log).await
    }

    async fn clear_session(&self, session: &str) -> Result<()> {
        let dir = self.session_dir(session)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionStore — cache-aside facade
// ---------------------------------------------------------------------------

/// Reads try the cache first and fall back to the durable store, repopulating
/// the cache on a miss. Writes go through to the store, then mirror into the
/// cache. A disconnected cache leaves every operation correct, just slower.
pub struct SessionStore {
    cache: SessionCache,
    store: Arc<dyn DurableStore>,
}

impl SessionStore {
    pub fn new(cache: SessionCache, store: Arc<dyn DurableStore>) -> Self {
        Self { cache, store }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub async fn snapshot(&self, session: &str) -> Result<Option<ProjectFileMap>> {
        if let Some(hit) = self.cache.get_snapshot(session).await {
            return Ok(Some((*hit).clone()));
        }
        let loaded = self.store.load_snapshot(session).await?;
        if let Some(map) = &loaded {
            self.cache.set_snapshot(session, map.clone()).await;
        }
        Ok(loaded)
    }

    pub async fn save_snapshot(&self, session: &str, map: &ProjectFileMap) -> Result<()> {
        self.store.save_snapshot(session, map).await?;
        self.cache.set_snapshot(session, map.clone()).await;
        Ok(())
    }

    pub async fn context(&self, session: &str) -> Result<Option<SessionContext>> {
        if let Some(hit) = self.cache.get_context(session).await {
            return Ok(Some(hit));
        }
        let loaded = self.store.load_context(session).await?;
        if let Some(ctx) = &loaded {
            self.cache.set_context(session, ctx.clone()).await;
        }
        Ok(loaded)
    }

    pub async fn save_context(&self, session: &str, context: &SessionContext) -> Result<()> {
        self.store.save_context(session, context).await?;
        self.cache.set_context(session, context.clone()).await;
        Ok(())
    }

    pub async fn changes(&self, session: &str) -> Result<Vec<ModificationChange>> {
        self.store.load_changes(session).await
    }

    pub async fn record_changes(
        &self,
        session: &str,
        changes: &[ModificationChange],
    ) -> Result<()> {
        self.store.append_changes(session, changes).await
    }

    pub async fn clear_session(&self, session: &str) -> Result<()> {
        self.cache.clear_session(session).await;
        self.store.clear_session(session).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
