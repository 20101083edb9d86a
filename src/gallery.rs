//! Persisted gallery of accepted results.

use crate::error::Result;
use crate::store::{KeyValueStore, GALLERY_KEY};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One accepted result, usually a `data:` URI.
pub type Artifact = String;

/// Newest-first, deduplicated list of accepted results.
///
/// Every mutation is a read-modify-write of the whole list. The async
/// mutex keeps concurrent mutations from losing each other's entries.
pub struct ResultStore {
    backend: Arc<dyn KeyValueStore>,
    artifacts: Mutex<Vec<Artifact>>,
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore").finish_non_exhaustive()
    }
}

impl ResultStore {
    /// Creates an empty gallery over `backend`. Call [`load`](Self::load) to read it.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            artifacts: Mutex::new(Vec::new()),
        }
    }

    /// Creates a gallery and loads whatever is persisted.
    pub async fn open(backend: Arc<dyn KeyValueStore>) -> Self {
        let store = Self::new(backend);
        store.load().await;
        store
    }

    /// Reloads the gallery. Missing, unreadable or malformed data yields an empty gallery.
    pub async fn load(&self) -> Vec<Artifact> {
        let mut artifacts = self.artifacts.lock().await;
        *artifacts = match self.backend.get(GALLERY_KEY).await {
            Ok(Some(raw)) => decode(&raw).unwrap_or_else(|e| {
                tracing::warn!("gallery data is malformed, starting empty: {e}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("failed to load gallery, starting empty: {e}");
                Vec::new()
            }
        };
        artifacts.clone()
    }

    /// Puts `artifact` at the front unless it is already in the gallery.
    ///
    /// An artifact that is already present is left where it is and nothing is written.
    pub async fn add(&self, artifact: impl Into<Artifact>) -> Result<Vec<Artifact>> {
        let artifact = artifact.into();
        let mut artifacts = self.artifacts.lock().await;
        if artifacts.contains(&artifact) {
            return Ok(artifacts.clone());
        }

        let mut updated = Vec::with_capacity(artifacts.len() + 1);
        updated.push(artifact);
        updated.extend(artifacts.iter().cloned());
        self.save(&updated).await?;
        *artifacts = updated;
        Ok(artifacts.clone())
    }

    /// Removes the artifact at `position`.
    ///
    /// An out-of-range position logs a warning and leaves the gallery unchanged.
    pub async fn remove_at(&self, position: usize) -> Result<Vec<Artifact>> {
        let mut artifacts = self.artifacts.lock().await;
        if position >= artifacts.len() {
            tracing::warn!(
                position,
                len = artifacts.len(),
                "ignoring removal of a gallery position that does not exist"
            );
            return Ok(artifacts.clone());
        }

        let mut updated = artifacts.clone();
        updated.remove(position);
        self.save(&updated).await?;
        *artifacts = updated;
        Ok(artifacts.clone())
    }

    /// Returns a copy of the gallery.
    pub async fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().await.clone()
    }

    /// Number of artifacts in the gallery.
    pub async fn len(&self) -> usize {
        self.artifacts.lock().await.len()
    }

    /// Returns true if the gallery is empty.
    pub async fn is_empty(&self) -> bool {
        self.artifacts.lock().await.is_empty()
    }

    async fn save(&self, artifacts: &[Artifact]) -> Result<()> {
        let raw = serde_json::to_string(artifacts)?;
        self.backend.set(GALLERY_KEY, &raw).await
    }
}

fn decode(raw: &str) -> std::result::Result<Vec<Artifact>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::MemoryStore;

    async fn gallery(raw: Option<&str>) -> (Arc<MemoryStore>, ResultStore) {
        let mut backend = MemoryStore::new();
        if let Some(raw) = raw {
            backend = backend.with_entry(GALLERY_KEY, raw);
        }
        let backend = Arc::new(backend);
        let store = ResultStore::open(backend.clone()).await;
        (backend, store)
    }

    #[test]
    fn test_decode_is_explicit() {
        assert_eq!(decode(r#"["a","b"]"#).unwrap(), vec!["a", "b"]);
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"a":1}"#).is_err());
        assert!(decode("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn test_load_degrades_to_empty() {
        for raw in [None, Some("{broken"), Some(r#"{"not":"a list"}"#), Some("")] {
            let (_, store) = gallery(raw).await;
            assert!(store.is_empty().await, "{raw:?}");
        }

        let (backend, store) = gallery(Some(r#"["a"]"#)).await;
        backend.set_available(false);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_prepends_and_persists() {
        let (backend, store) = gallery(None).await;
        store.add("first").await.unwrap();
        let images = store.add("second").await.unwrap();
        assert_eq!(images, vec!["second", "first"]);

        let reloaded = ResultStore::open(backend).await;
        assert_eq!(reloaded.artifacts().await, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (backend, store) = gallery(None).await;
        store.add("a").await.unwrap();
        store.add("b").await.unwrap();
        let writes = backend.writes();

        let images = store.add("a").await.unwrap();
        assert_eq!(images, vec!["b", "a"]);
        assert_eq!(backend.writes(), writes);

        let images = store.add("b").await.unwrap();
        assert_eq!(images, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_remove_at_persists() {
        let (backend, store) = gallery(Some(r#"["c","b","a"]"#)).await;
        let images = store.remove_at(1).await.unwrap();
        assert_eq!(images, vec!["c", "a"]);

        assert_eq!(store.load().await, vec!["c", "a"]);
        let reloaded = ResultStore::open(backend).await;
        assert_eq!(reloaded.artifacts().await, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_remove_out_of_range_is_noop() {
        let (backend, store) = gallery(Some(r#"["a","b"]"#)).await;
        let images = store.remove_at(2).await.unwrap();
        assert_eq!(images, vec!["a", "b"]);
        assert_eq!(backend.writes(), 0);
        assert_eq!(store.load().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_and_keeps_state() {
        let (backend, store) = gallery(Some(r#"["a"]"#)).await;
        backend.set_available(false);

        assert!(matches!(store.add("b").await, Err(Error::Persistence(_))));
        assert!(matches!(store.remove_at(0).await, Err(Error::Persistence(_))));
        assert_eq!(store.artifacts().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_concurrent_adds_keep_everything() {
        let (backend, store) = gallery(None).await;
        let store = Arc::new(store);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10 {
            let store = store.clone();
            tasks.spawn(async move { store.add(format!("img-{i}")).await });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        let reloaded = ResultStore::open(backend).await;
        assert_eq!(reloaded.len().await, 10);
    }
}
