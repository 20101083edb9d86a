//! The persisted API key pool and its sticky rotation pointer.

use crate::error::Result;
use crate::store::{KeyValueStore, API_KEYS_KEY};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An opaque API key.
///
/// `Debug` never prints the key itself.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Wraps a key, trimming surrounding whitespace. Returns `None` if nothing is left.
    pub fn new(key: impl AsRef<str>) -> Option<Self> {
        let key = key.as_ref().trim();
        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    /// Returns the raw key for placing in a request header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns a display form showing at most the first and last four characters.
    ///
    /// Keys of eight characters or fewer are fully starred out.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.masked())
    }
}

#[derive(Debug, Default)]
struct PoolState {
    keys: Vec<Credential>,
    sticky: usize,
}

/// Source of truth for the key pool and the sticky index.
///
/// The pool and the index live under one lock, so the index is always
/// in range for the pool it is read with.
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
    state: RwLock<PoolState>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("CredentialStore")
            .field("keys", &state.keys.len())
            .field("sticky", &state.sticky)
            .finish()
    }
}

impl CredentialStore {
    /// Creates an empty store over `backend`. Call [`load`](Self::load) to read persisted keys.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            state: RwLock::new(PoolState::default()),
        }
    }

    /// Creates a store and loads whatever is persisted.
    pub async fn open(backend: Arc<dyn KeyValueStore>) -> Self {
        let store = Self::new(backend);
        store.load().await;
        store
    }

    /// Reloads the pool from the backing store and resets the sticky index.
    ///
    /// Missing or unreadable data yields an empty pool.
    pub async fn load(&self) -> Vec<Credential> {
        let keys = match self.backend.get(API_KEYS_KEY).await {
            Ok(Some(raw)) => parse_pool(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("failed to load API keys, starting with none: {e}");
                Vec::new()
            }
        };

        tracing::debug!(count = keys.len(), "loaded API key pool");
        let mut state = self.write();
        state.keys = keys.clone();
        state.sticky = 0;
        keys
    }

    /// Writes `raw_text` verbatim, then reloads.
    ///
    /// On a storage failure the in-memory pool is left as it was.
    pub async fn persist(&self, raw_text: &str) -> Result<()> {
        self.backend.set(API_KEYS_KEY, raw_text).await?;
        self.load().await;
        Ok(())
    }

    /// Returns the position the next rotation starts at.
    pub fn current_index(&self) -> usize {
        self.read().sticky
    }

    /// Moves the sticky index. Out-of-range positions are ignored.
    pub fn advance_to(&self, index: usize) {
        let mut state = self.write();
        if index < state.keys.len() {
            state.sticky = index;
        }
    }

    /// Returns the pool joined with newlines, for editing.
    pub fn as_text(&self) -> String {
        self.read()
            .keys
            .iter()
            .map(Credential::expose)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns a copy of the pool.
    pub fn credentials(&self) -> Vec<Credential> {
        self.read().keys.clone()
    }

    /// Returns the pool together with the current sticky index, read atomically.
    pub fn snapshot(&self) -> (Vec<Credential>, usize) {
        let state = self.read();
        (state.keys.clone(), state.sticky)
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.read().keys.len()
    }

    /// Returns true if the pool holds no keys.
    pub fn is_empty(&self) -> bool {
        self.read().keys.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, PoolState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_pool(raw: &str) -> Vec<Credential> {
    raw.lines().filter_map(Credential::new).collect()
}
