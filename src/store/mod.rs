//! Durable string-valued key-value storage.
//!
//! Both the key pool and the gallery persist through [`KeyValueStore`]. Each
//! `set` replaces the whole value in one step, so readers never observe a
//! partially written entry.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;

/// Key holding the raw, newline-delimited API key text.
pub const API_KEYS_KEY: &str = "lookbook-api-keys";

/// Key holding the JSON-encoded array of gallery artifacts.
pub const GALLERY_KEY: &str = "lookbook-gallery-images";

/// A durable key-value store with string values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if nothing was stored.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the value stored under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
