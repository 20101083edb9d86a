#![warn(missing_docs)]
//! Lookbook - a fashion photo studio client for generative image APIs.
//!
//! Every remote call goes through a pool of API keys. A call starts at the
//! key after the last one that worked, tries each key at most once, and
//! reports every failure if none of them succeed. The pool and a gallery of
//! saved results persist across sessions.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use lookbook::{AspectRatio, GeminiGateway, InputImage, Studio, StudioConfig};
//!
//! #[tokio::main]
//! async fn main() -> lookbook::Result<()> {
//!     let config = StudioConfig::from_env()?;
//!     let studio = Studio::open(&config, Arc::new(GeminiGateway::default())).await;
//!     studio.credentials().persist("key-one\nkey-two").await?;
//!
//!     let photo = InputImage::from_path("model.jpg")?;
//!     let image = studio
//!         .change_background(&photo, "Neon-lit alley", AspectRatio::Story)
//!         .await?;
//!     studio.keep(&image).await?;
//!     image.save("neon.png")?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini`: Gemini (Google) gateway
//! - `cli`: Command-line interface

pub mod config;
pub mod credentials;
mod error;
pub mod failover;
pub mod gallery;
pub mod image;
pub mod store;
pub mod studio;

// Re-export error types at crate root
pub use error::{AttemptFailure, Error, Result};

pub use config::{StudioConfig, StudioConfigBuilder};
pub use credentials::{Credential, CredentialStore};
pub use failover::{FailoverExecutor, OverrideSource};
pub use gallery::{Artifact, ResultStore};
pub use image::{
    AspectRatio, EditRequest, GeneratedImage, GenerationGateway, GenerationMetadata, ImageFormat,
    InputImage, PartOrder, SuggestionRequest,
};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use studio::{FashionBrief, Studio};

#[cfg(feature = "gemini")]
pub use image::providers::{GeminiGateway, GeminiGatewayBuilder, GeminiModel};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::image::{AspectRatio, GeneratedImage, GenerationGateway, InputImage};
    pub use crate::studio::{FashionBrief, Studio};
    pub use crate::{CredentialStore, FailoverExecutor, ResultStore, StudioConfig};

    #[cfg(feature = "gemini")]
    pub use crate::image::providers::GeminiGateway;
}
