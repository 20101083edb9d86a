//! The boundary to the remote generation service.

use crate::credentials::Credential;
use crate::error::Result;
use crate::image::types::{EditRequest, GeneratedImage, SuggestionRequest};
use async_trait::async_trait;

/// A remote service that turns requests into images or suggestions.
///
/// Every call takes the key to authenticate with, so one gateway instance
/// serves every key in the pool.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Produces a new image from the request's source image and instruction.
    async fn generate(&self, credential: &Credential, request: &EditRequest)
        -> Result<GeneratedImage>;

    /// Returns short natural-language suggestions, in the order the service ranked them.
    async fn suggest(
        &self,
        credential: &Credential,
        request: &SuggestionRequest,
    ) -> Result<Vec<String>>;

    /// Returns the name of this gateway for display.
    fn name(&self) -> &str;

    /// Checks that `credential` is accepted by the service.
    async fn health_check(&self, credential: &Credential) -> Result<()>;
}
