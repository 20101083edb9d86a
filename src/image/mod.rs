//! Image requests, results and the generation gateway.

mod gateway;
pub mod providers;
mod types;

pub use gateway::GenerationGateway;
pub use types::{
    AspectRatio, EditRequest, GeneratedImage, GenerationMetadata, ImageFormat, InputImage,
    PartOrder, SuggestionRequest,
};
