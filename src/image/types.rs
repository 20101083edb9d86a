//! Core types for image requests and results.

use crate::error::{Error, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Maps a MIME type back to a format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Aspect ratios offered for studio output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 4:5 portrait, the usual feed crop.
    #[default]
    #[serde(rename = "4:5")]
    Portrait,
    /// 3:4 portrait.
    #[serde(rename = "3:4")]
    StandardPortrait,
    /// 9:16 story format.
    #[serde(rename = "9:16")]
    Story,
    /// 1:1 square.
    #[serde(rename = "1:1")]
    Square,
    /// 16:9 landscape.
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    /// All supported ratios, in the order they are offered.
    pub const ALL: [AspectRatio; 5] = [
        Self::Portrait,
        Self::StandardPortrait,
        Self::Story,
        Self::Square,
        Self::Landscape,
    ];

    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "4:5",
            Self::StandardPortrait => "3:4",
            Self::Story => "9:16",
            Self::Square => "1:1",
            Self::Landscape => "16:9",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "unsupported aspect ratio '{s}', expected one of 4:5, 3:4, 9:16, 1:1, 16:9"
                ))
            })
    }
}

/// An image supplied by the user as input to a mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
}

impl InputImage {
    /// Wraps raw bytes, detecting the format from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| Error::Decode("unknown image format".into()))?;
        Ok(Self { data, format })
    }

    /// Reads an image file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Parses a `data:<mime>;base64,<payload>` URI, such as a gallery artifact.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| Error::Decode("not a data URL".into()))?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| Error::Decode("data URL is not base64 encoded".into()))?;

        let cleaned: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let data = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| Error::Decode(e.to_string()))?;

        let format = ImageFormat::from_mime_type(mime)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .ok_or_else(|| Error::Decode(format!("unsupported image type '{mime}'")))?;
        Ok(Self { data, format })
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Where the image goes relative to the instruction in the request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartOrder {
    /// Image first, then the instruction.
    #[default]
    ImageFirst,
    /// Instruction first, then the image.
    TextFirst,
}

/// A request to produce a new image from an input image and an instruction.
#[derive(Debug, Clone)]
pub struct EditRequest {
    /// Natural-language instruction for the model.
    pub instruction: String,
    /// The source image.
    pub image: InputImage,
    /// Aspect ratio hint for the output.
    pub aspect_ratio: Option<AspectRatio>,
    /// Payload part ordering.
    pub order: PartOrder,
}

impl EditRequest {
    /// Creates a request with the given instruction and source image.
    pub fn new(instruction: impl Into<String>, image: InputImage) -> Self {
        Self {
            instruction: instruction.into(),
            image,
            aspect_ratio: None,
            order: PartOrder::ImageFirst,
        }
    }

    /// Sets the aspect ratio hint.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    /// Sets the payload part ordering.
    pub fn with_order(mut self, order: PartOrder) -> Self {
        self.order = order;
        self
    }
}

/// A request for short text suggestions.
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    /// Natural-language instruction for the model.
    pub instruction: String,
    /// Optional image to analyse.
    pub image: Option<InputImage>,
}

impl SuggestionRequest {
    /// Creates a text-only suggestion request.
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            image: None,
        }
    }

    /// Attaches an image to analyse.
    pub fn with_image(mut self, image: InputImage) -> Self {
        self.image = Some(image);
        self
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
}

/// A generated image with its data and metadata.
#[derive(Debug, Clone)]
#[must_use = "generated image should be saved or added to the gallery"]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(data: Vec<u8>, format: ImageFormat, metadata: GenerationMetadata) -> Self {
        Self {
            data,
            format,
            metadata,
        }
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL, the form the gallery stores.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            self.to_base64()
        )
    }
}

impl From<GeneratedImage> for InputImage {
    fn from(image: GeneratedImage) -> Self {
        Self {
            data: image.data,
            format: image.format,
        }
    }
}
