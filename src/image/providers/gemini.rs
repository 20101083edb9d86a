//! Gemini (Google) generation gateway.

use crate::credentials::Credential;
use crate::error::{parse_retry_after, sanitize_error_message, Error, Result};
use crate::image::gateway::GenerationGateway;
use crate::image::types::{
    EditRequest, GeneratedImage, GenerationMetadata, ImageFormat, InputImage, PartOrder,
    SuggestionRequest,
};
use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for text suggestions.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-pro";

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "nano-banana-pro-preview",
        }
    }
}

impl std::str::FromStr for GeminiModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "gemini-2.5-flash-image" | "nano-banana" => Ok(Self::NanoBanana),
            "nano-banana-pro-preview" | "nano-banana-pro" => Ok(Self::NanoBananaPro),
            other => Err(Error::InvalidRequest(format!("unknown image model '{other}'"))),
        }
    }
}

/// Builder for [`GeminiGateway`].
#[derive(Debug, Clone)]
pub struct GeminiGatewayBuilder {
    image_model: GeminiModel,
    text_model: String,
    base_url: String,
    client: Option<reqwest::Client>,
}

impl Default for GeminiGatewayBuilder {
    fn default() -> Self {
        Self {
            image_model: GeminiModel::default(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: None,
        }
    }
}

impl GeminiGatewayBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model used for image output.
    pub fn image_model(mut self, model: GeminiModel) -> Self {
        self.image_model = model;
        self
    }

    /// Sets the model used for suggestions.
    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = model.into();
        self
    }

    /// Points the gateway at a different API host.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Uses a preconfigured HTTP client.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the gateway.
    pub fn build(self) -> GeminiGateway {
        GeminiGateway {
            client: self.client.unwrap_or_default(),
            image_model: self.image_model,
            text_model: self.text_model,
            base_url: self.base_url,
        }
    }
}

/// Gemini-backed [`GenerationGateway`].
#[derive(Debug, Clone)]
pub struct GeminiGateway {
    client: reqwest::Client,
    image_model: GeminiModel,
    text_model: String,
    base_url: String,
}

impl Default for GeminiGateway {
    fn default() -> Self {
        GeminiGatewayBuilder::new().build()
    }
}

impl GeminiGateway {
    /// Creates a new `GeminiGatewayBuilder`.
    pub fn builder() -> GeminiGatewayBuilder {
        GeminiGatewayBuilder::new()
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        model: &str,
        body: &GeminiRequest,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", credential.expose())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        Ok(response.json().await?)
    }

    async fn generate_impl(
        &self,
        credential: &Credential,
        request: &EditRequest,
    ) -> Result<GeneratedImage> {
        let start = Instant::now();
        let body = GeminiRequest::for_edit(request);
        let response: GeminiResponse = self
            .post(credential, self.image_model.as_str(), &body)
            .await?;

        let inline_data = first_candidate_parts(response)?
            .into_iter()
            .find_map(|p| p.inline_data)
            .ok_or_else(|| Error::UnexpectedResponse("No image data in Gemini response".into()))?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(&inline_data.data)
            .map_err(|e| Error::Decode(e.to_string()))?;

        let format = ImageFormat::from_mime_type(&inline_data.mime_type)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .unwrap_or_default();

        Ok(GeneratedImage::new(
            data,
            format,
            GenerationMetadata {
                model: Some(self.image_model.as_str().to_string()),
                duration_ms: Some(start.elapsed().as_millis() as u64),
            },
        ))
    }

    async fn suggest_impl(
        &self,
        credential: &Credential,
        request: &SuggestionRequest,
    ) -> Result<Vec<String>> {
        let body = GeminiRequest::for_suggestions(request);
        let response: GeminiResponse = self.post(credential, &self.text_model, &body).await?;

        let text: String = first_candidate_parts(response)?
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if text.trim().is_empty() {
            return Err(Error::UnexpectedResponse(
                "No text in Gemini suggestion response".into(),
            ));
        }

        let suggestions: Vec<String> = serde_json::from_str(text.trim()).map_err(|e| {
            Error::UnexpectedResponse(format!("suggestions are not a JSON string array: {e}"))
        })?;
        Ok(suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    async fn generate(
        &self,
        credential: &Credential,
        request: &EditRequest,
    ) -> Result<GeneratedImage> {
        self.generate_impl(credential, request).await
    }

    async fn suggest(
        &self,
        credential: &Credential,
        request: &SuggestionRequest,
    ) -> Result<Vec<String>> {
        self.suggest_impl(credential, request).await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self, credential: &Credential) -> Result<()> {
        let url = format!(
            "{}/v1beta/models/{}",
            self.base_url,
            self.image_model.as_str()
        );

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", credential.expose())
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(Error::Auth("Invalid API key".into())),
            404 => Err(Error::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            )),
            429 => Err(Error::RateLimited {
                retry_after: parse_retry_after(response.headers())
                    .map(std::time::Duration::from_secs),
            }),
            s if !(200..300).contains(&s) => Err(Error::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

/// Checks prompt feedback and finish reason, then returns the first candidate's parts.
fn first_candidate_parts(response: GeminiResponse) -> Result<Vec<GeminiPartResponse>> {
    // Blocked prompts come back as HTTP 200 with prompt feedback.
    if let Some(ref feedback) = response.prompt_feedback {
        if let Some(ref reason) = feedback.block_reason {
            let msg = feedback
                .block_reason_message
                .clone()
                .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
            return Err(Error::ContentBlocked(msg));
        }
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("No candidates in Gemini response".into()))?;

    if let Some(ref finish_reason) = candidate.finish_reason {
        match finish_reason.as_str() {
            "SAFETY"
            | "IMAGE_SAFETY"
            | "IMAGE_PROHIBITED_CONTENT"
            | "IMAGE_RECITATION"
            | "RECITATION"
            | "PROHIBITED_CONTENT"
            | "BLOCKLIST" => {
                return Err(Error::ContentBlocked(format!(
                    "Content blocked by Gemini safety filter: {}",
                    finish_reason
                )));
            }
            "IMAGE_OTHER" | "NO_IMAGE" => {
                return Err(Error::UnexpectedResponse(format!(
                    "Generation failed: {}. Try a different prompt.",
                    finish_reason
                )));
            }
            _ => {} // STOP, MAX_TOKENS, etc. are normal
        }
    }

    candidate
        .content
        .map(|c| c.parts)
        .ok_or_else(|| Error::UnexpectedResponse("No content in Gemini candidate".into()))
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> Error {
    let text = sanitize_error_message(text);
    if status == 402 {
        return Error::Billing(
            "Gemini billing issue: enable billing at https://aistudio.google.com".into(),
        );
    }
    if status == 404 {
        return Error::InvalidRequest("Model not found. Verify the model name is correct.".into());
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return Error::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return Error::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("api key not valid") || lower.contains("api_key_invalid") {
        return Error::Auth(text);
    }
    if lower.contains("safety")
        || lower.contains("blocked")
        || lower.contains("content_policy")
        || lower.contains("prohibited")
    {
        return Error::ContentBlocked(text);
    }
    Error::Api {
        status,
        message: text,
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

impl GeminiRequestPart {
    fn image(image: &InputImage) -> Self {
        Self::InlineData {
            inline_data: GeminiInlineData {
                mime_type: image.format.mime_type().to_string(),
                data: image.to_base64(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<GeminiImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    aspect_ratio: String,
}

impl GeminiRequest {
    fn for_edit(req: &EditRequest) -> Self {
        let image = GeminiRequestPart::image(&req.image);
        let text = GeminiRequestPart::Text {
            text: req.instruction.clone(),
        };
        let parts = match req.order {
            PartOrder::ImageFirst => vec![image, text],
            PartOrder::TextFirst => vec![text, image],
        };

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                image_config: req.aspect_ratio.map(|r| GeminiImageConfig {
                    aspect_ratio: r.as_str().to_string(),
                }),
                ..Default::default()
            },
        }
    }

    fn for_suggestions(req: &SuggestionRequest) -> Self {
        let mut parts = vec![GeminiRequestPart::Text {
            text: req.instruction.clone(),
        }];
        if let Some(ref image) = req.image {
            parts.push(GeminiRequestPart::image(image));
        }

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(serde_json::json!({
                    "type": "ARRAY",
                    "items": { "type": "STRING" }
                })),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::AspectRatio;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn key(k: &str) -> Credential {
        Credential::new(k).unwrap()
    }

    fn input() -> InputImage {
        InputImage::from_bytes(PNG.to_vec()).unwrap()
    }

    fn image_response() -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": {
                            "mimeType": "image/png",
                            "data": base64::engine::general_purpose::STANDARD.encode(PNG)
                        } }
                    ]
                },
                "finishReason": "STOP"
            }]
        })
    }

    fn gateway(server: &MockServer) -> GeminiGateway {
        GeminiGateway::builder().base_url(server.uri()).build()
    }

    #[test]
    fn test_gemini_model_as_str() {
        assert_eq!(GeminiModel::NanoBanana.as_str(), "gemini-2.5-flash-image");
        assert_eq!(
            GeminiModel::NanoBananaPro.as_str(),
            "nano-banana-pro-preview"
        );
        assert_eq!(GeminiModel::default(), GeminiModel::NanoBanana);
        assert_eq!(
            "nano-banana-pro".parse::<GeminiModel>().unwrap(),
            GeminiModel::NanoBananaPro
        );
    }

    #[test]
    fn test_edit_request_part_order() {
        let req = EditRequest::new("Change the background", input());
        let json = serde_json::to_value(GeminiRequest::for_edit(&req)).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert!(parts[0].get("inline_data").is_some());
        assert_eq!(parts[1]["text"], "Change the background");

        let req = req.with_order(PartOrder::TextFirst);
        let json = serde_json::to_value(GeminiRequest::for_edit(&req)).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Change the background");
        assert_eq!(parts[1]["inline_data"]["mimeType"], "image/png");
    }

    #[test]
    fn test_edit_request_config() {
        let req = EditRequest::new("x", input()).with_aspect_ratio(AspectRatio::Story);
        let json = serde_json::to_value(GeminiRequest::for_edit(&req)).unwrap();
        let config = &json["generationConfig"];
        assert_eq!(config["responseModalities"], json!(["IMAGE"]));
        assert_eq!(config["imageConfig"]["aspectRatio"], "9:16");
        assert!(config.get("responseMimeType").is_none());
    }

    #[test]
    fn test_suggestion_request_config() {
        let req = SuggestionRequest::new("ideas").with_image(input());
        let json = serde_json::to_value(GeminiRequest::for_suggestions(&req)).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "ideas");
        assert!(json["contents"][0]["parts"][1].get("inline_data").is_some());
        let config = &json["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["type"], "ARRAY");
        assert!(config.get("responseModalities").is_none());
    }

    #[test]
    fn test_parse_error_mapping() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(matches!(parse_error(401, "no", &headers), Error::Auth(_)));
        assert!(matches!(parse_error(402, "", &headers), Error::Billing(_)));
        assert!(matches!(
            parse_error(404, "", &headers),
            Error::InvalidRequest(_)
        ));
        assert!(matches!(
            parse_error(429, "", &headers),
            Error::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            parse_error(400, r#"{"reason":"API_KEY_INVALID"}"#, &headers),
            Error::Auth(_)
        ));
        assert!(matches!(
            parse_error(400, "request blocked by safety", &headers),
            Error::ContentBlocked(_)
        ));
        assert!(matches!(
            parse_error(500, "boom", &headers),
            Error::Api { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_generate_sends_key_and_decodes_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-image:generateContent"))
            .and(header("x-goog-api-key", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_response()))
            .expect(1)
            .mount(&server)
            .await;

        let image = gateway(&server)
            .generate(&key("k1"), &EditRequest::new("Upscale", input()))
            .await
            .unwrap();
        assert_eq!(image.data, PNG.to_vec());
        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(
            image.metadata.model.as_deref(),
            Some("gemini-2.5-flash-image")
        );
    }

    #[tokio::test]
    async fn test_generate_maps_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .generate(&key("k1"), &EditRequest::new("x", input()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RateLimited {
                retry_after: Some(d)
            } if d.as_secs() == 30
        ));
    }

    #[tokio::test]
    async fn test_generate_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [],
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .generate(&key("k1"), &EditRequest::new("x", input()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContentBlocked(ref m) if m.contains("SAFETY")));
    }

    #[tokio::test]
    async fn test_generate_without_image_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "sorry" }] } }]
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .generate(&key("k1"), &EditRequest::new("x", input()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_suggest_parses_json_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{
                        "text": "\n[\"Cosmic nebula\", \" Gothic library \", \"\"]\n"
                    }] }
                }]
            })))
            .mount(&server)
            .await;

        let ideas = gateway(&server)
            .suggest(&key("k1"), &SuggestionRequest::new("ideas"))
            .await
            .unwrap();
        assert_eq!(ideas, vec!["Cosmic nebula", "Gothic library"]);
    }

    #[tokio::test]
    async fn test_suggest_rejects_non_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "{\"a\": 1}" }] } }]
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .suggest(&key("k1"), &SuggestionRequest::new("ideas"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_health_check_rejects_bad_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models/gemini-2.5-flash-image"))
            .and(header("x-goog-api-key", "good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("x-goog-api-key", "bad"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        assert!(gw.health_check(&key("good")).await.is_ok());
        assert!(matches!(
            gw.health_check(&key("bad")).await,
            Err(Error::Auth(_))
        ));
    }
}
