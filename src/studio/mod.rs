//! The studio: one method per mode, each routed through key failover.
//!
//! Single-image modes make one dispatch. Multi-variation modes spawn one
//! independent dispatch per variation, at most `concurrency` at a time,
//! and succeed only if every variation does.

mod prompts;

use crate::config::StudioConfig;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::failover::{FailoverExecutor, OverrideSource};
use crate::gallery::{Artifact, ResultStore};
use crate::image::{
    AspectRatio, EditRequest, GeneratedImage, GenerationGateway, InputImage, PartOrder,
    SuggestionRequest,
};
use crate::store::{FileStore, KeyValueStore};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Maximum variations per request.
pub const MAX_VARIATIONS: usize = 6;

/// What the fashion mode should produce.
#[derive(Debug, Clone)]
pub struct FashionBrief {
    /// Clothing style, e.g. "High Fashion".
    pub fashion_type: String,
    /// Background description.
    pub background: String,
    /// Number of variations (1 to 6).
    pub variations: usize,
    /// Output aspect ratio.
    pub aspect_ratio: AspectRatio,
}

impl FashionBrief {
    /// Creates a brief for two 4:5 variations.
    pub fn new(fashion_type: impl Into<String>, background: impl Into<String>) -> Self {
        Self {
            fashion_type: fashion_type.into(),
            background: background.into(),
            variations: 2,
            aspect_ratio: AspectRatio::default(),
        }
    }

    /// Sets the number of variations.
    pub fn with_variations(mut self, variations: usize) -> Self {
        self.variations = variations;
        self
    }

    /// Sets the output aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }
}

/// Entry point for every studio mode.
#[derive(Clone)]
pub struct Studio {
    executor: FailoverExecutor,
    gateway: Arc<dyn GenerationGateway>,
    gallery: Arc<ResultStore>,
    concurrency: usize,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("executor", &self.executor)
            .field("gateway", &self.gateway.name())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Studio {
    /// Opens the studio with file storage under `config.data_dir`.
    pub async fn open(config: &StudioConfig, gateway: Arc<dyn GenerationGateway>) -> Self {
        let backend = Arc::new(FileStore::new(&config.data_dir));
        Self::open_with(backend, config, gateway).await
    }

    /// Opens the studio over any backing store.
    pub async fn open_with(
        backend: Arc<dyn KeyValueStore>,
        config: &StudioConfig,
        gateway: Arc<dyn GenerationGateway>,
    ) -> Self {
        let credentials = Arc::new(CredentialStore::open(backend.clone()).await);
        let gallery = Arc::new(ResultStore::open(backend).await);
        let override_source = config
            .override_env_var
            .clone()
            .map(OverrideSource::Env)
            .unwrap_or_default();
        let executor = FailoverExecutor::new(credentials)
            .with_override(override_source)
            .with_timeout(config.timeout);

        tracing::debug!(
            gateway = gateway.name(),
            data_dir = %config.data_dir.display(),
            "studio ready"
        );
        Self::new(executor, gateway, gallery).with_concurrency(config.concurrency)
    }

    /// Assembles a studio from its parts.
    pub fn new(
        executor: FailoverExecutor,
        gateway: Arc<dyn GenerationGateway>,
        gallery: Arc<ResultStore>,
    ) -> Self {
        Self {
            executor,
            gateway,
            gallery,
            concurrency: crate::config::DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many variations are generated at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The key pool.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        self.executor.credentials()
    }

    /// The saved-results gallery.
    pub fn gallery(&self) -> &Arc<ResultStore> {
        &self.gallery
    }

    /// The gateway every mode calls.
    pub fn gateway(&self) -> &Arc<dyn GenerationGateway> {
        &self.gateway
    }

    /// Restyles clothing and background, producing `brief.variations` images.
    pub async fn generate_fashion(
        &self,
        image: &InputImage,
        brief: &FashionBrief,
    ) -> Result<Vec<GeneratedImage>> {
        check_variations(brief.variations)?;
        let instruction =
            prompts::fashion(&brief.fashion_type, &brief.background, brief.aspect_ratio);
        let request =
            EditRequest::new(instruction, image.clone()).with_aspect_ratio(brief.aspect_ratio);
        self.run_variations(vec![request; brief.variations]).await
    }

    /// Replaces the background behind the subject.
    pub async fn change_background(
        &self,
        image: &InputImage,
        background: &str,
        ratio: AspectRatio,
    ) -> Result<GeneratedImage> {
        require_text("background", background)?;
        let request = EditRequest::new(prompts::background(background, ratio), image.clone())
            .with_aspect_ratio(ratio);
        self.run(request).await
    }

    /// Puts the subject in new poses, one distinct pose per variation.
    ///
    /// An empty `hint` lets the model choose the poses.
    pub async fn transfer_pose(
        &self,
        image: &InputImage,
        hint: &str,
        variations: usize,
        ratio: AspectRatio,
    ) -> Result<Vec<GeneratedImage>> {
        check_variations(variations)?;
        let requests = (1..=variations)
            .map(|n| {
                EditRequest::new(prompts::pose(hint, n, variations, ratio), image.clone())
                    .with_aspect_ratio(ratio)
                    .with_order(PartOrder::TextFirst)
            })
            .collect();
        self.run_variations(requests).await
    }

    /// Changes the subject's facial expression and nothing else.
    pub async fn change_expression(
        &self,
        image: &InputImage,
        expression: &str,
        ratio: AspectRatio,
    ) -> Result<GeneratedImage> {
        require_text("expression", expression)?;
        let request = EditRequest::new(prompts::expression(expression, ratio), image.clone())
            .with_aspect_ratio(ratio);
        self.run(request).await
    }

    /// Re-renders an image at higher resolution.
    pub async fn upscale(&self, image: &InputImage) -> Result<GeneratedImage> {
        self.run(EditRequest::new(prompts::UPSCALE, image.clone()))
            .await
    }

    /// Suggests backgrounds for a clothing style.
    pub async fn background_suggestions(&self, fashion_type: &str) -> Result<Vec<String>> {
        require_text("fashion type", fashion_type)?;
        self.suggest(SuggestionRequest::new(prompts::background_ideas(
            fashion_type,
        )))
        .await
    }

    /// Suggests backgrounds that suit the subject of `image`.
    pub async fn background_suggestions_for_image(
        &self,
        image: &InputImage,
    ) -> Result<Vec<String>> {
        self.suggest(
            SuggestionRequest::new(prompts::BACKGROUND_IDEAS_FROM_IMAGE).with_image(image.clone()),
        )
        .await
    }

    /// Suggests fashion poses.
    pub async fn pose_suggestions(&self) -> Result<Vec<String>> {
        self.suggest(SuggestionRequest::new(prompts::POSE_IDEAS))
            .await
    }

    /// Checks every pool key against the gateway, one at a time.
    ///
    /// The sticky index is not touched.
    pub async fn check_keys(&self) -> Vec<(usize, Result<()>)> {
        let mut report = Vec::new();
        for (index, key) in self.credentials().credentials().iter().enumerate() {
            report.push((index, self.gateway.health_check(key).await));
        }
        report
    }

    /// Saves a result to the gallery and returns the updated gallery.
    pub async fn keep(&self, image: &GeneratedImage) -> Result<Vec<Artifact>> {
        self.gallery.add(image.to_data_url()).await
    }

    async fn run(&self, request: EditRequest) -> Result<GeneratedImage> {
        dispatch_edit(&self.executor, self.gateway.as_ref(), &request).await
    }

    async fn suggest(&self, request: SuggestionRequest) -> Result<Vec<String>> {
        let gateway = self.gateway.as_ref();
        let request = &request;
        self.executor
            .dispatch(|key| async move { gateway.suggest(&key, request).await })
            .await
    }

    async fn run_variations(&self, requests: Vec<EditRequest>) -> Result<Vec<GeneratedImage>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(requests.len());

        for request in requests {
            let sem = Arc::clone(&semaphore);
            let executor = self.executor.clone();
            let gateway = Arc::clone(&self.gateway);
            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Task("semaphore closed".into()))?;
                dispatch_edit(&executor, gateway.as_ref(), &request).await
            }));
        }

        let total = handles.len();
        let mut images = Vec::with_capacity(total);
        let mut first_error = None;
        for (i, handle) in handles.into_iter().enumerate() {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(Error::Task(e.to_string())));
            match outcome {
                Ok(image) => images.push(image),
                Err(e) => {
                    tracing::warn!(variation = i + 1, total, "variation failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(images),
        }
    }
}

async fn dispatch_edit(
    executor: &FailoverExecutor,
    gateway: &dyn GenerationGateway,
    request: &EditRequest,
) -> Result<GeneratedImage> {
    executor
        .dispatch(|key| async move { gateway.generate(&key, request).await })
        .await
}

fn check_variations(variations: usize) -> Result<()> {
    if (1..=MAX_VARIATIONS).contains(&variations) {
        Ok(())
    } else {
        Err(Error::InvalidRequest(format!(
            "variations must be between 1 and {MAX_VARIATIONS}, got {variations}"
        )))
    }
}

fn require_text(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidRequest(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}
