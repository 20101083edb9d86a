//! Error types for the studio client.

use std::fmt;
use std::time::Duration;

/// Errors that can occur while driving the generation service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing store could not be read or written.
    #[error("storage unavailable: {0}")]
    Persistence(String),

    /// A dispatch was attempted with an empty pool and no override key.
    #[error(
        "no API key configured: add a key in the settings or set the API_KEY environment variable"
    )]
    NoCredentials,

    /// Every key in the pool was tried once and none succeeded.
    #[error("{}", exhausted_message(.attempts, .failures))]
    AllCredentialsExhausted {
        /// Number of attempts made (one per pool entry).
        attempts: usize,
        /// Every per-key failure, in the order the keys were tried.
        failures: Vec<AttemptFailure>,
    },

    /// The override key from the environment failed; there is no fallback.
    #[error("the API key supplied through the environment is invalid or expired: {0}")]
    OverrideCredential(#[source] Box<Error>),

    /// API key missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// A single remote call did not finish within the configured bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The response parsed but did not contain what was asked for.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Billing is not enabled for the key's project.
    #[error("billing error: {0}")]
    Billing(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., reading an input image).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A spawned generation task panicked or was aborted.
    #[error("generation task failed: {0}")]
    Task(String),
}

/// One failed attempt inside a pool rotation.
#[derive(Debug)]
pub struct AttemptFailure {
    /// Pool position of the key that was tried.
    pub index: usize,
    /// Why the attempt failed.
    pub error: Error,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key #{}: {}", self.index + 1, self.error)
    }
}

fn exhausted_message(attempts: &usize, failures: &[AttemptFailure]) -> String {
    let mut msg = format!(
        "all {attempts} API keys failed (each was tried once); check them in the settings"
    );
    for failure in failures {
        msg.push_str(&format!("\n  {failure}"));
    }
    msg
}

/// Result type alias for studio operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Upper bound on how much of an error body ends up in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Parses a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Strips key material from an upstream error body and bounds its length.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let mut out = String::with_capacity(text.len().min(MAX_ERROR_BODY));
    let mut rest = text;
    while let Some(pos) = rest.find("key=") {
        out.push_str(&rest[..pos + 4]);
        out.push_str("[REDACTED]");
        let tail = &rest[pos + 4..];
        let end = tail
            .find(|c: char| c == '&' || c == '"' || c.is_whitespace())
            .unwrap_or(tail.len());
        rest = &tail[end..];
    }
    out.push_str(rest);

    let out = out.trim();
    if out.chars().count() > MAX_ERROR_BODY {
        let truncated: String = out.chars().take(MAX_ERROR_BODY).collect();
        format!("{truncated}...")
    } else {
        out.to_string()
    }
}
