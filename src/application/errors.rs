// Error types for widget data acquisition
use crate::domain::normalizer::NormalizeError;
use thiserror::Error;

/// Longest body excerpt carried by [`FetchError::HttpStatus`].
pub const BODY_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid JSON response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FetchError {
    pub fn http_status(status: u16, body: &str) -> Self {
        FetchError::HttpStatus {
            status,
            body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WidgetDataError {
    #[error("no API endpoint configured")]
    UnconfiguredEndpoint,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("widget not found: {0}")]
    UnknownWidget(String),
}
