//! Error types for the FIP tracker

/// Result type alias for FIP tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tracking a FIP channel
///
/// Only [`Error::UnknownChannel`] ever reaches the caller of
/// `ChannelTracker::set_active_channel`; everything else is recovered
/// inside a poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing failed
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// API returned an error status
    #[error("API error: {0}")]
    ApiError(String),

    /// The response is older than its own refresh horizon
    #[error("Stale response (next_refresh: {next_refresh:?}, now: {now})")]
    StaleResponse {
        next_refresh: Option<i64>,
        now: i64,
    },

    /// The payload is valid but carries no usable artist/title
    #[error("No extractable track in response")]
    NoExtractableTrack,

    /// Channel has no known upstream station id
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

impl Error {
    /// Create an API error
    pub fn api_error(msg: impl Into<String>) -> Self {
        Self::ApiError(msg.into())
    }
}
