use std::time::Duration;
use thiserror::Error;

/// Failure to obtain a usable response from the Etherscan proxy API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("API error: {0}")]
    Api(String),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Timeouts, transport failures and rate limiting are worth another
    /// attempt; an API error or a garbled payload will come back the same way.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_) | FetchError::Transport(_) | FetchError::RateLimited(_)
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            FetchError::RateLimited(e.to_string())
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid hex in word {word}: {detail}")]
    InvalidHex { word: usize, detail: String },

    #[error("insufficient data: {0} hex chars, need at least 128")]
    InsufficientData(usize),
}

impl From<DecodeError> for FetchError {
    fn from(e: DecodeError) -> Self {
        FetchError::Malformed(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}
