use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body the proxy returns for errors it produces itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Input validation failures. These are fatal for a swap session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("unsupported chain id: {0}")]
    UnsupportedChain(u64),

    #[error("invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("query parameter `{0}` must be given at most once")]
    RepeatedParam(&'static str),

    #[error("unknown token {address} on chain {chain_id}")]
    UnknownToken { chain_id: u64, address: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("a taker address is required for a firm quote")]
    MissingTaker,
}

/// Failures while talking to the price/quote proxy. Never fatal for the form.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-OK status; `message` is the upstream body's `message` field when present.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("could not parse response: {0}")]
    Parse(String),

    #[error(transparent)]
    Invalid(#[from] SwapError),
}

impl ApiError {
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Timeout | Self::Network(_) | Self::Parse(_) | Self::Invalid(_) => None,
        }
    }

    /// Text shown inline under the form. Transport and decoding failures have none: they are
    /// logged and the form just shows no data.
    pub fn inline_text(&self) -> Option<String> {
        match self {
            Self::Upstream { .. } | Self::Invalid(_) => Some(self.to_string()),
            Self::Timeout | Self::Network(_) | Self::Parse(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
