//! Client-side error type

use thiserror::Error;

use crate::parse::ParseError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The caller's share of capacity is used up. Never retried.
    #[error("{0}")]
    QuotaExceeded(String),

    /// The gateway answered with a non-success status
    #[error("AI Engine Error: {status} - {body}")]
    Gateway { status: u16, body: String },

    /// The gateway could not be reached or its answer could not be read
    #[error("AI Engine request failed: {0}")]
    Transport(String),

    /// The gateway answered 200 but without any choice
    #[error("AI Engine returned no choices")]
    EmptyResponse,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ClientError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
