//! Error types for the conversation transport
//!
//! Every failure a send or handoff call can surface to its caller. Frame
//! parse failures are deliberately absent: they are recovered inside the
//! interpreter and never become errors.

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::HandoffStatus;

/// Failure of a create, send, read-back or handoff call
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    /// The response carried no readable body to stream from
    #[error("response has no readable body; streaming is not supported here")]
    StreamingUnsupported,

    /// The request could not be sent or its headers never arrived
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    /// The body failed while it was being read
    #[error("stream interrupted: {0}")]
    Stream(#[source] std::io::Error),

    /// A non-streaming response body was not the expected JSON
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The caller abandoned the call
    #[error("request cancelled")]
    Cancelled,

    /// The configured base URL cannot address this resource
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// HTTP status of a rejected request, if that is what this is
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

/// Illegal move in the handoff state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("cannot {action} a handoff whose status is {from}")]
    InvalidTransition {
        from: HandoffStatus,
        action: &'static str,
    },
}
