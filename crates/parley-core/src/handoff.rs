//! Human handoff
//!
//! The authoritative status lives server-side. The coordinator only issues
//! the request/resolve calls and reads the status back; [`HandoffStatus::apply`]
//! is the state machine a UI can use to decide which actions to offer.
//!
//! ```text
//! none ──request──> requested ──accept──> active
//!   ^                   │                   │
//!   │                   └──────resolve──────┴──> resolved
//!   └─────────────── request (new cycle) ───────────┘
//! ```

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::ConsoleApi;
use crate::error::{HandoffError, TransportError};
use crate::models::HandoffStatus;

/// Something that moves a handoff forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffEvent {
    /// The end user asked for a human
    Requested,
    /// An operator took the conversation (operator side, not issued here)
    Accepted,
    Resolved,
}

impl HandoffEvent {
    fn action(&self) -> &'static str {
        match self {
            HandoffEvent::Requested => "request",
            HandoffEvent::Accepted => "accept",
            HandoffEvent::Resolved => "resolve",
        }
    }
}

impl HandoffStatus {
    /// Status after `event`, or why it is not allowed from here
    ///
    /// A resolved handoff may be requested again; that starts a new cycle.
    pub fn apply(self, event: HandoffEvent) -> Result<HandoffStatus, HandoffError> {
        let next = match (self, event) {
            (HandoffStatus::None | HandoffStatus::Resolved, HandoffEvent::Requested) => {
                Some(HandoffStatus::Requested)
            }
            (HandoffStatus::Requested, HandoffEvent::Accepted) => Some(HandoffStatus::Active),
            (HandoffStatus::Requested | HandoffStatus::Active, HandoffEvent::Resolved) => {
                Some(HandoffStatus::Resolved)
            }
            _ => None,
        };

        next.ok_or(HandoffError::InvalidTransition {
            from: self,
            action: event.action(),
        })
    }

    pub fn can_request(self) -> bool {
        self.apply(HandoffEvent::Requested).is_ok()
    }

    pub fn can_resolve(self) -> bool {
        self.apply(HandoffEvent::Resolved).is_ok()
    }
}

/// Issues handoff calls for existing conversations; holds no state
pub struct HandoffCoordinator {
    api: Arc<dyn ConsoleApi>,
}

impl HandoffCoordinator {
    pub fn new(api: Arc<dyn ConsoleApi>) -> Self {
        Self { api }
    }

    /// Ask for a human to take over (`none` or `resolved` to `requested`)
    pub async fn request_handoff(
        &self,
        conversation_id: &str,
        reason: Option<&str>,
    ) -> Result<(), TransportError> {
        info!(
            "Requesting handoff for conversation {} (reason: {:?})",
            conversation_id, reason
        );
        self.api
            .request_handoff(conversation_id, reason)
            .await
            .inspect_err(|e| warn!("Handoff request failed for {}: {}", conversation_id, e))
    }

    /// Close the handoff (`requested` or `active` to `resolved`)
    pub async fn resolve_handoff(&self, conversation_id: &str) -> Result<(), TransportError> {
        info!("Resolving handoff for conversation {}", conversation_id);
        self.api
            .resolve_handoff(conversation_id)
            .await
            .inspect_err(|e| warn!("Handoff resolve failed for {}: {}", conversation_id, e))
    }

    /// Current status, read back from the conversation projection
    pub async fn status(&self, conversation_id: &str) -> Result<HandoffStatus, TransportError> {
        let conversation = self.api.get_conversation(conversation_id).await?;
        Ok(conversation.handoff_status)
    }
}
