//! Conversation identity across a send
//!
//! A send may start without a conversation. The resolver either creates one
//! up front or, when creation is deferred, leaves the id unknown until the
//! server asserts it mid-stream. Either way a server-asserted id wins for the
//! rest of the call.

use std::sync::Arc;
use tracing::{debug, info};

use crate::api::ConsoleApi;
use crate::config::{ConversationCreation, ServiceContext};
use crate::error::TransportError;
use crate::models::NewConversation;

/// Characters of the first message used as the provisional title
const TITLE_CHARS: usize = 48;
const UNTITLED: &str = "New conversation";

/// Provisional title for a conversation started by `message`
pub fn provisional_title(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return UNTITLED.to_string();
    }
    trimmed.chars().take(TITLE_CHARS).collect()
}

pub struct ConversationIdentityResolver {
    api: Arc<dyn ConsoleApi>,
    context: ServiceContext,
    creation: ConversationCreation,
}

impl ConversationIdentityResolver {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        context: ServiceContext,
        creation: ConversationCreation,
    ) -> Self {
        Self {
            api,
            context,
            creation,
        }
    }

    /// Id a send should be addressed to
    ///
    /// A non-empty candidate is returned untouched with no network call.
    /// Otherwise exactly one create call is made (eager), or none and the id
    /// stays unknown (deferred). A failed create fails the send; there is no
    /// retry here.
    pub async fn resolve(
        &self,
        candidate: Option<&str>,
        message: &str,
    ) -> Result<ConversationIdentity, TransportError> {
        if let Some(id) = candidate.filter(|id| !id.is_empty()) {
            debug!("Using existing conversation {}", id);
            return Ok(ConversationIdentity::known(id));
        }

        if self.creation == ConversationCreation::Deferred {
            debug!("Conversation creation deferred to the server");
            return Ok(ConversationIdentity::pending());
        }

        let request = NewConversation {
            title: provisional_title(message),
            service_code: self.context.service_code.clone(),
            provider_id: self.context.provider_id.clone(),
            model: self.context.model.clone(),
        };
        let conversation = self.api.create_conversation(&request).await?;
        info!(
            "Conversation {} created with title {:?}",
            conversation.id, request.title
        );
        Ok(ConversationIdentity::known(&conversation.id))
    }
}

/// The id one send is currently attributed to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationIdentity {
    current: Option<String>,
}

impl ConversationIdentity {
    pub fn known(id: &str) -> Self {
        Self {
            current: Some(id.to_string()),
        }
    }

    /// Not created yet; the server will assign one
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Take over an id asserted by the server; returns whether it changed
    pub fn adopt(&mut self, id: &str) -> bool {
        if self.current.as_deref() == Some(id) {
            return false;
        }
        info!(
            "Server asserted conversation {} (was {:?})",
            id, self.current
        );
        self.current = Some(id.to_string());
        true
    }

    pub fn into_inner(self) -> Option<String> {
        self.current
    }
}
