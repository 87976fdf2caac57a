//! Streaming message transport
//!
//! Sends one message and turns the partial-delivery response into an ordered
//! sequence of deltas. Each call owns its own buffer and id tracking, so
//! concurrent sends never share mutable state.

use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::ConsoleApi;
use crate::attachments::map_attachments;
use crate::config::{ConsoleConfig, ConversationCreation, ServiceContext};
use crate::error::TransportError;
use crate::identity::ConversationIdentityResolver;
use crate::models::{LocalAttachment, OutgoingMessage, SendOutcome};
use crate::stream::StreamProcessor;

pub struct StreamingTransport {
    api: Arc<dyn ConsoleApi>,
    resolver: ConversationIdentityResolver,
}

impl StreamingTransport {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        context: ServiceContext,
        creation: ConversationCreation,
    ) -> Self {
        let resolver = ConversationIdentityResolver::new(api.clone(), context, creation);
        Self { api, resolver }
    }

    pub fn from_config(api: Arc<dyn ConsoleApi>, config: &ConsoleConfig) -> Self {
        Self::new(api, config.service_context(), config.conversation_creation)
    }

    /// Send `message` and feed each delta to `on_delta` as it arrives
    ///
    /// `on_delta(delta, conversation_id)` is called synchronously, in arrival
    /// order, and never after this future completes. A failure after some
    /// deltas were delivered leaves them delivered: treat the message as
    /// incomplete, not absent.
    pub async fn send<F>(
        &self,
        conversation_id: Option<&str>,
        message: &str,
        attachments: &[LocalAttachment],
        on_delta: F,
    ) -> Result<SendOutcome, TransportError>
    where
        F: FnMut(&str, Option<&str>),
    {
        let never = CancellationToken::new();
        self.send_with_cancel(conversation_id, message, attachments, &never, on_delta)
            .await
    }

    /// [`send`](Self::send) that stops as soon as `cancel` fires
    ///
    /// On cancellation the response body is dropped, releasing the
    /// connection, and the call fails with [`TransportError::Cancelled`].
    /// Frames left in a chunk that was already read are not delivered.
    pub async fn send_with_cancel<F>(
        &self,
        conversation_id: Option<&str>,
        message: &str,
        attachments: &[LocalAttachment],
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> Result<SendOutcome, TransportError>
    where
        F: FnMut(&str, Option<&str>),
    {
        let identity = until_cancelled(cancel, self.resolver.resolve(conversation_id, message))
            .await??;

        let outgoing = OutgoingMessage {
            content: message.to_string(),
            attachments: map_attachments(attachments),
        };
        info!(
            "Sending message to conversation {:?} ({} chars, {} attachments)",
            identity.current(),
            outgoing.content.len(),
            outgoing.attachments.len()
        );

        let response = until_cancelled(
            cancel,
            self.api.open_message_stream(identity.current(), &outgoing),
        )
        .await??;

        if !response.status.is_success() {
            let status = response.status;
            let body = until_cancelled(cancel, response.text_lossy()).await?;
            warn!("Message send rejected: {} {}", status, body);
            return Err(TransportError::Rejected { status, body });
        }

        let Some(mut body) = response.body else {
            warn!("Message send returned no readable body");
            return Err(TransportError::StreamingUnsupported);
        };

        let mut processor = StreamProcessor::new(identity, cancel.clone());
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(
                        "Send cancelled mid-stream for conversation {:?}",
                        processor.conversation_id()
                    );
                    return Err(TransportError::Cancelled);
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => processor.process_chunk(&chunk, &mut on_delta)?,
                Some(Err(e)) => {
                    warn!("Stream read failed: {}", e);
                    return Err(TransportError::Stream(e));
                }
                None => break,
            }
        }

        processor.finish(&mut on_delta)
    }
}

/// Race `future` against `cancel`, cancellation first
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = T>,
) -> Result<T, TransportError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        output = future => Ok(output),
    }
}
