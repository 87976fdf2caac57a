//! Per-call stream state: framing, interpretation, id tracking, delivery

use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::decoder::EventFrameDecoder;
use super::interpret::interpret;
use crate::error::TransportError;
use crate::identity::ConversationIdentity;
use crate::models::{SendOutcome, StreamStats};

/// Drains one message stream into a delta sink
///
/// Deltas reach the sink synchronously, in arrival order, each tagged with
/// the conversation id current at that point. An id asserted by a frame
/// applies to that frame's own delta and everything after it. Once `cancel`
/// fires no further delta is delivered, even from a chunk already read.
pub struct StreamProcessor {
    decoder: EventFrameDecoder,
    identity: ConversationIdentity,
    cancel: CancellationToken,
    stats: StreamStats,
    /// When the stream started
    stream_start: Instant,
}

impl StreamProcessor {
    pub fn new(identity: ConversationIdentity, cancel: CancellationToken) -> Self {
        info!(
            "Stream processor created for conversation {:?}",
            identity.current()
        );
        Self {
            decoder: EventFrameDecoder::new(),
            identity,
            cancel,
            stats: StreamStats::default(),
            stream_start: Instant::now(),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.identity.current()
    }

    /// Process a chunk of bytes from the response body
    pub fn process_chunk<F>(
        &mut self,
        bytes: &[u8],
        on_delta: &mut F,
    ) -> Result<(), TransportError>
    where
        F: FnMut(&str, Option<&str>),
    {
        self.stats.bytes_received += bytes.len();
        let frames = self.decoder.push(bytes);
        debug!(
            "Stream chunk received: {} bytes (total: {} bytes, {} buffered)",
            bytes.len(),
            self.stats.bytes_received,
            self.decoder.buffered_len()
        );

        for frame in frames {
            self.process_frame(&frame, on_delta)?;
        }
        Ok(())
    }

    /// End of stream: flush the unterminated remainder, then report
    pub fn finish<F>(mut self, on_delta: &mut F) -> Result<SendOutcome, TransportError>
    where
        F: FnMut(&str, Option<&str>),
    {
        let decoder = std::mem::take(&mut self.decoder);
        for frame in decoder.finish() {
            self.process_frame(&frame, on_delta)?;
        }

        info!(
            "Stream finished: {:?} elapsed, {} frames, {} deltas, {} bytes",
            self.stream_start.elapsed(),
            self.stats.frames,
            self.stats.deltas,
            self.stats.bytes_received
        );

        Ok(SendOutcome {
            conversation_id: self.identity.into_inner(),
            stats: self.stats,
        })
    }

    fn process_frame<F>(
        &mut self,
        frame: &str,
        on_delta: &mut F,
    ) -> Result<(), TransportError>
    where
        F: FnMut(&str, Option<&str>),
    {
        if self.cancel.is_cancelled() {
            info!(
                "Send cancelled after {} deltas, dropping the rest of the chunk",
                self.stats.deltas
            );
            return Err(TransportError::Cancelled);
        }

        self.stats.frames += 1;
        let event = interpret(frame);
        debug!(
            "Frame #{} at {:?}: {} chars",
            self.stats.frames,
            self.stream_start.elapsed(),
            event.delta.len()
        );

        if let Some(endpoints) = &event.debug {
            debug!("  -> upstream endpoints: {}", endpoints);
        }
        if let Some(id) = &event.conversation_id {
            self.identity.adopt(id);
        }
        if event.done {
            info!("Stream signalled done after {} frames", self.stats.frames);
            self.stats.done_seen = true;
        }
        if !event.delta.is_empty() {
            self.stats.deltas += 1;
            on_delta(&event.delta, self.identity.current());
        }
        Ok(())
    }
}
