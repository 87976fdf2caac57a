//! Interrupting a send from the terminal
//!
//! A `SendCancellation` is made for one send. When built with
//! [`SendCancellation::on_ctrl_c`] it listens for the first Ctrl-C and
//! cancels the send's token; the listener goes away with the value, so a
//! later send starts with a fresh one.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct SendCancellation {
    token: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl SendCancellation {
    /// Cancelled only through [`cancel`](Self::cancel)
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            listener: None,
        }
    }

    /// Also cancelled by the first Ctrl-C; must be called inside a runtime
    pub fn on_ctrl_c() -> Self {
        let token = CancellationToken::new();
        let watched = token.clone();
        let listener = tokio::spawn(async move {
            tokio::select! {
                _ = watched.cancelled() => {}
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        info!("Interrupted, cancelling send");
                        watched.cancel();
                    }
                    Err(e) => debug!("Ctrl-C listener unavailable: {}", e),
                },
            }
        });
        Self {
            token,
            listener: Some(listener),
        }
    }

    /// Token for [`crate::StreamingTransport::send_with_cancel`]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the send was interrupted rather than failing on its own
    pub fn was_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for SendCancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SendCancellation {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
