//! Parley core
//!
//! Client side of a streaming conversation service: sends a message, consumes
//! the token-by-token response as ordered deltas, keeps track of which
//! conversation the stream belongs to, and drives the human handoff calls.

pub mod api;
pub mod attachments;
pub mod auth;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod handoff;
pub mod identity;
pub mod models;
pub mod stream;
pub mod transport;

pub use api::{ByteStream, ConsoleApi, HttpConsoleApi, StreamResponse};
pub use attachments::map_attachments;
pub use cancellation::SendCancellation;
pub use config::{ConsoleConfig, ConversationCreation, ServiceContext};
pub use error::{HandoffError, TransportError};
pub use handoff::{HandoffCoordinator, HandoffEvent};
pub use identity::{ConversationIdentity, ConversationIdentityResolver};
pub use models::{
    Conversation, HandoffStatus, LocalAttachment, Message, Role, SendOutcome, StreamEvent,
    StreamStats, WireAttachment,
};
pub use transport::StreamingTransport;
