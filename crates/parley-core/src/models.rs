//! Wire and domain types shared by the transport, resolver and coordinator
//!
//! Everything the server owns (conversations, messages) is a read-mostly
//! projection here. All JSON is camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Human handoff status of a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffStatus {
    #[default]
    None,
    Requested,
    Active,
    Resolved,
}

impl HandoffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStatus::None => "none",
            HandoffStatus::Requested => "requested",
            HandoffStatus::Active => "active",
            HandoffStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side projection of a server conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub service_code: Option<String>,
    pub provider_id: Option<String>,
    pub model: Option<String>,
    /// Older records carry `null` here; treat it as no handoff
    #[serde(deserialize_with = "null_as_default")]
    pub handoff_status: HandoffStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// An operator who took over after a handoff
    Human,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Human => "human",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored message as the server returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
    #[serde(default, alias = "inputTokens")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, alias = "outputTokens")]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Attachment metadata as the upload step left it
///
/// Different upload paths name the same fields differently; the mapper in
/// [`crate::attachments`] settles on one name per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalAttachment {
    pub file_id: Option<String>,
    pub url: String,
    pub key: Option<String>,
    pub storage_key: Option<String>,
    pub filename: Option<String>,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub size: Option<u64>,
    pub provider: Option<String>,
}

/// Attachment as sent alongside a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Body of the create-conversation call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub title: String,
    pub service_code: Option<String>,
    pub provider_id: Option<String>,
    pub model: Option<String>,
}

/// Body of the streaming send call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub content: String,
    /// Always present, possibly empty
    pub attachments: Vec<WireAttachment>,
}

/// One interpreted frame of the message stream. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    pub delta: String,
    pub conversation_id: Option<String>,
    pub done: bool,
    /// Opaque `debug.endpoints` value, for logging only
    pub debug: Option<Value>,
}

/// Result of a completed send
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOutcome {
    /// The id the server ended up with; `None` only when creation was
    /// deferred and the server never asserted one
    pub conversation_id: Option<String>,
    pub stats: StreamStats,
}

/// Counters gathered while draining one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes_received: usize,
    pub frames: usize,
    pub deltas: usize,
    pub done_seen: bool,
}
