//! In-memory console API for driving the transport and coordinator

#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::StatusCode;

use parley_core::api::{ByteStream, ConsoleApi, StreamResponse};
use parley_core::models::{Conversation, Message, NewConversation, OutgoingMessage};
use parley_core::{HandoffStatus, TransportError};

/// A call the fake received, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(NewConversation),
    Get(String),
    ListMessages(String),
    Open {
        conversation_id: Option<String>,
        message: OutgoingMessage,
    },
    RequestHandoff {
        conversation_id: String,
        reason: Option<String>,
    },
    ResolveHandoff(String),
}

pub struct FakeApi {
    pub created_id: String,
    pub create_status: StatusCode,
    pub stream_status: StatusCode,
    pub handoff_status: StatusCode,
    pub conversation_status: HandoffStatus,
    body: Mutex<Option<ByteStream>>,
    /// Per-conversation bodies, taking precedence over `body`
    routes: Mutex<HashMap<String, ByteStream>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeApi {
    /// Streams each string as one chunk, then ends
    pub fn streaming(chunks: &[&str]) -> Self {
        let chunks: Vec<Result<Bytes, std::io::Error>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        Self::with_body(Some(futures::stream::iter(chunks).boxed()))
    }

    pub fn with_body(body: Option<ByteStream>) -> Self {
        Self {
            created_id: "created-1".to_string(),
            create_status: StatusCode::CREATED,
            stream_status: StatusCode::OK,
            handoff_status: StatusCode::OK,
            conversation_status: HandoffStatus::None,
            body: Mutex::new(body),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// One body per conversation id; each chunk is preceded by a yield so
    /// concurrent sends interleave
    pub fn routed(routes: &[(&str, &[&str])]) -> Self {
        let fake = Self::with_body(None);
        {
            let mut table = fake.routes.lock();
            for (id, chunks) in routes {
                let chunks: Vec<Bytes> =
                    chunks.iter().map(|c| Bytes::from(c.to_string())).collect();
                let body = futures::stream::iter(chunks)
                    .then(|chunk| async move {
                        tokio::task::yield_now().await;
                        Ok::<_, std::io::Error>(chunk)
                    })
                    .boxed();
                table.insert(id.to_string(), body);
            }
        }
        fake
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check(status: StatusCode, body: &str) -> Result<(), TransportError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                status,
                body: body.to_string(),
            })
        }
    }
}

#[async_trait]
impl ConsoleApi for FakeApi {
    async fn create_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, TransportError> {
        self.record(Call::Create(request.clone()));
        Self::check(self.create_status, "create failed")?;
        Ok(Conversation {
            id: self.created_id.clone(),
            title: request.title.clone(),
            ..Conversation::default()
        })
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Conversation, TransportError> {
        self.record(Call::Get(conversation_id.to_string()));
        Ok(Conversation {
            id: conversation_id.to_string(),
            handoff_status: self.conversation_status,
            ..Conversation::default()
        })
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, TransportError> {
        self.record(Call::ListMessages(conversation_id.to_string()));
        Ok(Vec::new())
    }

    async fn open_message_stream(
        &self,
        conversation_id: Option<&str>,
        message: &OutgoingMessage,
    ) -> Result<StreamResponse, TransportError> {
        self.record(Call::Open {
            conversation_id: conversation_id.map(str::to_string),
            message: message.clone(),
        });
        let routed = conversation_id.and_then(|id| self.routes.lock().remove(id));
        Ok(StreamResponse {
            status: self.stream_status,
            body: routed.or_else(|| self.body.lock().take()),
        })
    }

    async fn request_handoff(
        &self,
        conversation_id: &str,
        reason: Option<&str>,
    ) -> Result<(), TransportError> {
        self.record(Call::RequestHandoff {
            conversation_id: conversation_id.to_string(),
            reason: reason.map(str::to_string),
        });
        Self::check(self.handoff_status, "handoff unavailable")
    }

    async fn resolve_handoff(&self, conversation_id: &str) -> Result<(), TransportError> {
        self.record(Call::ResolveHandoff(conversation_id.to_string()));
        Self::check(self.handoff_status, "handoff unavailable")
    }
}

/// Collects `(delta, conversation_id)` pairs handed to the sink
#[derive(Default)]
pub struct Recorder {
    pub calls: Vec<(String, Option<String>)>,
}

impl Recorder {
    pub fn sink(&mut self) -> impl FnMut(&str, Option<&str>) + '_ {
        move |delta: &str, id: Option<&str>| {
            self.calls.push((delta.to_string(), id.map(str::to_string)))
        }
    }

    pub fn deltas(&self) -> Vec<&str> {
        self.calls.iter().map(|(d, _)| d.as_str()).collect()
    }
}
