//! Console API calls consumed by the transport and handoff coordinator
//!
//! [`ConsoleApi`] is the seam between the conversation logic and HTTP;
//! [`HttpConsoleApi`] is the reqwest implementation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::TokenStore;
use crate::config::ConsoleConfig;
use crate::error::TransportError;
use crate::models::{Conversation, Message, NewConversation, OutgoingMessage};

/// Response body as it arrives, one chunk at a time
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Headers-received state of a streaming send
pub struct StreamResponse {
    pub status: StatusCode,
    /// `None` when the environment offers no readable body
    pub body: Option<ByteStream>,
}

impl StreamResponse {
    /// Read whatever the body holds as text, ignoring read failures
    pub async fn text_lossy(self) -> String {
        let Some(mut body) = self.body else {
            return String::new();
        };
        let mut bytes = Vec::new();
        while let Some(Ok(chunk)) = body.next().await {
            bytes.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn create_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, TransportError>;

    async fn get_conversation(&self, conversation_id: &str)
        -> Result<Conversation, TransportError>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, TransportError>;

    /// Start a streaming send; `None` lets the server assign the conversation
    async fn open_message_stream(
        &self,
        conversation_id: Option<&str>,
        message: &OutgoingMessage,
    ) -> Result<StreamResponse, TransportError>;

    async fn request_handoff(
        &self,
        conversation_id: &str,
        reason: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn resolve_handoff(&self, conversation_id: &str) -> Result<(), TransportError>;
}

#[derive(Serialize)]
struct HandoffRequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// reqwest-backed console API
pub struct HttpConsoleApi {
    client: Client,
    base_url: Url,
    tokens: Option<Arc<dyn TokenStore>>,
}

impl HttpConsoleApi {
    pub fn new(config: &ConsoleConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, TransportError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }
        // Joining relative paths onto ".../api" would drop the "api" segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            tokens: None,
        })
    }

    /// Attach a bearer token from `tokens` to every request
    pub fn with_token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Resolve a resource path; each segment is percent-encoded on its own
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.tokens {
            Some(tokens) => match tokens.get().await {
                Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
                None => request,
            },
            None => request,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<T, TransportError> {
        debug!("GET {}", url);
        let request = self.authorized(self.client.get(url)).await;
        let response = request.header(ACCEPT, "application/json").send().await?;
        let response = reject_unless_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response, TransportError> {
        debug!("POST {}", url);
        let mut request = self.authorized(self.client.post(url)).await;
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

/// Turn a non-success response into [`TransportError::Rejected`]
async fn reject_unless_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Console API rejected request: {} {}", status, body);
    Err(TransportError::Rejected { status, body })
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn create_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, TransportError> {
        let url = self.endpoint(&["conversations"])?;
        let response = self.post(url, Some(request)).await?;
        let response = reject_unless_success(response).await?;
        let bytes = response.bytes().await?;
        let conversation: Conversation = serde_json::from_slice(&bytes)?;
        info!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Conversation, TransportError> {
        self.get_json(self.endpoint(&["conversations", conversation_id])?)
            .await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, TransportError> {
        self.get_json(self.endpoint(&["conversations", conversation_id, "messages"])?)
            .await
    }

    async fn open_message_stream(
        &self,
        conversation_id: Option<&str>,
        message: &OutgoingMessage,
    ) -> Result<StreamResponse, TransportError> {
        let url = match conversation_id {
            Some(id) => self.endpoint(&["conversations", id, "messages", "stream"])?,
            None => self.endpoint(&["messages", "stream"])?,
        };
        debug!("POST {} (streaming)", url);

        let request = self.authorized(self.client.post(url)).await;
        let response = request
            .header(ACCEPT, "text/event-stream")
            .json(message)
            .send()
            .await?;

        let status = response.status();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed();

        Ok(StreamResponse {
            status,
            body: Some(body),
        })
    }

    async fn request_handoff(
        &self,
        conversation_id: &str,
        reason: Option<&str>,
    ) -> Result<(), TransportError> {
        let url = self.endpoint(&["conversations", conversation_id, "handoff", "request"])?;
        let response = self.post(url, Some(&HandoffRequestBody { reason })).await?;
        reject_unless_success(response).await?;
        Ok(())
    }

    async fn resolve_handoff(&self, conversation_id: &str) -> Result<(), TransportError> {
        let url = self.endpoint(&["conversations", conversation_id, "handoff", "resolve"])?;
        let response = self.post::<()>(url, None).await?;
        reject_unless_success(response).await?;
        Ok(())
    }
}
