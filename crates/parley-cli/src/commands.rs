//! Subcommand handlers

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use parley_core::auth::{FileTokenStore, LayeredTokenStore, MemoryTokenStore, TokenStore};
use parley_core::{
    ConsoleApi, ConsoleConfig, ConversationCreation, HandoffCoordinator, HttpConsoleApi,
    LocalAttachment, SendCancellation, StreamingTransport,
};

/// Config plus the token layers every command shares
pub struct Session {
    config: ConsoleConfig,
    tokens: Arc<dyn TokenStore>,
}

impl Session {
    pub fn new(config: ConsoleConfig) -> Self {
        let tokens = LayeredTokenStore::new(vec![
            Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>,
            Arc::new(FileTokenStore::new(config.token_path.clone())),
        ]);
        Self {
            config,
            tokens: Arc::new(tokens),
        }
    }

    fn api(&self) -> Result<Arc<HttpConsoleApi>> {
        let api = HttpConsoleApi::new(&self.config)
            .with_context(|| format!("Invalid base URL: {}", self.config.base_url))?
            .with_token_store(self.tokens.clone());
        Ok(Arc::new(api))
    }

    pub async fn send(
        &self,
        conversation_id: Option<&str>,
        message: &str,
        attachment_files: &[PathBuf],
        deferred: bool,
    ) -> Result<()> {
        let attachments = load_attachments(attachment_files)?;
        let mut config = self.config.clone();
        if deferred {
            config.conversation_creation = ConversationCreation::Deferred;
        }
        let transport = StreamingTransport::from_config(self.api()?, &config);

        let cancellation = SendCancellation::on_ctrl_c();

        let mut stdout = std::io::stdout();
        let result = transport
            .send_with_cancel(
                conversation_id,
                message,
                &attachments,
                cancellation.token(),
                |delta, _| {
                    // A closed stdout must not abort the stream
                    let _ = stdout.write_all(delta.as_bytes());
                    let _ = stdout.flush();
                },
            )
            .await;
        println!();

        match result {
            Ok(outcome) => {
                debug!(
                    "Stream finished: {} bytes, {} frames, {} deltas",
                    outcome.stats.bytes_received, outcome.stats.frames, outcome.stats.deltas
                );
                match outcome.conversation_id {
                    Some(id) => eprintln!("conversation: {id}"),
                    None => eprintln!("conversation: (not assigned)"),
                }
                Ok(())
            }
            Err(e) if cancellation.was_interrupted() => {
                eprintln!("cancelled");
                Err(e.into())
            }
            Err(e) => Err(e).context("Message was not fully delivered"),
        }
    }

    pub async fn history(&self, conversation_id: &str) -> Result<()> {
        let messages = self.api()?.list_messages(conversation_id).await?;
        for message in messages {
            match message.created_at {
                Some(at) => println!(
                    "[{}] {}: {}",
                    at.format("%Y-%m-%d %H:%M"),
                    message.role,
                    message.content
                ),
                None => println!("{}: {}", message.role, message.content),
            }
        }
        Ok(())
    }

    pub async fn request_handoff(
        &self,
        conversation_id: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        HandoffCoordinator::new(self.api()?)
            .request_handoff(conversation_id, reason)
            .await?;
        println!("handoff requested for {conversation_id}");
        Ok(())
    }

    pub async fn resolve_handoff(&self, conversation_id: &str) -> Result<()> {
        HandoffCoordinator::new(self.api()?)
            .resolve_handoff(conversation_id)
            .await?;
        println!("handoff resolved for {conversation_id}");
        Ok(())
    }

    pub async fn handoff_status(&self, conversation_id: &str) -> Result<()> {
        let status = HandoffCoordinator::new(self.api()?)
            .status(conversation_id)
            .await?;
        println!("{status}");
        Ok(())
    }

    pub async fn login(&self, token: &str) -> Result<()> {
        self.tokens.set(token.trim()).await?;
        info!("Stored session token at {:?}", self.config.token_path);
        println!("logged in");
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        self.tokens.clear().await?;
        println!("logged out");
        Ok(())
    }
}

fn load_attachments(paths: &[PathBuf]) -> Result<Vec<LocalAttachment>> {
    let mut attachments = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read attachment file: {path:?}"))?;
        let parsed = parse_attachments(&content)
            .with_context(|| format!("Failed to parse attachment file: {path:?}"))?;
        attachments.extend(parsed);
    }
    Ok(attachments)
}

/// One record or an array of records
fn parse_attachments(content: &str) -> Result<Vec<LocalAttachment>> {
    let value: Value = serde_json::from_str(content)?;
    let records = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<LocalAttachment>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(records)
}
