//! Telegram client using teloxide.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile};
use teloxide::{ApiError, RequestError};
use tracing::{info, warn};

/// Failure to deliver a message to the chat.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The bot is not allowed to post in this chat.
    #[error("missing permission: {0}")]
    Forbidden(String),
    #[error("send failed: {0}")]
    Failed(String),
}

impl From<RequestError> for SendError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Api(
                ApiError::BotBlocked | ApiError::BotKicked | ApiError::NotEnoughRightsToPostMessages,
            ) => SendError::Forbidden(e.to_string()),
            other => SendError::Failed(other.to_string()),
        }
    }
}

/// Outbound side of the chat.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Send one text chunk, followed by `attachments`. `text` may be empty
    /// when only attachments are delivered.
    async fn send(&self, chat_id: i64, text: &str, attachments: &[PathBuf]) -> Result<(), SendError>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Download a document by file_id.
    pub async fn download_document(&self, file_id: &str) -> Result<Vec<u8>, String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| format!("Failed to get file info: {e}"))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| format!("Failed to download file: {e}"))?;

        info!("📥 Downloaded document ({} bytes)", data.len());
        Ok(data)
    }

    async fn send_file(&self, chat_id: ChatId, path: &Path) -> Result<(), RequestError> {
        let input = InputFile::file(path);
        match path.extension().and_then(|e| e.to_str()) {
            Some("jpg") => self.bot.send_photo(chat_id, input).await.map(|_| ()),
            Some("mp3") => self.bot.send_audio(chat_id, input).await.map(|_| ()),
            _ => self.bot.send_document(chat_id, input).await.map(|_| ()),
        }
    }
}

#[async_trait]
impl ChatSink for TelegramClient {
    async fn send(&self, chat_id: i64, text: &str, attachments: &[PathBuf]) -> Result<(), SendError> {
        let chat = ChatId(chat_id);
        if !text.is_empty() {
            self.bot.send_message(chat, text).await?;
        }
        for path in attachments {
            info!("📎 Sending {} to chat {}", path.display(), chat_id);
            if let Err(e) = self.send_file(chat, path).await {
                warn!("Failed to send {}: {e}", path.display());
                return Err(e.into());
            }
        }
        Ok(())
    }
}
