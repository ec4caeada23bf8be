use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use teloxide::types::ChatId;

use crate::chatbot::GenerationSettings;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    #[error("failed to parse config file '{}': {source}", .path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Chats the bot answers in. Empty means every chat.
    #[serde(default)]
    allowed_chats: Vec<i64>,
    /// Falls back to the OPENAI_API_KEY environment variable.
    #[serde(default)]
    openai_api_key: String,
    openai_organization: Option<String>,
    system_prompt: String,
    #[serde(default = "default_history_length")]
    history_length: usize,
    /// Directory generated files are written to.
    #[serde(default = "default_file_path")]
    file_path: String,
    /// strftime pattern for generated file names.
    #[serde(default = "default_file_name_format")]
    file_name_format: String,
    #[serde(default = "default_chat_model")]
    chat_model: String,
    #[serde(default = "default_image_model")]
    image_model: String,
    #[serde(default = "default_image_quality")]
    image_quality: String,
    #[serde(default = "default_speech_model")]
    speech_model: String,
    #[serde(default = "default_voice")]
    voice: String,
    #[serde(default = "default_max_message_len")]
    max_message_len: usize,
    #[serde(default = "default_bot_name")]
    bot_name: String,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
}

fn default_history_length() -> usize {
    20
}

fn default_file_path() -> String {
    "files".to_string()
}

fn default_file_name_format() -> String {
    "%Y%m%d%H%M%S".to_string()
}

fn default_chat_model() -> String {
    "gpt-4-1106-preview".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_quality() -> String {
    "hd".to_string()
}

fn default_speech_model() -> String {
    "tts-1-hd".to_string()
}

fn default_voice() -> String {
    "nova".to_string()
}

fn default_max_message_len() -> usize {
    2000
}

fn default_bot_name() -> String {
    "assistant".to_string()
}

pub struct Config {
    pub telegram_bot_token: String,
    pub allowed_chats: HashSet<ChatId>,
    pub openai_api_key: String,
    pub openai_organization: Option<String>,
    pub system_prompt: String,
    pub history_length: usize,
    pub file_path: PathBuf,
    pub file_name_format: String,
    pub chat_model: String,
    pub image_model: String,
    pub image_quality: String,
    pub speech_model: String,
    pub voice: String,
    pub max_message_len: usize,
    pub bot_name: String,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, std::env::var("OPENAI_API_KEY").ok())
    }

    fn load_with_env<P: AsRef<Path>>(path: P, env_api_key: Option<String>) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let openai_api_key = if file.openai_api_key.is_empty() {
            env_api_key.unwrap_or_default()
        } else {
            file.openai_api_key
        };
        if openai_api_key.is_empty() {
            return Err(ConfigError::Validation(
                "openai_api_key is required (in the config file or OPENAI_API_KEY)".into(),
            ));
        }

        if file.system_prompt.trim().is_empty() {
            return Err(ConfigError::Validation("system_prompt must not be empty".into()));
        }
        if file.history_length == 0 {
            return Err(ConfigError::Validation("history_length must be at least 1".into()));
        }
        if file.max_message_len == 0 {
            return Err(ConfigError::Validation("max_message_len must be at least 1".into()));
        }
        validate_file_name_format(&file.file_name_format)?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            allowed_chats: file.allowed_chats.into_iter().map(ChatId).collect(),
            openai_api_key,
            openai_organization: file.openai_organization.filter(|org| !org.is_empty()),
            system_prompt: file.system_prompt,
            history_length: file.history_length,
            file_path: PathBuf::from(file.file_path),
            file_name_format: file.file_name_format,
            chat_model: file.chat_model,
            image_model: file.image_model,
            image_quality: file.image_quality,
            speech_model: file.speech_model,
            voice: file.voice,
            max_message_len: file.max_message_len,
            bot_name: file.bot_name,
            data_dir,
        })
    }

    /// Whether the bot should answer in `chat_id`.
    pub fn is_allowed_chat(&self, chat_id: ChatId) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            image_model: self.image_model.clone(),
            image_quality: self.image_quality.clone(),
            speech_model: self.speech_model.clone(),
            voice: self.voice.clone(),
            script_model: self.chat_model.clone(),
        }
    }
}

/// File names are built from this pattern, so it must be a valid strftime
/// pattern that cannot produce a path separator.
fn validate_file_name_format(format: &str) -> Result<(), ConfigError> {
    if format.is_empty() {
        return Err(ConfigError::Validation("file_name_format must not be empty".into()));
    }
    if format.contains('/') || format.contains('\\') {
        return Err(ConfigError::Validation("file_name_format must not contain path separators".into()));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::Validation(format!(
            "file_name_format '{format}' is not a valid strftime pattern"
        )));
    }
    Ok(())
}
