//! Chatbot module - relays chat messages to the model and attaches generated files.

pub mod engine;
pub mod error;
pub mod generate;
pub mod history;
pub mod message;
pub mod telegram;
pub mod tools;


pub use engine::{ChatbotConfig, ChatbotEngine, Reply};
pub use error::{BridgeError, ErrorKind};
pub use generate::{ArtifactDir, GenerationSettings, Generator, OpenAiGenerator};
pub use message::{Attachment, ChatMessage};
pub use telegram::{ChatSink, SendError, TelegramClient};
