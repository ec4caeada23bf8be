//! Chatbot engine - relays chat messages to the model and runs its tool calls.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chatbot::error::BridgeError;
use crate::chatbot::generate::{self, Generator};
use crate::chatbot::history::History;
use crate::chatbot::message::{ChatMessage, split_chunks};
use crate::chatbot::telegram::{ChatSink, SendError};
use crate::chatbot::tools::{TOOL_RESULT_PLACEHOLDER, ToolCall, get_tool_definitions};
use crate::openai::{ChatModel, Record, Tool};

/// Chatbot configuration.
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    pub bot_user_id: i64,
    /// Name used when logging the bot's own output.
    pub bot_name: String,
    pub system_prompt: String,
    pub history_length: usize,
    pub max_message_len: usize,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            bot_user_id: 0,
            bot_name: "assistant".to_string(),
            system_prompt: String::new(),
            history_length: 20,
            max_message_len: 2000,
        }
    }
}

/// What to send back for one inbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub text: Option<String>,
    pub attachments: Vec<PathBuf>,
}

/// One history per chat. Holding a chat's lock for the whole handling of a
/// message keeps concurrent messages in the same chat from interleaving.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Arc<Mutex<History>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session(&self, chat_id: i64) -> Arc<Mutex<History>> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(chat_id).or_default().clone()
    }
}

/// The chatbot engine.
pub struct ChatbotEngine {
    config: ChatbotConfig,
    model: Arc<dyn ChatModel>,
    generator: Arc<dyn Generator>,
    sink: Arc<dyn ChatSink>,
    tools: Vec<Tool>,
    sessions: SessionStore,
}

impl ChatbotEngine {
    pub fn new(
        config: ChatbotConfig,
        model: Arc<dyn ChatModel>,
        generator: Arc<dyn Generator>,
        sink: Arc<dyn ChatSink>,
    ) -> Self {
        Self {
            config,
            model,
            generator,
            sink,
            tools: get_tool_definitions(),
            sessions: SessionStore::new(),
        }
    }

    /// Snapshot of a chat's history.
    pub async fn history(&self, chat_id: i64) -> Vec<Record> {
        let session = self.sessions.session(chat_id).await;
        let history = session.lock().await;
        history.records().to_vec()
    }

    /// Handle an incoming message end to end. Errors are logged or reported
    /// to the chat; nothing propagates to the dispatcher.
    pub async fn handle_message(&self, msg: ChatMessage) {
        if msg.user_id == self.config.bot_user_id {
            return;
        }
        if msg.is_blank() {
            debug!("Skipping message {} with nothing to answer", msg.message_id);
            return;
        }

        info!(
            "📨 {} ({}): \"{}\"",
            msg.display_name,
            msg.user_id,
            msg.text.chars().take(50).collect::<String>()
        );

        let session = self.sessions.session(msg.chat_id).await;
        let mut history = session.lock().await;

        let reply = match self.respond(&mut history, &msg).await {
            Ok(reply) => reply,
            Err(e) => match e.user_message() {
                Some(text) => {
                    warn!("Request failed ({:?}): {e}", e.kind());
                    Reply { text: Some(text.to_string()), attachments: Vec::new() }
                }
                None => {
                    error!("Dropping message {} after error: {e}", msg.message_id);
                    return;
                }
            },
        };
        drop(history);

        self.deliver(msg.chat_id, &reply).await;
    }

    /// Update the history with `msg`, query the model, run any tool calls and
    /// return the reply.
    pub async fn respond(&self, history: &mut History, msg: &ChatMessage) -> Result<Reply, BridgeError> {
        history.append(Record::system(format!(
            "The user is {}. {}",
            msg.display_name, self.config.system_prompt
        )));
        history.append(Record::user(msg.user_content()));
        history.trim_to(self.config.history_length);
        history.drop_orphaned_tool_results();

        let response = self.model.complete(history.records(), Some(self.tools.as_slice())).await?;

        if response.tool_calls.is_empty() {
            // An assistant turn with neither content nor tool calls is
            // rejected by the API on the next request.
            if let Some(content) = &response.content {
                history.append(Record::assistant(Some(content.clone())));
            }
            return Ok(Reply { text: response.content, attachments: Vec::new() });
        }
        let before_tools = history.len();
        history.append(response.to_record());

        let mut attachments = Vec::new();
        let mut notices = Vec::new();
        let mut first_error = None;
        for request in &response.tool_calls {
            let content = match ToolCall::from_request(request) {
                Ok(call) => {
                    info!("🔧 Executing: {:?}", call);
                    let path = match generate::dispatch(self.generator.as_ref(), &call).await {
                        Ok(path) => path,
                        Err(e) => {
                            // Tool calls without results are rejected by the API.
                            history.truncate(before_tools);
                            return Err(e);
                        }
                    };
                    info!("Result: {}", path.display());
                    attachments.push(path);
                    TOOL_RESULT_PLACEHOLDER.to_string()
                }
                Err(e) => {
                    warn!("Rejected tool call {}: {e}", request.id);
                    notices.push(format!("⚠️ {e}"));
                    let content = format!("error: {e}");
                    first_error.get_or_insert(e);
                    content
                }
            };
            history.append(Record::Tool {
                tool_call_id: request.id.clone(),
                name: request.function.name.clone(),
                content,
            });
        }

        // Nothing was produced; skip the narrative round trip.
        if let Some(e) = first_error
            && attachments.is_empty()
        {
            return Err(e.into());
        }

        let final_response = self.model.complete(history.records(), None).await?;
        if let Some(content) = &final_response.content {
            history.append(Record::assistant(Some(content.clone())));
        }

        let text = match (final_response.content, notices.is_empty()) {
            (text, true) => text,
            (Some(text), false) => Some(format!("{}\n\n{}", text, notices.join("\n"))),
            (None, false) => Some(notices.join("\n")),
        };
        Ok(Reply { text, attachments })
    }

    /// Send a reply in chunks. Attachments go out with the first chunk only.
    pub async fn deliver(&self, chat_id: i64, reply: &Reply) {
        let text = reply.text.as_deref().unwrap_or_default();
        let mut chunks = split_chunks(text, self.config.max_message_len);
        if chunks.is_empty() {
            if reply.attachments.is_empty() {
                return;
            }
            chunks.push("");
        }

        for (index, chunk) in chunks.into_iter().enumerate() {
            let attachments: &[PathBuf] = if index == 0 { &reply.attachments } else { &[] };
            info!("{}: {}", self.config.bot_name, chunk);
            match self.sink.send(chat_id, chunk, attachments).await {
                Ok(()) => {}
                Err(SendError::Forbidden(e)) => {
                    warn!(
                        "{}: I am not able to send a message. Do I have the correct permissions in chat {}? ({e})",
                        self.config.bot_name, chat_id
                    );
                }
                Err(e) => {
                    error!("Delivery to chat {} aborted: {e}", chat_id);
                    return;
                }
            }
        }
    }
}
