//! OpenAI REST client: chat completions, image generation, speech.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const API_BASE: &str = "https://api.openai.com/v1";

/// One turn of the context sent to the model.
///
/// Serializes to the wire shape of the chat-completions `messages` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Record {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Record {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(content: Option<String>) -> Self {
        Self::Assistant { content, tool_calls: Vec::new() }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, as produced by the model.
    pub arguments: String,
}

/// Declared tool offered to the model.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The assistant turn returned by a completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantMessage {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), tool_calls: Vec::new() }
    }

    /// The record to append to history for this turn.
    pub fn to_record(&self) -> Record {
        Record::Assistant {
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Empty response")]
    Empty,
}

impl Error {
    /// Whether the failure points at credentials, configuration or a request
    /// the API refuses, rather than a passing outage.
    pub fn is_environment(&self) -> bool {
        match self {
            Error::Status { status, .. } => matches!(status, 401 | 403 | 404) || self.is_rejected_request(),
            Error::Parse(_) => true,
            Error::Http(_) | Error::Empty => false,
        }
    }

    /// The API understood the request but refused its contents.
    pub fn is_rejected_request(&self) -> bool {
        matches!(self, Error::Status { status: 400 | 413 | 422, .. })
    }
}

/// Chat-completion seam used by the orchestrator.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion over `records`. `tools` of `None` issues a
    /// tool-free request.
    async fn complete(
        &self,
        records: &[Record],
        tools: Option<&[Tool]>,
    ) -> Result<AssistantMessage, Error>;
}

pub struct Client {
    api_key: String,
    organization: Option<String>,
    base_url: String,
    chat_model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Record],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a Tool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiAssistantMessage,
}

#[derive(Deserialize)]
struct ApiAssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    quality: &'a str,
    response_format: &'static str,
    n: u8,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

impl Client {
    pub fn new(api_key: String, organization: Option<String>, chat_model: String) -> Self {
        Self {
            api_key,
            organization,
            base_url: API_BASE.to_string(),
            chat_model,
            http: reqwest::Client::new(),
        }
    }

    /// Point the client at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key);
        if let Some(ref org) = self.organization {
            request = request.header("OpenAI-Organization", org);
        }
        request
    }

    /// Send a request and reject non-2xx responses with their body.
    async fn execute(request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let response = request.send().await?;
        let status = response.status();
        debug!("OpenAI response status: {status}");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }

    /// Chat completion against an explicit model.
    pub async fn chat_with_model(
        &self,
        model: &str,
        records: &[Record],
        tools: Option<&[Tool]>,
    ) -> Result<AssistantMessage, Error> {
        let request = ChatRequest {
            model,
            messages: records,
            tools: tools.map(|tools| {
                tools
                    .iter()
                    .map(|function| ApiTool { kind: "function", function })
                    .collect()
            }),
            tool_choice: tools.map(|_| "auto"),
        };

        let response = Self::execute(self.post("/chat/completions").json(&request)).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        let choice = parsed.choices.into_iter().next().ok_or(Error::Empty)?;
        Ok(AssistantMessage {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }

    /// Request one image and return its URL.
    pub async fn generate_image(&self, model: &str, quality: &str, prompt: &str) -> Result<String, Error> {
        let request = ImageRequest {
            model,
            prompt,
            quality,
            response_format: "url",
            n: 1,
        };

        let response = Self::execute(self.post("/images/generations").json(&request)).await?;
        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or(Error::Empty)
    }

    /// Start a speech synthesis request. The audio is left in the response
    /// body for the caller to stream.
    pub async fn speech(&self, model: &str, voice: &str, input: &str) -> Result<reqwest::Response, Error> {
        let request = SpeechRequest { model, voice, input };
        Self::execute(self.post("/audio/speech").json(&request)).await
    }

    /// Fetch a URL returned by the API (generated images are served from a CDN,
    /// so no credentials are attached).
    pub async fn download(&self, url: &str) -> Result<reqwest::Response, Error> {
        Self::execute(self.http.get(url)).await
    }
}

#[async_trait]
impl ChatModel for Client {
    async fn complete(
        &self,
        records: &[Record],
        tools: Option<&[Tool]>,
    ) -> Result<AssistantMessage, Error> {
        self.chat_with_model(&self.chat_model, records, tools).await
    }
}
