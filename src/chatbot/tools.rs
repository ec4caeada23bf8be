//! Tool definitions offered to the model and parsing of its tool calls.

use serde::Deserialize;

use crate::openai::{Tool, ToolCallRequest};

pub const GENERATE_IMAGE: &str = "generate_image_with_dalle";
pub const CREATE_SCRIPT: &str = "create_python_script";
pub const CREATE_VOICE_MESSAGE: &str = "create_voice_message";

/// Content of the tool-result record after a successful call. The artifact
/// itself goes to the chat, not back to the model.
pub const TOOL_RESULT_PLACEHOLDER: &str = "The file has been created and is attached to your next message";

/// A tool call the model can make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    /// Generate an image and download it as a `.jpg`.
    GenerateImage { prompt: String },
    /// Generate a Python script as a `.py` file.
    CreateScript { prompt: String },
    /// Synthesize the prompt as speech into a `.mp3` file.
    CreateVoiceMessage { prompt: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },
}

#[derive(Deserialize)]
struct PromptArgs {
    prompt: String,
}

impl ToolCall {
    /// Parse a tool call from the model's function name and JSON arguments.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        let make: fn(String) -> ToolCall = match name {
            GENERATE_IMAGE => |prompt| ToolCall::GenerateImage { prompt },
            CREATE_SCRIPT => |prompt| ToolCall::CreateScript { prompt },
            CREATE_VOICE_MESSAGE => |prompt| ToolCall::CreateVoiceMessage { prompt },
            _ => return Err(ToolError::UnknownTool(name.to_string())),
        };

        let args: PromptArgs = serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(make(args.prompt))
    }

    pub fn from_request(request: &ToolCallRequest) -> Result<Self, ToolError> {
        Self::parse(&request.function.name, &request.function.arguments)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::GenerateImage { .. } => GENERATE_IMAGE,
            ToolCall::CreateScript { .. } => CREATE_SCRIPT,
            ToolCall::CreateVoiceMessage { .. } => CREATE_VOICE_MESSAGE,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            ToolCall::GenerateImage { prompt }
            | ToolCall::CreateScript { prompt }
            | ToolCall::CreateVoiceMessage { prompt } => prompt,
        }
    }
}

fn prompt_tool(name: &str, description: &str, prompt_description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": prompt_description
                }
            },
            "required": ["prompt"]
        }),
    }
}

/// Get the tool definitions for the model.
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        prompt_tool(
            GENERATE_IMAGE,
            "Generates an image using DALL-E and attaches it to your reply.",
            "Prompt for the image to be generated",
        ),
        prompt_tool(
            CREATE_SCRIPT,
            "Creates a Python script and attaches it to your reply as a .py file.",
            "Prompt for the script to be created",
        ),
        prompt_tool(
            CREATE_VOICE_MESSAGE,
            "Creates a voice message speaking the prompt and attaches it to your reply.",
            "What the voice message should say",
        ),
    ]
}
