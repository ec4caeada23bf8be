//! Errors raised while handling one inbound message.

use crate::chatbot::tools::ToolError;
use crate::openai;

/// How a failure is recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration, credentials or an API the client no longer understands.
    /// The user gets a fixed explanation.
    Environment,
    /// Network failures, rate limits, server errors. Logged; the event is dropped.
    Transient,
    /// The model asked for something the bot cannot do. The user gets a fixed
    /// explanation.
    Logic,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("model API: {0}")]
    Api(#[from] openai::Error),
    #[error("tool: {0}")]
    Tool(#[from] ToolError),
    #[error("artifact I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Api(e) if e.is_environment() => ErrorKind::Environment,
            BridgeError::Api(_) => ErrorKind::Transient,
            BridgeError::Tool(_) => ErrorKind::Logic,
            BridgeError::Io(e) => match e.kind() {
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::NotFound => ErrorKind::Environment,
                _ => ErrorKind::Transient,
            },
        }
    }

    /// Message to show in the chat, if this failure should be reported there.
    pub fn user_message(&self) -> Option<&'static str> {
        match (self, self.kind()) {
            (BridgeError::Api(openai::Error::Parse(_)), _) => Some(
                "The model API answered in a format I don't understand. This bot probably needs to be updated.",
            ),
            (BridgeError::Api(e), _) if e.is_rejected_request() => Some(
                "The model API rejected the request. The conversation may be too long; try again in a moment.",
            ),
            (BridgeError::Io(_), ErrorKind::Environment) => Some(
                "I couldn't write the generated file. Check that the output directory exists and is writable.",
            ),
            (_, ErrorKind::Environment) => Some(
                "I couldn't reach the model API with the current settings. Check the API key, organization and model names in the config.",
            ),
            (_, ErrorKind::Logic) => Some("The model asked for a tool I can't run, so I couldn't finish that request."),
            (_, ErrorKind::Transient) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let unauthorized = BridgeError::from(openai::Error::Status { status: 401, body: String::new() });
        assert_eq!(unauthorized.kind(), ErrorKind::Environment);

        let rate_limited = BridgeError::from(openai::Error::Status { status: 429, body: String::new() });
        assert_eq!(rate_limited.kind(), ErrorKind::Transient);
        assert!(rate_limited.user_message().is_none());

        let unknown = BridgeError::from(ToolError::UnknownTool("x".to_string()));
        assert_eq!(unknown.kind(), ErrorKind::Logic);
        assert!(unknown.user_message().is_some());

        let denied = BridgeError::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(denied.kind(), ErrorKind::Environment);
        assert!(denied.user_message().unwrap().contains("output directory"));
    }

    #[test]
    fn test_rejected_requests_are_reported() {
        for status in [400, 413, 422] {
            let err = BridgeError::from(openai::Error::Status { status, body: String::new() });
            assert_eq!(err.kind(), ErrorKind::Environment, "status {status}");
            assert!(err.user_message().unwrap().contains("rejected"), "status {status}");
        }

        let server = BridgeError::from(openai::Error::Status { status: 502, body: String::new() });
        assert_eq!(server.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_parse_error_asks_for_update() {
        let err = BridgeError::from(openai::Error::Parse("missing field".to_string()));
        assert_eq!(err.kind(), ErrorKind::Environment);
        assert!(err.user_message().unwrap().contains("updated"));
    }
}
