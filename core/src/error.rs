use std::time::Duration;
use thiserror::Error;

/// Substrings (matched case-insensitively) that mark a provider failure as
/// "this model cannot take tools". Note that `"tool"` alone subsumes the
/// longer marker.
const TOOL_UNSUPPORTED_MARKERS: &[&str] = &["does not support tools", "tool"];

/// Failure of a single tool invocation. Never fatal for an exchange: the loop
/// turns it into `tool` message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool {0} not found")]
    NotFound(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("{message}")]
    Execution { tool: String, message: String },
}

impl ToolError {
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ToolNotFound",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::Execution { .. } => "ToolExecutionError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("model does not support tool calling: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Classifies a raw provider failure message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_tool_unsupported(&message) {
            Self::Unsupported(message)
        } else {
            Self::Other(message)
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

pub fn is_tool_unsupported(message: &str) -> bool {
    let lower = message.to_lowercase();
    TOOL_UNSUPPORTED_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Failures that escape the orchestration loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("the model produced no answer, even after being asked to summarize")]
    NoAnswerProduced,
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_tool_unsupported_messages() {
        let err = ProviderError::from_message(
            "registry.ollama.ai/library/gemma:2b does not support tools",
        );
        assert!(err.is_unsupported());

        let err = ProviderError::from_message("Invalid TOOL_CHOICE value");
        assert!(err.is_unsupported());
    }

    #[test]
    fn other_messages_are_not_unsupported() {
        let err = ProviderError::from_message("502 Bad Gateway");
        assert_eq!(err, ProviderError::Other("502 Bad Gateway".into()));
    }

    #[test]
    fn not_found_display_matches_tool_text() {
        let err = ToolError::NotFound("weather".into());
        assert_eq!(err.to_string(), "Tool weather not found");
        assert_eq!(err.kind(), "ToolNotFound");
    }
}
