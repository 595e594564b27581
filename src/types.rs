//! Core data types used throughout chatbridge.
//!
//! This module defines the uniform request/result shapes that every
//! provider adapter translates to and from. Callers (GraphQL resolvers,
//! REST handlers, the CLI) only ever see these types.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

// --- Message Roles ---

/// The role of a message in the conversation.
///
/// - `System`: instructions to the model
/// - `User`: the human's input
/// - `Assistant`: the model's earlier replies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

// --- Messages ---

/// A single message in a conversation.
///
/// Fields are private so a message cannot change after construction;
/// the order of messages in a list is the conversation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    role: Role,
    content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message (sets the model's behavior/instructions).
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

// --- Chat Request ---

/// A uniform chat completion request.
///
/// Optional fields left as `None` are filled from the adapter's
/// configuration when the provider payload is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    /// The current user message (must be non-empty after trimming)
    pub message: String,
    /// Existing conversation to continue; echoed back unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature in `[0, 2]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Prior turns, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,
}

impl ChatCompletionRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Reject requests no provider could serve.
    ///
    /// The length limit on `message` belongs to the caller; this only
    /// guards against empty input and out-of-range sampling parameters.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.message.trim().is_empty() {
            return Err(ProviderError::invalid_request(
                "message must not be empty or whitespace",
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ProviderError::invalid_request(format!(
                    "temperature {} is outside [0, 2]",
                    t
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ProviderError::invalid_request(
                "max_tokens must be positive",
            ));
        }
        Ok(())
    }
}

// --- Chat Result ---

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// True when the counts come from the character heuristic rather
    /// than from the provider.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
}

impl Usage {
    /// Counts reported by a provider.
    pub fn reported(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            estimated: false,
        }
    }
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    FunctionCall,
}

impl FinishReason {
    /// Map an OpenAI-style `finish_reason` string.
    ///
    /// Unrecognized values yield `None` rather than failing the call.
    pub fn from_openai(raw: &str) -> Option<Self> {
        match raw {
            "stop" => Some(FinishReason::Stop),
            "length" => Some(FinishReason::Length),
            "content_filter" => Some(FinishReason::ContentFilter),
            "function_call" | "tool_calls" => Some(FinishReason::FunctionCall),
            _ => None,
        }
    }
}

/// The uniform result of a completed (non-streaming) chat call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionResult {
    pub message: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// The model the provider says produced this response
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

// --- Stream Delta ---

/// One incremental fragment of streamed assistant text.
///
/// Concatenating every delta of a stream gives the full reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDelta {
    pub content: String,
}

impl StreamDelta {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_message_roles() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(
            serde_json::from_str::<Role>("\"assistant\"").unwrap(),
            Role::Assistant
        );
        assert!(serde_json::from_str::<Role>("\"tool\"").is_err());
    }

    #[test]
    fn test_message_serializes_as_wire_shape() {
        let json = serde_json::to_value(ChatMessage::user("Hello")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "Hello"}));
    }

    #[test]
    fn test_request_from_caller_json() {
        let request: ChatCompletionRequest = serde_json::from_str(
            r#"{
                "message": "Hello",
                "conversationId": "conv-1",
                "systemPrompt": "You are helpful",
                "maxTokens": 64,
                "history": [{"role": "user", "content": "Hi"}]
            }"#,
        )
        .unwrap();
        assert_eq!(request.message, "Hello");
        assert_eq!(request.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(request.system_prompt.as_deref(), Some("You are helpful"));
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.history, vec![ChatMessage::user("Hi")]);
        assert!(request.temperature.is_none());
    }

    #[test]
    fn test_validate_rejects_blank_message() {
        for message in ["", "   ", "\n\t"] {
            let err = ChatCompletionRequest::new(message).validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
            assert!(err.http_status().is_none());
        }
    }

    #[test]
    fn test_validate_temperature_range() {
        assert!(ChatCompletionRequest::new("hi")
            .with_temperature(0.0)
            .validate()
            .is_ok());
        assert!(ChatCompletionRequest::new("hi")
            .with_temperature(2.0)
            .validate()
            .is_ok());
        let err = ChatCompletionRequest::new("hi")
            .with_temperature(2.5)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(ChatCompletionRequest::new("hi")
            .with_temperature(-0.1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_max_tokens() {
        assert!(ChatCompletionRequest::new("hi")
            .with_max_tokens(0)
            .validate()
            .is_err());
        assert!(ChatCompletionRequest::new("hi")
            .with_max_tokens(1)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_openai("stop"), Some(FinishReason::Stop));
        assert_eq!(
            FinishReason::from_openai("length"),
            Some(FinishReason::Length)
        );
        assert_eq!(
            FinishReason::from_openai("tool_calls"),
            Some(FinishReason::FunctionCall)
        );
        assert_eq!(FinishReason::from_openai("something_new"), None);
    }

    #[test]
    fn test_usage_estimated_flag_serialization() {
        let reported = serde_json::to_value(Usage::reported(5, 3, 8)).unwrap();
        assert!(reported.get("estimated").is_none());
        assert_eq!(reported["totalTokens"], 8);

        let estimated = Usage {
            estimated: true,
            ..Usage::reported(2, 4, 6)
        };
        let json = serde_json::to_value(estimated).unwrap();
        assert_eq!(json["estimated"], true);
    }
}
