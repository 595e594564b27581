//! LLM provider module.
//!
//! This module defines the `ChatProvider` trait that abstracts over the
//! supported upstream APIs, and provides one implementation per provider.
//!
//! Key concepts:
//! - **Trait**: every provider implements `complete` (one blocking call)
//!   and `stream` (a lazy sequence of text deltas)
//! - **async_trait**: lets the trait be used as `Box<dyn ChatProvider>`
//! - **Provider selection**: callers pick a variant through configuration
//!   (`ProviderKind`), never by inspecting types at runtime

pub mod anthropic;
pub mod openai_compatible;
pub mod sse;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::observer::Observer;
use crate::types::{ChatCompletionRequest, ChatCompletionResult, ChatMessage, StreamDelta};

use anthropic::AnthropicProvider;
use openai_compatible::OpenAiCompatibleProvider;

/// Lazy, single-pass sequence of deltas from one upstream call.
///
/// Dropping it releases the underlying connection.
pub type DeltaStream = BoxStream<'static, Result<StreamDelta, ProviderError>>;

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a request and wait for the whole response.
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResult, ProviderError>;

    /// Send a streaming request.
    ///
    /// Upstream status errors are returned here, before any delta is
    /// produced. Failures after that arrive as an `Err` item in the stream.
    async fn stream(&self, request: &ChatCompletionRequest) -> Result<DeltaStream, ProviderError>;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Return the provider's display name (for logging).
    fn name(&self) -> &str;
}

/// The supported provider variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai_compatible", alias = "openai")]
    OpenAiCompatible,
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiCompatible => "openai_compatible",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai_compatible" | "openai" => Ok(ProviderKind::OpenAiCompatible),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(format!(
                "Unknown provider: '{}'. Supported: 'anthropic', 'openai_compatible'",
                other
            )),
        }
    }
}

/// Create the provider selected by `settings.kind`.
///
/// `settings.api_key` should already be resolved.
pub fn create_provider(
    settings: ProviderSettings,
    observer: Arc<dyn Observer>,
) -> Box<dyn ChatProvider> {
    match settings.kind {
        ProviderKind::OpenAiCompatible => {
            Box::new(OpenAiCompatibleProvider::new(settings, observer))
        }
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(settings, observer)),
    }
}

/// Build the ordered message list for a request.
///
/// The order is fixed: system prompt (if any), then history as given,
/// then the current user message last.
pub fn build_messages(request: &ChatCompletionRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);

    if let Some(prompt) = request.system_prompt.as_deref() {
        if !prompt.trim().is_empty() {
            messages.push(ChatMessage::system(prompt));
        }
    }
    messages.extend(request.history.iter().cloned());
    messages.push(ChatMessage::user(request.message.as_str()));

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_build_messages_system_then_user() {
        let request = ChatCompletionRequest::new("Hello").with_system_prompt("You are helpful");
        let messages = build_messages(&request);
        assert_eq!(
            messages,
            vec![
                ChatMessage::system("You are helpful"),
                ChatMessage::user("Hello")
            ]
        );
    }

    #[test]
    fn test_build_messages_keeps_history_order() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("second"),
            ChatMessage::user("third"),
            ChatMessage::assistant("fourth"),
        ];
        let request = ChatCompletionRequest::new("fifth")
            .with_system_prompt("sys")
            .with_history(history);
        let roles: Vec<Role> = build_messages(&request).iter().map(|m| m.role()).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User
            ]
        );
        let contents: Vec<String> = build_messages(&request)
            .iter()
            .map(|m| m.content().to_string())
            .collect();
        assert_eq!(contents, ["sys", "first", "second", "third", "fourth", "fifth"]);
    }

    #[test]
    fn test_build_messages_without_system_prompt() {
        let request = ChatCompletionRequest::new("Hi").with_system_prompt("  ");
        assert_eq!(build_messages(&request), vec![ChatMessage::user("Hi")]);
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(
            "openai".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAiCompatible
        );
        assert_eq!(
            "OpenAI_Compatible".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAiCompatible
        );
        assert_eq!(
            "anthropic".parse::<ProviderKind>().unwrap(),
            ProviderKind::Anthropic
        );
        let err = "gemini".parse::<ProviderKind>().unwrap_err();
        assert!(err.contains("gemini"));
    }
}
