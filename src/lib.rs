//! chatbridge - a provider-agnostic chat completion client.
//!
//! Translates one uniform [`ChatCompletionRequest`] into the wire format of
//! an upstream LLM provider, decodes whole-body and SSE-streamed responses
//! into one uniform shape, and classifies every failure into a closed
//! [`ErrorKind`] set.

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod llm;
pub mod observer;
pub mod types;
pub mod usage;

pub use client::{ChatClient, ChatStream};
pub use config::{AppConfig, ConfigError, ProviderSettings};
pub use error::{classify, ClassifyInput, ErrorKind, ProviderError};
pub use identity::{ensure_conversation_id, new_message_id};
pub use llm::{create_provider, ChatProvider, DeltaStream, ProviderKind};
pub use observer::{NoopObserver, Observer, TracingObserver};
pub use types::{
    ChatCompletionRequest, ChatCompletionResult, ChatMessage, FinishReason, Role, StreamDelta,
    Usage,
};
pub use usage::{estimate_tokens, reconcile};
