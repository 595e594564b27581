//! High-level client tying an adapter to conversation identity and usage
//! accounting.
//!
//! ```text
//! caller ──request──> ChatClient ──> ChatProvider (openai / anthropic)
//!                        │                 │
//!                        │ ids, usage      │ result | deltas
//!                        v                 v
//!                 ChatCompletionResult / ChatStream
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};

use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::identity::{ensure_conversation_id, new_message_id};
use crate::llm::{create_provider, ChatProvider, DeltaStream};
use crate::observer::Observer;
use crate::types::{ChatCompletionRequest, ChatCompletionResult, StreamDelta};
use crate::usage::{prompt_text, reconcile};

pub struct ChatClient {
    provider: Box<dyn ChatProvider>,
}

impl ChatClient {
    pub fn new(provider: Box<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    /// Build the adapter selected by `settings.kind`.
    pub fn from_settings(settings: ProviderSettings, observer: Arc<dyn Observer>) -> Self {
        Self::new(create_provider(settings, observer))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run a blocking completion.
    ///
    /// Usage the provider omitted is estimated and flagged as such.
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResult, ProviderError> {
        let mut result = self.provider.complete(request).await?;
        if result.usage.is_none() {
            result.usage = Some(reconcile(None, &prompt_text(request), &result.message));
        }
        Ok(result)
    }

    /// Start a streaming completion.
    ///
    /// The conversation id is settled before the upstream call so the
    /// caller can report it while deltas are still arriving.
    pub async fn stream(&self, request: &ChatCompletionRequest) -> Result<ChatStream, ProviderError> {
        let conversation_id = ensure_conversation_id(request.conversation_id.as_deref());
        let deltas = self.provider.stream(request).await?;

        Ok(ChatStream {
            conversation_id,
            message_id: new_message_id(),
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.provider.default_model().to_string()),
            prompt_text: prompt_text(request),
            deltas,
        })
    }
}

/// An in-flight streamed reply.
///
/// Implements [`Stream`] over its deltas. Dropping it before the end
/// closes the upstream connection.
pub struct ChatStream {
    pub conversation_id: String,
    pub message_id: String,
    /// Model requested for this stream, or the adapter default.
    ///
    /// Deltas carry text only, so a model the provider declares inside
    /// stream chunks is not reflected here. Use [`ChatClient::complete`]
    /// when the provider-reported model matters.
    pub model: String,
    prompt_text: String,
    deltas: DeltaStream,
}

impl ChatStream {
    /// Drain the remaining deltas into a result with estimated usage.
    ///
    /// `model` in the result is the requested model (see [`ChatStream::model`]).
    pub async fn collect_result(mut self) -> Result<ChatCompletionResult, ProviderError> {
        let mut message = String::new();
        while let Some(delta) = self.deltas.next().await {
            message.push_str(delta?.as_str());
        }

        let usage = reconcile(None, &self.prompt_text, &message);
        Ok(ChatCompletionResult {
            message,
            conversation_id: self.conversation_id,
            usage: Some(usage),
            model: self.model,
            finish_reason: None,
        })
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamDelta, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.deltas.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Usage;
    use async_trait::async_trait;
    use futures_util::stream;

    /// Provider returning canned answers without any network.
    struct ScriptedProvider {
        reply: &'static str,
        usage: Option<Usage>,
        deltas: Vec<Result<&'static str, ErrorKind>>,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn complete(
            &self,
            request: &ChatCompletionRequest,
        ) -> Result<ChatCompletionResult, ProviderError> {
            request.validate()?;
            Ok(ChatCompletionResult {
                message: self.reply.to_string(),
                conversation_id: ensure_conversation_id(request.conversation_id.as_deref()),
                usage: self.usage,
                model: "scripted-1".to_string(),
                finish_reason: None,
            })
        }

        async fn stream(
            &self,
            request: &ChatCompletionRequest,
        ) -> Result<DeltaStream, ProviderError> {
            request.validate()?;
            let items: Vec<Result<StreamDelta, ProviderError>> = self
                .deltas
                .iter()
                .map(|d| match d {
                    Ok(text) => Ok(StreamDelta::new(*text)),
                    Err(kind) => Err(ProviderError::new(*kind)),
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }

        fn default_model(&self) -> &str {
            "scripted-1"
        }

        fn name(&self) -> &str {
            "Scripted"
        }
    }

    fn client(usage: Option<Usage>, deltas: Vec<Result<&'static str, ErrorKind>>) -> ChatClient {
        ChatClient::new(Box::new(ScriptedProvider {
            reply: "0123456789abcdef",
            usage,
            deltas,
        }))
    }

    #[tokio::test]
    async fn test_complete_keeps_reported_usage() {
        let client = client(Some(Usage::reported(5, 3, 8)), vec![]);
        let result = client
            .complete(&ChatCompletionRequest::new("Hello"))
            .await
            .unwrap();
        assert_eq!(result.usage, Some(Usage::reported(5, 3, 8)));
    }

    #[tokio::test]
    async fn test_complete_estimates_missing_usage() {
        let client = client(None, vec![]);
        let result = client
            .complete(&ChatCompletionRequest::new("12345678"))
            .await
            .unwrap();
        let usage = result.usage.unwrap();
        assert_eq!(
            (usage.prompt_tokens, usage.completion_tokens, usage.total_tokens),
            (2, 4, 6)
        );
        assert!(usage.estimated);
    }

    #[tokio::test]
    async fn test_stream_collects_with_estimated_usage() {
        let client = client(None, vec![Ok("01234567"), Ok("89abcdef")]);
        let request = ChatCompletionRequest::new("12345678").with_conversation_id("conv-7");
        let stream = client.stream(&request).await.unwrap();
        assert_eq!(stream.conversation_id, "conv-7");
        assert!(stream.message_id.starts_with("msg_"));
        assert_eq!(stream.model, "scripted-1");

        let result = stream.collect_result().await.unwrap();
        assert_eq!(result.message, "0123456789abcdef");
        assert_eq!(result.conversation_id, "conv-7");
        let usage = result.usage.unwrap();
        assert_eq!(usage.total_tokens, 6);
        assert!(usage.estimated);
    }

    #[test]
    fn test_provider_name_comes_from_adapter() {
        assert_eq!(client(None, vec![]).provider_name(), "Scripted");
    }

    #[tokio::test]
    async fn test_stream_generates_conversation_id() {
        let client = client(None, vec![Ok("x")]);
        let stream = client
            .stream(&ChatCompletionRequest::new("hi"))
            .await
            .unwrap();
        assert!(stream.conversation_id.starts_with("conv_"));
    }

    #[tokio::test]
    async fn test_stream_error_surfaces_after_partial_deltas() {
        let client = client(None, vec![Ok("par"), Ok("tial"), Err(ErrorKind::Unavailable)]);
        let mut stream = client
            .stream(&ChatCompletionRequest::new("hi"))
            .await
            .unwrap();

        let mut seen = String::new();
        let err = loop {
            match stream.next().await {
                Some(Ok(delta)) => seen.push_str(delta.as_str()),
                Some(Err(err)) => break err,
                None => panic!("stream ended without the error"),
            }
        };
        assert_eq!(seen, "partial");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_collect_result_propagates_stream_error() {
        let client = client(None, vec![Ok("a"), Err(ErrorKind::ProviderInternalError)]);
        let stream = client
            .stream(&ChatCompletionRequest::new("hi"))
            .await
            .unwrap();
        let err = stream.collect_result().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderInternalError);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let client = client(None, vec![]);
        let err = client
            .complete(&ChatCompletionRequest::new(" "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}
