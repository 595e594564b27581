//! Anthropic (Claude) LLM provider implementation.
//!
//! This module implements the `ChatProvider` trait for the Anthropic
//! Messages API.
//!
//! Key differences from the OpenAI format:
//! - **Endpoint**: `POST {api_base}/v1/messages`, authenticated with
//!   `x-api-key` plus an `anthropic-version` header
//! - **System prompt**: a top-level `system` field, not a message
//! - **max_tokens**: mandatory, so the configured default is always sent
//! - **Response**: `content` is an array of blocks; text blocks are joined
//! - **Streaming**: text arrives in `content_block_delta` events; there is
//!   no `[DONE]` terminator, the stream simply ends

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sse::{self, ChunkEvent};
use super::{build_messages, ChatProvider, DeltaStream};
use crate::config::ProviderSettings;
use crate::error::{classify, ClassifyInput, ProviderError};
use crate::identity::ensure_conversation_id;
use crate::observer::Observer;
use crate::types::{
    ChatCompletionRequest, ChatCompletionResult, FinishReason, Role, Usage,
};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const PROVIDER_NAME: &str = "anthropic";

/// Anthropic API client.
pub struct AnthropicProvider {
    settings: ProviderSettings,
    api_base: String,
    client: reqwest::Client,
    observer: Arc<dyn Observer>,
}

// --- API Request Types ---

#[derive(Serialize, Debug)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// --- Streaming Response Types ---

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: BlockDelta },
    #[serde(rename = "error")]
    Error { error: ApiErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum BlockDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

// --- Implementation ---

impl AnthropicProvider {
    pub fn new(settings: ProviderSettings, observer: Arc<dyn Observer>) -> Self {
        let api_base = settings
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            settings,
            api_base,
            client: reqwest::Client::new(),
            observer,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.api_base)
    }

    /// Project the ordered message list onto Anthropic's format.
    ///
    /// System messages move to the top-level `system` field (joined in
    /// order); everything else keeps its position.
    fn build_api_request(&self, request: &ChatCompletionRequest, stream: bool) -> ApiRequest {
        let mut system_parts: Vec<String> = Vec::new();
        let mut api_messages: Vec<ApiMessage> = Vec::new();

        for msg in build_messages(request) {
            match msg.role() {
                Role::System => system_parts.push(msg.content().to_string()),
                Role::User | Role::Assistant => api_messages.push(ApiMessage {
                    role: msg.role().as_str(),
                    content: msg.content().to_string(),
                }),
            }
        }

        ApiRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.settings.model.clone()),
            max_tokens: request.max_tokens.unwrap_or(self.settings.max_tokens),
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            messages: api_messages,
            temperature: request.temperature.or(self.settings.temperature),
            stream,
        }
    }

    async fn send(&self, api_request: &ApiRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", self.settings.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(api_request)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_response(status.as_u16(), &body));
        }
        Ok(response)
    }

    /// Parse the API response into a uniform result.
    fn parse_response(
        &self,
        api_response: ApiResponse,
        request: &ChatCompletionRequest,
        requested_model: String,
    ) -> Result<ChatCompletionResult, ProviderError> {
        let texts: Vec<String> = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();
        if texts.is_empty() {
            return Err(ProviderError::classified(ClassifyInput {
                http_status: Some(200),
                transport_failure: false,
                provider_message: Some("no text content returned".to_string()),
            }));
        }

        let usage = api_response.usage.map(|u| {
            Usage::reported(
                u.input_tokens,
                u.output_tokens,
                u.input_tokens.saturating_add(u.output_tokens),
            )
        });

        Ok(ChatCompletionResult {
            message: texts.concat(),
            conversation_id: ensure_conversation_id(request.conversation_id.as_deref()),
            usage,
            model: api_response.model.unwrap_or(requested_model),
            finish_reason: api_response.stop_reason.as_deref().and_then(map_stop_reason),
        })
    }

    async fn complete_inner(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResult, ProviderError> {
        request.validate()?;
        let api_request = self.build_api_request(request, false);
        let response = self.send(&api_request).await?;
        let status = response.status().as_u16();

        let body = response.text().await.map_err(ProviderError::from_transport)?;
        let api_response: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::empty_response(format!("malformed response body: {}", e))
                .with_status(status)
        })?;

        self.parse_response(api_response, request, api_request.model)
    }
}

fn map_stop_reason(raw: &str) -> Option<FinishReason> {
    match raw {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::FunctionCall),
        "refusal" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Anthropic error types, expressed as the HTTP status they are served with.
fn error_type_status(error_type: &str) -> Option<u16> {
    match error_type {
        "invalid_request_error" => Some(400),
        "authentication_error" => Some(401),
        "permission_error" => Some(403),
        "not_found_error" => Some(404),
        "request_too_large" => Some(413),
        "rate_limit_error" => Some(429),
        "api_error" => Some(500),
        "overloaded_error" => Some(503),
        _ => None,
    }
}

fn parse_chunk(data: &str) -> Result<ChunkEvent, serde_json::Error> {
    let event: StreamEvent = serde_json::from_str(data)?;
    Ok(match event {
        StreamEvent::ContentBlockDelta {
            delta: BlockDelta::Text { text },
        } => ChunkEvent::Text(text),
        StreamEvent::ContentBlockDelta {
            delta: BlockDelta::Other,
        }
        | StreamEvent::Other => ChunkEvent::Ignore,
        StreamEvent::Error { error } => {
            let input = ClassifyInput {
                http_status: error.error_type.as_deref().and_then(error_type_status),
                transport_failure: false,
                provider_message: error.message,
            };
            // The status is inferred from the error type, not received.
            let mut err = ProviderError::new(classify(&input));
            if let Some(message) = input.provider_message {
                err = err.with_message(message);
            }
            ChunkEvent::Error(err)
        }
    })
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResult, ProviderError> {
        let model = request.model.as_deref().unwrap_or(&self.settings.model);
        self.observer.request_started(PROVIDER_NAME, model, false);

        match self.complete_inner(request).await {
            Ok(result) => {
                self.observer
                    .request_succeeded(PROVIDER_NAME, &result.model, result.usage.as_ref());
                Ok(result)
            }
            Err(err) => {
                self.observer.request_failed(PROVIDER_NAME, &err);
                Err(err)
            }
        }
    }

    async fn stream(&self, request: &ChatCompletionRequest) -> Result<DeltaStream, ProviderError> {
        let model = request.model.as_deref().unwrap_or(&self.settings.model);
        self.observer.request_started(PROVIDER_NAME, model, true);

        let response = async {
            request.validate()?;
            let api_request = self.build_api_request(request, true);
            self.send(&api_request).await
        }
        .await;

        match response {
            Ok(response) => Ok(sse::decode_stream(
                response.bytes_stream(),
                PROVIDER_NAME,
                parse_chunk,
                self.observer.clone(),
            )),
            Err(err) => {
                self.observer.request_failed(PROVIDER_NAME, &err);
                Err(err)
            }
        }
    }

    fn default_model(&self) -> &str {
        &self.settings.model
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}
