//! OpenAI-compatible LLM provider implementation.
//!
//! Works with OpenAI and any server exposing the same
//! `POST {api_base}/chat/completions` endpoint (OpenRouter, Ollama,
//! DashScope compatible mode, vLLM, ...).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sse::{self, ChunkEvent};
use super::{build_messages, ChatProvider, DeltaStream};
use crate::config::ProviderSettings;
use crate::error::{ClassifyInput, ProviderError};
use crate::identity::ensure_conversation_id;
use crate::observer::Observer;
use crate::types::{ChatCompletionRequest, ChatCompletionResult, ChatMessage, FinishReason, Usage};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const PROVIDER_NAME: &str = "openai_compatible";

pub struct OpenAiCompatibleProvider {
    settings: ProviderSettings,
    api_base: String,
    client: reqwest::Client,
    observer: Arc<dyn Observer>,
}

// --- API Request Types (OpenAI format) ---

#[derive(Serialize, Debug)]
struct ApiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
    model: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiChoice {
    message: ApiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

// --- Streaming Response Types ---

#[derive(Deserialize, Debug)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDeltaBody>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaBody {
    content: Option<String>,
}

/// Error object some compatible servers send mid-stream.
#[derive(Deserialize, Debug)]
struct StreamError {
    message: Option<String>,
    code: Option<serde_json::Value>,
}

// --- Implementation ---

impl OpenAiCompatibleProvider {
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
        format!("{}/chat/completions", self.api_base)
    }

    fn build_api_request(&self, request: &ChatCompletionRequest, stream: bool) -> ApiRequest {
        ApiRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.settings.model.clone()),
            messages: build_messages(request),
            temperature: request.temperature.or(self.settings.temperature),
            max_tokens: request.max_tokens.or(Some(self.settings.max_tokens)),
            stream,
        }
    }

    /// POST the payload; any non-2xx status becomes a classified error.
    async fn send(&self, api_request: &ApiRequest) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
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

    fn parse_response(
        &self,
        api_response: ApiResponse,
        request: &ChatCompletionRequest,
        requested_model: String,
    ) -> Result<ChatCompletionResult, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| no_content("no choices returned"))?;
        let message = choice
            .message
            .content
            .ok_or_else(|| no_content("first choice has no content"))?;

        let usage = api_response.usage.map(|u| {
            Usage::reported(
                u.prompt_tokens,
                u.completion_tokens,
                u.total_tokens
                    .unwrap_or(u.prompt_tokens.saturating_add(u.completion_tokens)),
            )
        });

        Ok(ChatCompletionResult {
            message,
            conversation_id: ensure_conversation_id(request.conversation_id.as_deref()),
            usage,
            model: api_response.model.unwrap_or(requested_model),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .and_then(FinishReason::from_openai),
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

/// A 2xx reply without usable text.
fn no_content(reason: &str) -> ProviderError {
    ProviderError::classified(ClassifyInput {
        http_status: Some(200),
        transport_failure: false,
        provider_message: Some(reason.to_string()),
    })
}

/// Extract `choices[0].delta.content` from one stream chunk.
fn parse_chunk(data: &str) -> Result<ChunkEvent, serde_json::Error> {
    let chunk: StreamResponseChunk = serde_json::from_str(data)?;

    if let Some(error) = chunk.error {
        let status = error
            .code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok());
        return Ok(ChunkEvent::Error(ProviderError::classified(ClassifyInput {
            http_status: status,
            transport_failure: false,
            provider_message: error.message,
        })));
    }

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content);
    Ok(match text {
        Some(text) => ChunkEvent::Text(text),
        None => ChunkEvent::Ignore,
    })
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
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
        "OpenAI-Compatible"
    }
}
