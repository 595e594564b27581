//! Provider error classification.
//!
//! Every failure leaving an adapter or a stream is a [`ProviderError`]
//! carrying one [`ErrorKind`] from a closed set, so callers can make
//! retry and presentation decisions without looking at transport details.

use std::fmt;

use serde::Serialize;

/// Maximum characters of a raw (non-JSON) error body kept as the message.
const MAX_RAW_MESSAGE_CHARS: usize = 500;

/// The closed error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing credentials. Not retryable.
    AuthenticationError,
    /// Retryable after a caller-chosen backoff.
    RateLimited,
    /// Transient outage or no response at all. Retryable with backoff.
    Unavailable,
    /// Malformed request. Not retryable without changing it.
    InvalidRequest,
    /// Provider answered but produced nothing usable. Retryable once.
    EmptyResponse,
    /// Upstream 5xx. Retryable with backoff.
    ProviderInternalError,
    /// Unclassified. Surfaced verbatim, never retried.
    Unknown,
}

impl ErrorKind {
    /// Stable snake_case code for wire-format error envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::ProviderInternalError => "provider_internal_error",
            ErrorKind::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::Unavailable
                | ErrorKind::EmptyResponse
                | ErrorKind::ProviderInternalError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is known about a failure at the point it is classified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifyInput {
    pub http_status: Option<u16>,
    /// No response was received (connect failure, timeout, broken read)
    pub transport_failure: bool,
    pub provider_message: Option<String>,
}

impl ClassifyInput {
    pub fn status(status: u16) -> Self {
        Self {
            http_status: Some(status),
            ..Self::default()
        }
    }

    pub fn transport() -> Self {
        Self {
            transport_failure: true,
            ..Self::default()
        }
    }
}

/// Map a failure to its [`ErrorKind`].
///
/// Rules are checked in order and every input gets exactly one kind.
/// A 2xx status only reaches this function when the body held no usable
/// choice, hence `EmptyResponse`.
pub fn classify(input: &ClassifyInput) -> ErrorKind {
    if input.transport_failure {
        return ErrorKind::Unavailable;
    }
    match input.http_status {
        Some(401) => ErrorKind::AuthenticationError,
        Some(429) => ErrorKind::RateLimited,
        Some(503) => ErrorKind::Unavailable,
        Some(400..=499) => ErrorKind::InvalidRequest,
        Some(500..=u16::MAX) => ErrorKind::ProviderInternalError,
        Some(200..=299) => ErrorKind::EmptyResponse,
        Some(_) | None => ErrorKind::Unknown,
    }
}

/// A classified provider failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{kind}{}: {}",
    describe_status(.http_status),
    .provider_message.as_deref().unwrap_or("no provider message")
)]
pub struct ProviderError {
    kind: ErrorKind,
    http_status: Option<u16>,
    provider_message: Option<String>,
}

fn describe_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl ProviderError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            http_status: None,
            provider_message: None,
        }
    }

    /// Classify and build in one step.
    pub fn classified(input: ClassifyInput) -> Self {
        Self {
            kind: classify(&input),
            http_status: input.http_status,
            provider_message: input.provider_message,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.provider_message = Some(message.into());
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest).with_message(message)
    }

    pub fn empty_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyResponse).with_message(message)
    }

    /// Build from a non-2xx response status and its body.
    pub fn from_response(status: u16, body: &str) -> Self {
        Self::classified(ClassifyInput {
            http_status: Some(status),
            transport_failure: false,
            provider_message: extract_provider_message(body),
        })
    }

    /// Build from a `reqwest` failure.
    ///
    /// Errors carrying a status are classified by it; everything else
    /// means no usable response arrived.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let message = err.to_string();
        match err.status() {
            Some(status) => Self::classified(ClassifyInput {
                http_status: Some(status.as_u16()),
                transport_failure: false,
                provider_message: Some(message),
            }),
            None => Self::classified(ClassifyInput {
                transport_failure: true,
                provider_message: Some(message),
                ..ClassifyInput::default()
            }),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn provider_message(&self) -> Option<&str> {
        self.provider_message.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_transport(err)
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// Understands the common envelopes:
/// - `{"error": {"message": "..."}}`
/// - `{"error": "..."}`
/// - `{"detail": "..."}` / `{"message": "..."}`
///
/// Anything else falls back to the raw text, truncated.
pub fn extract_provider_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let found = json["error"]["message"]
            .as_str()
            .or_else(|| json["error"].as_str())
            .or_else(|| json["detail"].as_str())
            .or_else(|| json["message"].as_str());
        if let Some(msg) = found {
            return Some(msg.to_string());
        }
    }

    Some(trimmed.chars().take(MAX_RAW_MESSAGE_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_rules() {
        let cases = [
            (401, ErrorKind::AuthenticationError),
            (429, ErrorKind::RateLimited),
            (503, ErrorKind::Unavailable),
            (400, ErrorKind::InvalidRequest),
            (403, ErrorKind::InvalidRequest),
            (404, ErrorKind::InvalidRequest),
            (499, ErrorKind::InvalidRequest),
            (500, ErrorKind::ProviderInternalError),
            (502, ErrorKind::ProviderInternalError),
            (529, ErrorKind::ProviderInternalError),
            (200, ErrorKind::EmptyResponse),
            (204, ErrorKind::EmptyResponse),
            (302, ErrorKind::Unknown),
            (100, ErrorKind::Unknown),
        ];
        for (status, expected) in cases {
            assert_eq!(
                classify(&ClassifyInput::status(status)),
                expected,
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_classify_transport_failure_wins() {
        assert_eq!(classify(&ClassifyInput::transport()), ErrorKind::Unavailable);
        let input = ClassifyInput {
            http_status: Some(401),
            transport_failure: true,
            provider_message: None,
        };
        assert_eq!(classify(&input), ErrorKind::Unavailable);
    }

    #[test]
    fn test_classify_nothing_known_is_unknown() {
        assert_eq!(classify(&ClassifyInput::default()), ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let input = ClassifyInput {
            http_status: Some(429),
            transport_failure: false,
            provider_message: Some("slow down".to_string()),
        };
        let first = classify(&input);
        for _ in 0..100 {
            assert_eq!(classify(&input), first);
        }
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(ErrorKind::EmptyResponse.is_retryable());
        assert!(ErrorKind::ProviderInternalError.is_retryable());
        assert!(!ErrorKind::AuthenticationError.is_retryable());
        assert!(!ErrorKind::InvalidRequest.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_from_response_extracts_openai_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let err = ProviderError::from_response(401, body);
        assert_eq!(err.kind(), ErrorKind::AuthenticationError);
        assert_eq!(err.http_status(), Some(401));
        assert_eq!(err.provider_message(), Some("Incorrect API key provided"));
    }

    #[test]
    fn test_extract_message_envelopes() {
        assert_eq!(
            extract_provider_message(r#"{"error":"model not found"}"#).as_deref(),
            Some("model not found")
        );
        assert_eq!(
            extract_provider_message(r#"{"detail":"Not Found"}"#).as_deref(),
            Some("Not Found")
        );
        assert_eq!(
            extract_provider_message(r#"{"message":"bad input","code":"x"}"#).as_deref(),
            Some("bad input")
        );
        assert_eq!(
            extract_provider_message(r#"{"unexpected":true}"#).as_deref(),
            Some(r#"{"unexpected":true}"#)
        );
    }

    #[test]
    fn test_extract_message_raw_text_fallback() {
        assert_eq!(
            extract_provider_message("Bad Gateway").as_deref(),
            Some("Bad Gateway")
        );
        assert_eq!(extract_provider_message("   "), None);

        let long = "x".repeat(2000);
        let msg = extract_provider_message(&long).unwrap();
        assert_eq!(msg.chars().count(), MAX_RAW_MESSAGE_CHARS);
    }

    #[test]
    fn test_display_includes_kind_status_and_message() {
        let err = ProviderError::from_response(429, r#"{"error":{"message":"Rate limit reached"}}"#);
        assert_eq!(
            err.to_string(),
            "rate_limited (HTTP 429): Rate limit reached"
        );

        let err = ProviderError::new(ErrorKind::Unknown);
        assert_eq!(err.to_string(), "unknown: no provider message");
    }
}
