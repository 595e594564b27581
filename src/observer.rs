//! Observability hooks.
//!
//! Adapters report what they do through an injected [`Observer`] instead of
//! logging directly, so the library keeps no process-wide state and tests
//! can watch the request path.

use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::types::Usage;

/// Sink for request lifecycle events. Every method defaults to a no-op.
pub trait Observer: Send + Sync {
    fn request_started(&self, _provider: &str, _model: &str, _streaming: bool) {}

    fn request_succeeded(&self, _provider: &str, _model: &str, _usage: Option<&Usage>) {}

    fn request_failed(&self, _provider: &str, _error: &ProviderError) {}

    /// A stream line was dropped because its payload could not be parsed.
    fn chunk_skipped(&self, _provider: &str, _line: &str, _reason: &str) {}

    fn stream_finished(&self, _provider: &str, _deltas: usize) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

/// Longest line preview included in a skipped-chunk event.
const LINE_PREVIEW_CHARS: usize = 100;

impl Observer for TracingObserver {
    fn request_started(&self, provider: &str, model: &str, streaming: bool) {
        debug!(provider, model, streaming, "chat request started");
    }

    fn request_succeeded(&self, provider: &str, model: &str, usage: Option<&Usage>) {
        info!(
            provider,
            model,
            prompt_tokens = usage.map(|u| u.prompt_tokens),
            completion_tokens = usage.map(|u| u.completion_tokens),
            "chat request completed"
        );
    }

    fn request_failed(&self, provider: &str, error: &ProviderError) {
        warn!(
            provider,
            kind = error.kind().as_str(),
            status = error.http_status(),
            message = error.provider_message(),
            "chat request failed"
        );
    }

    fn chunk_skipped(&self, provider: &str, line: &str, reason: &str) {
        let preview: String = line.chars().take(LINE_PREVIEW_CHARS).collect();
        warn!(provider, reason, line = %preview, "skipping malformed stream chunk");
    }

    fn stream_finished(&self, provider: &str, deltas: usize) {
        debug!(provider, deltas, "chat stream finished");
    }
}
