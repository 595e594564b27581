//! Token usage accounting.
//!
//! Providers usually report usage on non-streaming calls and often omit it
//! when streaming. Missing counts are estimated at roughly four characters
//! per token. The estimate is an approximation only and is always flagged
//! with [`Usage::estimated`]; callers that need exact counts should use the
//! non-streaming path.

use crate::llm::build_messages;
use crate::types::{ChatCompletionRequest, Usage};

/// Characters per token assumed by the estimate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate tokens for one text segment: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> u32 {
    let tokens = text.chars().count().div_ceil(CHARS_PER_TOKEN);
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

/// Pass reported usage through, or estimate it from the two text segments.
pub fn reconcile(usage: Option<Usage>, prompt_text: &str, completion_text: &str) -> Usage {
    if let Some(reported) = usage {
        return reported;
    }
    let prompt_tokens = estimate_tokens(prompt_text);
    let completion_tokens = estimate_tokens(completion_text);
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens.saturating_add(completion_tokens),
        estimated: true,
    }
}

/// The prompt segment of a request: every message content sent upstream,
/// in order, concatenated.
pub fn prompt_text(request: &ChatCompletionRequest) -> String {
    build_messages(request)
        .iter()
        .map(|m| m.content())
        .collect()
}
