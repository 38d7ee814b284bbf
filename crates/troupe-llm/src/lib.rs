// Troupe LLM - Outbound client for the external inference service
//
// The runtime consumes the inference/retrieval/search backend through the
// narrow InferenceClient interface. All requests go through a bounded
// retry wrapper with backoff, size caps, and header sanitization.

pub mod client;
pub mod retry;

pub use client::InferenceClient;
pub use retry::{
    is_retryable, sanitize_header_value, user_facing_error, validate_url, RetryPolicy,
    MAX_HEADER_BYTES, MAX_RESPONSE_BYTES, MAX_TIMEOUT_SECS, MAX_URL_BYTES,
};
