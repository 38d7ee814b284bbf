// Troupe LLM - Retry policy and request hardening
//
// Bounded retry with exponential backoff and jitter, plus the size caps
// and header sanitization applied before anything reaches the wire.

use std::time::Duration;

use troupe_core::{TroupeError, TroupeResult};

/// Response bodies larger than this are rejected
pub const MAX_RESPONSE_BYTES: u64 = 100 * 1024 * 1024;

/// Constructed URLs longer than this are rejected
pub const MAX_URL_BYTES: usize = 2048;

/// Header values longer than this are truncated after sanitization
pub const MAX_HEADER_BYTES: usize = 8192;

/// Upper bound on the per-request timeout
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Retry configuration; bounds are enforced on construction
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Max retries is clamped into [0, 10]; the base delay floor is 1 ms.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.min(10),
            base_delay: base_delay.max(Duration::from_millis(1)),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Backoff for the given zero-based attempt:
    /// `clamp(d0 * 2^min(attempt, 5) + jitter, d0, 5 * d0)` with jitter
    /// uniform in ±d0/8.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let d0 = self.base_delay.as_millis() as i64;
        let exp = d0.saturating_mul(1 << attempt.min(5) as i64);
        let jitter_span = (d0 / 8).max(1);
        let jitter = rand::Rng::gen_range(&mut rand::thread_rng(), -jitter_span..=jitter_span);
        let delayed = (exp + jitter).clamp(d0, d0.saturating_mul(5));
        Duration::from_millis(delayed as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Whether a status/error pair merits another attempt
pub fn is_retryable(status: Option<u16>, error: &str) -> bool {
    if let Some(code) = status {
        if matches!(code, 429 | 502 | 503 | 504) {
            return true;
        }
    }
    let error = error.to_ascii_lowercase();
    error.contains("timeout") || error.contains("connection")
}

/// Stable user-facing message for a failed response
pub fn user_facing_error(status: u16, technical: &str) -> String {
    match status {
        400 => "Bad request - Please check your input parameters".to_string(),
        401 => "Unauthorized - Please check your authentication credentials".to_string(),
        403 => "Access forbidden - You don't have permission to access this resource".to_string(),
        404 => "Resource not found - The requested endpoint may not exist".to_string(),
        429 => "Rate limit exceeded - Please reduce request frequency and try again".to_string(),
        500 => "Internal server error - The server encountered an unexpected condition".to_string(),
        502 => "Bad gateway - The server received an invalid response from upstream".to_string(),
        503 => "Service unavailable - The server is temporarily overloaded or under maintenance"
            .to_string(),
        504 => "Gateway timeout - The server didn't receive a timely response from upstream"
            .to_string(),
        code if (400..500).contains(&code) => {
            format!("Client error ({}) - Please check your request", code)
        }
        code if code >= 500 => format!("Server error ({}) - Please try again later", code),
        code => format!("Unknown error ({}) - {}", code, technical),
    }
}

/// Map a failed status onto the error taxonomy
pub fn classify_status(status: u16, technical: &str) -> TroupeError {
    let message = user_facing_error(status, technical);
    match status {
        401 | 403 => TroupeError::Auth(message),
        404 => TroupeError::NotFound(message),
        429 => TroupeError::Quota(message),
        502..=504 => TroupeError::Transport(message),
        _ => TroupeError::Inference(message),
    }
}

/// Strip control characters (header injection) and truncate to the cap
pub fn sanitize_header_value(value: &str) -> String {
    let mut sanitized: String = value
        .chars()
        .filter(|c| !c.is_control() && *c != '\u{7f}')
        .collect();
    sanitized.truncate(MAX_HEADER_BYTES);
    sanitized
}

/// Validate URL shape and length
pub fn validate_url(url: &str) -> TroupeResult<()> {
    if url.is_empty() || url.len() > MAX_URL_BYTES {
        return Err(TroupeError::validation("URL empty or too long"));
    }
    // http(s)://host[:port][/path]
    let pattern = regex::Regex::new(
        r"^https?://[a-zA-Z0-9]([a-zA-Z0-9\-\.]*[a-zA-Z0-9])?(:\d{1,5})?(/.*)?$",
    )
    .map_err(|e| TroupeError::internal(e.to_string()))?;
    if !pattern.is_match(url) {
        return Err(TroupeError::validation(format!("invalid URL: {}", url)));
    }
    Ok(())
}

/// Join a base URL and an endpoint without doubling the slash
pub fn join_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_bounds() {
        let policy = RetryPolicy::new(50, Duration::from_millis(100));
        assert_eq!(policy.max_retries(), 10);
    }

    #[test]
    fn test_backoff_window() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        for attempt in 0..8 {
            let delay = policy.backoff(attempt).as_millis() as i64;
            assert!(delay >= 1000, "attempt {} delay {} below floor", attempt, delay);
            assert!(delay <= 5000, "attempt {} delay {} above cap", attempt, delay);
        }
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let policy = RetryPolicy::new(5, Duration::from_millis(200));
        // 200 * 2^4 = 3200 > cap 1000, so late attempts sit at the cap
        let late = policy.backoff(5).as_millis();
        assert_eq!(late, 1000);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(Some(429), ""));
        assert!(is_retryable(Some(502), ""));
        assert!(is_retryable(Some(503), ""));
        assert!(is_retryable(Some(504), ""));
        assert!(!is_retryable(Some(400), ""));
        assert!(!is_retryable(Some(401), ""));
        assert!(is_retryable(None, "connection reset by peer"));
        assert!(is_retryable(None, "operation Timeout"));
        assert!(!is_retryable(None, "tls error"));
    }

    #[test]
    fn test_user_facing_messages() {
        assert!(user_facing_error(401, "").contains("Unauthorized"));
        assert!(user_facing_error(429, "").contains("Rate limit"));
        assert!(user_facing_error(418, "").contains("Client error (418)"));
        assert!(user_facing_error(507, "").contains("Server error (507)"));
    }

    #[test]
    fn test_sanitize_header_strips_controls() {
        let dirty = "value\r\nInjected: yes\x07";
        let clean = sanitize_header_value(dirty);
        assert_eq!(clean, "valueInjected: yes");
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_url("http://localhost:8084/v1/health").is_ok());
        assert!(validate_url("https://inference.example.com").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("").is_err());
        let long = format!("http://example.com/{}", "a".repeat(MAX_URL_BYTES));
        assert!(validate_url(&long).is_err());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://x/", "/health"), "http://x/health");
        assert_eq!(join_url("http://x", "health"), "http://x/health");
    }
}
