// Troupe LLM - Inference service client
//
// Speaks JSON-over-HTTP to the external inference service. Every call goes
// through the retry wrapper; callers never see a raw transport error, only
// the TroupeError taxonomy with user-facing messages.

use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use troupe_core::{AgentData, InferenceSettings, TroupeError, TroupeResult};

use crate::retry::{
    classify_status, is_retryable, join_url, sanitize_header_value, validate_url, RetryPolicy,
    MAX_RESPONSE_BYTES, MAX_TIMEOUT_SECS,
};

/// Client for the external inference/retrieval service
pub struct InferenceClient {
    base_url: String,
    api_key: Option<String>,
    policy: RetryPolicy,
    http: reqwest::Client,
}

impl InferenceClient {
    pub fn new(settings: InferenceSettings) -> TroupeResult<Self> {
        validate_url(&settings.base_url)?;

        let timeout_secs = settings.timeout_secs.clamp(1, MAX_TIMEOUT_SECS);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TroupeError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key,
            policy: RetryPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.retry_delay_ms),
            ),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat completion; accepts both OpenAI-style and flat response bodies
    pub async fn chat(
        &self,
        model: &str,
        message: &str,
        system_prompt: Option<&str>,
    ) -> TroupeResult<String> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": message}));

        let body = json!({
            "model": model,
            "messages": messages,
        });

        let response = self.post_json("/chat/completions", body).await?;

        if let Some(content) = response
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
        {
            return Ok(content.to_string());
        }
        if let Some(content) = response.get("content").and_then(|v| v.as_str()) {
            return Ok(content.to_string());
        }

        Err(TroupeError::inference(
            "Unexpected response format from chat endpoint",
        ))
    }

    /// Raw completion with caller-supplied sampling parameters
    pub async fn complete(
        &self,
        model: &str,
        prompt: &str,
        params: &AgentData,
    ) -> TroupeResult<AgentData> {
        let mut body = json!({
            "model": model,
            "prompt": prompt,
        });
        if let (Some(map), serde_json::Value::Object(extra)) =
            (body.as_object_mut(), params.to_json_value())
        {
            for (key, value) in extra {
                map.insert(key, value);
            }
        }

        let response = self.post_json("/completions", body).await?;
        AgentData::from_json_value(response)
    }

    /// Model catalog; tries `/models` then `/v1/models`
    pub async fn list_models(&self) -> TroupeResult<Vec<String>> {
        let response = match self.get_json("/models").await {
            Ok(value) => value,
            Err(TroupeError::NotFound(_)) => self.get_json("/v1/models").await?,
            Err(e) => return Err(e),
        };

        let items = response
            .get("data")
            .and_then(|v| v.as_array())
            .or_else(|| response.get("models").and_then(|v| v.as_array()))
            .cloned()
            .unwrap_or_default();

        Ok(items
            .iter()
            .filter_map(|item| {
                item.get("id")
                    .or_else(|| item.get("model_id"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| item.as_str().map(|s| s.to_string()))
            })
            .collect())
    }

    /// Embedding vector for a text
    pub async fn embed(&self, text: &str, model: &str) -> TroupeResult<Vec<f64>> {
        let body = json!({"model": model, "input": text});
        let response = self.post_json("/embeddings", body).await?;

        let vector = response
            .pointer("/data/0/embedding")
            .or_else(|| response.get("embedding"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| TroupeError::inference("No embedding in response"))?;

        Ok(vector.iter().filter_map(|v| v.as_f64()).collect())
    }

    /// Liveness probe; tries `/health` then `/v1/health`
    pub async fn health(&self) -> bool {
        for endpoint in ["/health", "/v1/health"] {
            if self.get_json(endpoint).await.is_ok() {
                return true;
            }
        }
        false
    }

    /// Vector search over the document store (`/retrieve`)
    pub async fn search_documents(
        &self,
        query: &str,
        k: usize,
        filters: &AgentData,
    ) -> TroupeResult<Vec<serde_json::Value>> {
        let mut body = json!({
            "query": query,
            "limit": k,
        });
        if !filters.is_empty() {
            body["filters"] = filters.to_json_value();
        }

        let response = self.post_json("/retrieve", body).await?;
        Ok(response
            .get("documents")
            .or_else(|| response.get("results"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Add one document; the endpoint expects `{documents: [..]}`
    pub async fn add_document(&self, document: serde_json::Value) -> TroupeResult<serde_json::Value> {
        let body = json!({"documents": [document]});
        self.post_json("/add_documents", body).await
    }

    /// Remove one document; the endpoint expects `{ids: [..]}`
    pub async fn remove_document(&self, document_id: &str) -> TroupeResult<serde_json::Value> {
        let body = json!({"ids": [document_id]});
        self.post_json("/remove_documents", body).await
    }

    /// Web search through the service; degrades gracefully when the
    /// endpoint is not deployed
    pub async fn internet_search(
        &self,
        query: &str,
        num_results: usize,
    ) -> TroupeResult<serde_json::Value> {
        let body = json!({
            "query": query,
            "num_results": num_results,
        });

        match self.post_json("/search", body).await {
            Ok(response) => Ok(response),
            Err(TroupeError::NotFound(message)) => {
                warn!("internet search endpoint not available: {}", message);
                Ok(json!({
                    "results": [],
                    "query": query,
                    "unavailable": true,
                    "message": "Internet search endpoint not available on server",
                }))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_json(&self, endpoint: &str) -> TroupeResult<serde_json::Value> {
        self.request_with_retry(reqwest::Method::GET, endpoint, None)
            .await
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> TroupeResult<serde_json::Value> {
        self.request_with_retry(reqwest::Method::POST, endpoint, Some(body))
            .await
    }

    /// One request through the retry wrapper. Retries on 429/502/503/504
    /// and transport errors mentioning timeouts or connections; backoff is
    /// exponential with jitter, clamped into [d0, 5*d0].
    async fn request_with_retry(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> TroupeResult<serde_json::Value> {
        let url = join_url(&self.base_url, endpoint);
        validate_url(&url)?;

        let mut attempt: u32 = 0;
        loop {
            debug!(%method, %url, attempt, "inference request");

            match self.perform(method.clone(), &url, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err((status, error)) => {
                    let retryable = is_retryable(status, &error);
                    if !retryable || attempt >= self.policy.max_retries() {
                        return Err(match status {
                            Some(code) => classify_status(code, &error),
                            None => TroupeError::transport(error),
                        });
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.policy.max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "inference request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Single attempt; `Err` carries (status, technical message)
    async fn perform(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, (Option<u16>, String)> {
        let mut request = self
            .http
            .request(method, url)
            .header("Content-Type", "application/json");

        if let Some(key) = &self.api_key {
            let value = sanitize_header_value(&format!("Bearer {}", key));
            request = request.header("Authorization", value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| (None, e.to_string()))?;

        let status = response.status().as_u16();

        if let Some(length) = response.content_length() {
            if length > MAX_RESPONSE_BYTES {
                return Err((Some(status), "Response too large".to_string()));
            }
        }

        let bytes = response.bytes().await.map_err(|e| (Some(status), e.to_string()))?;
        if bytes.len() as u64 > MAX_RESPONSE_BYTES {
            return Err((Some(status), "Response too large".to_string()));
        }

        if !(200..300).contains(&status) {
            let body_text = String::from_utf8_lossy(&bytes).to_string();
            return Err((Some(status), body_text));
        }

        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| (Some(status), format!("invalid JSON response: {}", e)))
    }
}
