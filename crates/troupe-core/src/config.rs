// Troupe Core - Runtime configuration
//
// The already-parsed configuration consumed by the runtime and the server
// binary. YAML parsing happens at the edge (trouped); everything here is
// plain serde structs with defaults.

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// HTTP listen address, e.g. "127.0.0.1:8080"
    #[serde(default)]
    pub listen_address: Option<String>,

    #[serde(default)]
    pub service: ServiceSettings,

    #[serde(default)]
    pub inference: InferenceSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Agents seeded at startup
    #[serde(default)]
    pub agents: Vec<AgentSettings>,
}

/// Async service layer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Worker task count; 0 means host parallelism
    #[serde(default)]
    pub workers: usize,

    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            max_queue_size: default_max_queue_size(),
        }
    }
}

fn default_max_queue_size() -> usize {
    crate::DEFAULT_MAX_QUEUE_SIZE
}

/// Outbound inference service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    #[serde(default = "default_inference_url")]
    pub base_url: String,

    /// Bearer token forwarded to the inference service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: default_inference_url(),
            api_key: None,
            timeout_secs: default_inference_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_inference_url() -> String {
    "http://127.0.0.1:8084".to_string()
}

fn default_inference_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Path of the rotating log file; console only when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            max_file_bytes: default_max_file_bytes(),
            max_backups: default_max_backups(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_backups() -> usize {
    5
}

/// Model parameters applied to an agent's inference calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// Per-agent endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_inference_timeout(),
            endpoint: None,
        }
    }
}

fn default_model() -> String {
    "default".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

/// One agent definition from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    pub name: String,

    #[serde(rename = "type", default = "default_agent_type")]
    pub agent_type: String,

    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Built-in function names enabled on the agent; empty = default set
    #[serde(default)]
    pub functions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub model: ModelParameters,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_true")]
    pub auto_start: bool,
}

impl AgentSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type: default_agent_type(),
            capabilities: Vec::new(),
            functions: Vec::new(),
            system_prompt: None,
            model: ModelParameters::default(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            auto_start: true,
        }
    }
}

fn default_agent_type() -> String {
    "generic".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    crate::DEFAULT_MAX_CONCURRENT_JOBS
}

fn default_heartbeat_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.service.max_queue_size, 1000);
        assert_eq!(config.inference.timeout_secs, 30);
        assert_eq!(config.inference.max_retries, 3);
        assert_eq!(config.logging.level, "info");
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_yaml_parse_minimal() {
        let yaml = r#"
            listen_address: "127.0.0.1:9090"
            agents:
              - name: researcher
                capabilities: [search, summarize]
                model:
                  model: phi-3
                  temperature: 0.2
        "#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen_address.as_deref(), Some("127.0.0.1:9090"));
        assert_eq!(config.agents.len(), 1);
        let agent = &config.agents[0];
        assert_eq!(agent.name, "researcher");
        assert_eq!(agent.agent_type, "generic");
        assert_eq!(agent.max_concurrent_jobs, 5);
        assert!(agent.auto_start);
        assert_eq!(agent.model.model, "phi-3");
    }

    #[test]
    fn test_yaml_parse_logging_section() {
        let yaml = r#"
            logging:
              level: debug
              file: ./troupe.log
              max_backups: 3
        "#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file.as_deref(), Some("./troupe.log"));
        assert_eq!(config.logging.max_backups, 3);
        assert_eq!(config.logging.max_file_bytes, 50 * 1024 * 1024);
    }
}
