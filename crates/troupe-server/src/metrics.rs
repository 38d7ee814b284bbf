// Troupe Server - Metrics collection
//
// Thread-safe counters, a sliding window of request durations for
// percentiles, and per-endpoint/agent/workflow aggregates. Snapshots are
// available as JSON and in Prometheus text exposition format.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::state::AppState;

/// Sliding window length for percentile estimates
const DURATION_WINDOW: usize = 1000;

/// Histogram bucket bounds in milliseconds
const BUCKETS_MS: [u64; 12] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

#[derive(Debug, Default, Clone)]
struct EndpointStats {
    request_count: u64,
    total_duration_ms: u64,
    last_request: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
struct AgentOpStats {
    operation_count: u64,
    total_duration_ms: u64,
    last_operation: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
struct WorkflowStats {
    execution_count: u64,
    success_count: u64,
    error_count: u64,
    cancelled_count: u64,
    timeout_count: u64,
    total_duration_ms: u64,
    last_execution: Option<DateTime<Utc>>,
}

/// Outcome tag for workflow executions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Success,
    Error,
    Cancelled,
    Timeout,
}

/// Collects request, agent, and workflow metrics
pub struct MetricsCollector {
    started_at: DateTime<Utc>,
    total_requests: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    durations: Mutex<VecDeque<u64>>,
    endpoints: Mutex<HashMap<String, EndpointStats>>,
    agents: Mutex<HashMap<String, AgentOpStats>>,
    workflows: Mutex<HashMap<String, WorkflowStats>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total_requests: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            durations: Mutex::new(VecDeque::with_capacity(DURATION_WINDOW)),
            endpoints: Mutex::new(HashMap::new()),
            agents: Mutex::new(HashMap::new()),
            workflows: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_request(&self, endpoint: &str, success: bool, duration_ms: u64) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        if success {
            self.success_count.fetch_add(1, Ordering::SeqCst);
        } else {
            self.error_count.fetch_add(1, Ordering::SeqCst);
        }

        {
            let mut durations = self.durations.lock();
            if durations.len() == DURATION_WINDOW {
                durations.pop_front();
            }
            durations.push_back(duration_ms);
        }

        let mut endpoints = self.endpoints.lock();
        let stats = endpoints.entry(endpoint.to_string()).or_default();
        stats.request_count += 1;
        stats.total_duration_ms += duration_ms;
        stats.last_request = Some(Utc::now());
    }

    pub fn record_agent_operation(&self, agent_id: &str, duration_ms: u64) {
        let mut agents = self.agents.lock();
        let stats = agents.entry(agent_id.to_string()).or_default();
        stats.operation_count += 1;
        stats.total_duration_ms += duration_ms;
        stats.last_operation = Some(Utc::now());
    }

    pub fn record_workflow_execution(
        &self,
        workflow_id: &str,
        outcome: WorkflowOutcome,
        duration_ms: u64,
    ) {
        let mut workflows = self.workflows.lock();
        let stats = workflows.entry(workflow_id.to_string()).or_default();
        stats.execution_count += 1;
        match outcome {
            WorkflowOutcome::Success => stats.success_count += 1,
            WorkflowOutcome::Error => stats.error_count += 1,
            WorkflowOutcome::Cancelled => stats.cancelled_count += 1,
            WorkflowOutcome::Timeout => stats.timeout_count += 1,
        }
        stats.total_duration_ms += duration_ms;
        stats.last_execution = Some(Utc::now());
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::SeqCst)
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::SeqCst)
    }

    fn percentile(sorted: &[u64], p: f64) -> u64 {
        if sorted.is_empty() {
            return 0;
        }
        let rank = ((sorted.len() as f64) * p).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }

    /// Full JSON snapshot
    pub fn snapshot_json(&self) -> serde_json::Value {
        let total = self.total_requests();
        let success = self.success_count();
        let error = self.error_count();
        let uptime_ms = (Utc::now() - self.started_at).num_milliseconds();

        let mut sorted: Vec<u64> = self.durations.lock().iter().copied().collect();
        sorted.sort_unstable();
        let avg = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
        };

        let endpoints: Vec<serde_json::Value> = {
            let mut entries: Vec<_> = self
                .endpoints
                .lock()
                .iter()
                .map(|(endpoint, stats)| {
                    json!({
                        "endpoint": endpoint,
                        "request_count": stats.request_count,
                        "avg_duration_ms": if stats.request_count > 0 {
                            stats.total_duration_ms as f64 / stats.request_count as f64
                        } else {
                            0.0
                        },
                        "last_request": stats.last_request.map(|t| t.timestamp()),
                    })
                })
                .collect();
            entries.sort_by_key(|e| e["endpoint"].as_str().map(|s| s.to_string()));
            entries
        };

        let agents: Vec<serde_json::Value> = self
            .agents
            .lock()
            .iter()
            .map(|(agent_id, stats)| {
                json!({
                    "agent_id": agent_id,
                    "operation_count": stats.operation_count,
                    "avg_duration_ms": if stats.operation_count > 0 {
                        stats.total_duration_ms as f64 / stats.operation_count as f64
                    } else {
                        0.0
                    },
                    "last_operation": stats.last_operation.map(|t| t.timestamp()),
                })
            })
            .collect();

        let workflows: Vec<serde_json::Value> = self
            .workflows
            .lock()
            .iter()
            .map(|(workflow_id, stats)| {
                json!({
                    "workflow_id": workflow_id,
                    "execution_count": stats.execution_count,
                    "success_count": stats.success_count,
                    "error_count": stats.error_count,
                    "cancelled_count": stats.cancelled_count,
                    "timeout_count": stats.timeout_count,
                    "success_rate": if stats.execution_count > 0 {
                        stats.success_count as f64 / stats.execution_count as f64
                    } else {
                        0.0
                    },
                    "avg_duration_ms": if stats.execution_count > 0 {
                        stats.total_duration_ms as f64 / stats.execution_count as f64
                    } else {
                        0.0
                    },
                    "last_execution": stats.last_execution.map(|t| t.timestamp()),
                })
            })
            .collect();

        json!({
            "system": {
                "uptime_ms": uptime_ms,
                "uptime_hours": uptime_ms / (1000 * 60 * 60),
                "worker_threads": std::thread::available_parallelism().map(|n| n.get()).unwrap_or(0),
            },
            "requests": {
                "total_count": total,
                "success_count": success,
                "error_count": error,
                "success_rate": if total > 0 { success as f64 / total as f64 } else { 0.0 },
                "avg_duration_ms": avg,
                "p50_duration_ms": Self::percentile(&sorted, 0.50),
                "p95_duration_ms": Self::percentile(&sorted, 0.95),
                "p99_duration_ms": Self::percentile(&sorted, 0.99),
            },
            "endpoints": endpoints,
            "agents": agents,
            "workflows": workflows,
        })
    }

    /// Prometheus text exposition
    pub fn prometheus_text(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP troupe_requests_total Total number of HTTP requests\n");
        out.push_str("# TYPE troupe_requests_total counter\n");
        out.push_str(&format!("troupe_requests_total {}\n\n", self.total_requests()));

        out.push_str("# HELP troupe_requests_success_total Total number of successful HTTP requests\n");
        out.push_str("# TYPE troupe_requests_success_total counter\n");
        out.push_str(&format!(
            "troupe_requests_success_total {}\n\n",
            self.success_count()
        ));

        out.push_str("# HELP troupe_requests_error_total Total number of failed HTTP requests\n");
        out.push_str("# TYPE troupe_requests_error_total counter\n");
        out.push_str(&format!("troupe_requests_error_total {}\n\n", self.error_count()));

        out.push_str("# HELP troupe_uptime_seconds System uptime in seconds\n");
        out.push_str("# TYPE troupe_uptime_seconds gauge\n");
        out.push_str(&format!(
            "troupe_uptime_seconds {}\n\n",
            (Utc::now() - self.started_at).num_seconds()
        ));

        let durations: Vec<u64> = self.durations.lock().iter().copied().collect();
        if !durations.is_empty() {
            out.push_str("# HELP troupe_request_duration_ms HTTP request duration in milliseconds\n");
            out.push_str("# TYPE troupe_request_duration_ms histogram\n");
            for bound in BUCKETS_MS {
                let count = durations.iter().filter(|d| **d <= bound).count();
                out.push_str(&format!(
                    "troupe_request_duration_ms_bucket{{le=\"{}\"}} {}\n",
                    bound, count
                ));
            }
            out.push_str(&format!(
                "troupe_request_duration_ms_bucket{{le=\"+Inf\"}} {}\n",
                durations.len()
            ));
            out.push_str(&format!(
                "troupe_request_duration_ms_count {}\n",
                durations.len()
            ));
            out.push_str(&format!(
                "troupe_request_duration_ms_sum {}\n\n",
                durations.iter().sum::<u64>()
            ));
        }

        out.push_str("# HELP troupe_agent_operations_total Total number of agent operations\n");
        out.push_str("# TYPE troupe_agent_operations_total counter\n");
        for (agent_id, stats) in self.agents.lock().iter() {
            out.push_str(&format!(
                "troupe_agent_operations_total{{agent_id=\"{}\"}} {}\n",
                agent_id, stats.operation_count
            ));
        }
        out.push('\n');

        out.push_str("# HELP troupe_workflow_executions_total Total number of workflow executions\n");
        out.push_str("# TYPE troupe_workflow_executions_total counter\n");
        for (workflow_id, stats) in self.workflows.lock().iter() {
            out.push_str(&format!(
                "troupe_workflow_executions_total{{workflow_id=\"{}\"}} {}\n",
                workflow_id, stats.execution_count
            ));
        }

        out
    }
}

/// Middleware recording duration and outcome for every request
pub async fn track_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let endpoint = format!("{} {}", request.method(), endpoint);

    let started = std::time::Instant::now();
    let response = next.run(request).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let success = response.status().is_success();
    state.metrics.record_request(&endpoint, success, duration_ms);
    response
}
