// Troupe Runtime - Async service layer
//
// A bounded priority queue drained by a fixed pool of worker tasks, with
// an operation registry, an event bus, and a retention reaper. Submission
// never blocks: a full queue resolves the returned future immediately.

pub mod events;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

use troupe_core::{AgentData, Event, EventKind, TroupeError, TroupeResult, Value};

pub use events::{EventBus, EventCallback};

/// How often the reaper wakes up
const REAPER_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long terminal operations stay queryable, in seconds
const RETENTION_SECS: i64 = 60 * 60;

/// Priority assigned to batch submissions
const BATCH_PRIORITY: i32 = 5;

/// Lifecycle of a submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// Registry entry tracking one operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub operation_id: String,
    pub operation_type: String,
    pub status: OperationStatus,
    pub result: AgentData,
    pub error: String,
    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// The work a task performs
pub type OperationFn = Box<dyn FnOnce() -> BoxFuture<'static, TroupeResult<AgentData>> + Send>;

struct QueuedTask {
    operation_id: String,
    priority: i32,
    seq: u64,
    callable: OperationFn,
    promise: oneshot::Sender<TroupeResult<AgentData>>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Max-heap: higher priority first, FIFO within a priority
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Handle on a submitted operation
pub struct Submission {
    pub operation_id: String,
    receiver: oneshot::Receiver<TroupeResult<AgentData>>,
}

impl Submission {
    /// Resolve to the operation outcome. A dropped promise (shutdown,
    /// cancellation) surfaces as `TroupeError::Cancelled`.
    pub async fn wait(self) -> TroupeResult<AgentData> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(TroupeError::Cancelled),
        }
    }
}

/// Queue introspection snapshot
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatistics {
    pub current_queue_size: usize,
    pub max_queue_size: usize,
    pub completed_operations: u64,
    pub failed_operations: u64,
    pub cancelled_operations: u64,
    pub worker_count: usize,
}

/// Worker introspection snapshot
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatistics {
    pub worker_count: usize,
    pub running: bool,
    pub total_operations_completed: u64,
    pub total_operations_failed: u64,
    pub total_operations_cancelled: u64,
}

struct ServiceInner {
    running: AtomicBool,
    queue: Mutex<BinaryHeap<QueuedTask>>,
    queue_notify: Notify,
    shutdown_notify: Notify,
    max_queue_size: AtomicUsize,
    seq: AtomicU64,
    operations: DashMap<String, Arc<Mutex<OperationRecord>>>,
    events: EventBus,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    worker_count: usize,
}

/// The async service layer: worker pool + priority queue + registry + bus
pub struct AsyncServiceLayer {
    inner: Arc<ServiceInner>,
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl AsyncServiceLayer {
    /// `worker_count` 0 selects the host parallelism
    pub fn new(worker_count: usize, max_queue_size: usize) -> Self {
        let worker_count = if worker_count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            worker_count
        };

        Self {
            inner: Arc::new(ServiceInner {
                running: AtomicBool::new(false),
                queue: Mutex::new(BinaryHeap::new()),
                queue_notify: Notify::new(),
                shutdown_notify: Notify::new(),
                max_queue_size: AtomicUsize::new(max_queue_size.max(1)),
                seq: AtomicU64::new(0),
                operations: DashMap::new(),
                events: EventBus::new(),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
                worker_count,
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Spawn workers and the retention reaper; idempotent
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.handles.lock();
        for worker_id in 0..self.inner.worker_count {
            let inner = self.inner.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(inner, worker_id).await;
            }));
        }

        let inner = self.inner.clone();
        handles.push(tokio::spawn(async move {
            reaper_loop(inner).await;
        }));

        info!(workers = self.inner.worker_count, "async service layer started");
    }

    /// Submit one operation. Returns a handle whose future resolves when a
    /// worker completes the callable, or immediately when the queue is at
    /// capacity.
    pub fn submit(
        &self,
        operation_type: impl Into<String>,
        priority: i32,
        callable: OperationFn,
    ) -> Submission {
        let operation_type = operation_type.into();
        let operation_id = generate_operation_id();
        let (tx, rx) = oneshot::channel();

        let record = Arc::new(Mutex::new(OperationRecord {
            operation_id: operation_id.clone(),
            operation_type,
            status: OperationStatus::Pending,
            result: AgentData::new(),
            error: String::new(),
            started_at: Utc::now(),
            ended_at: None,
        }));
        self.inner
            .operations
            .insert(operation_id.clone(), record.clone());

        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.max_queue_size.load(Ordering::SeqCst) {
                drop(queue);
                {
                    let mut record = record.lock();
                    record.status = OperationStatus::Failed;
                    record.error = "Queue is full".to_string();
                    record.ended_at = Some(Utc::now());
                }
                self.inner.failed.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(Err(TroupeError::conflict("Queue is full")));
                warn!(operation_id = %operation_id, "queue full, rejecting submission");
                return Submission {
                    operation_id,
                    receiver: rx,
                };
            }

            queue.push(QueuedTask {
                operation_id: operation_id.clone(),
                priority,
                seq: self.inner.seq.fetch_add(1, Ordering::SeqCst),
                callable,
                promise: tx,
            });
        }

        self.inner.queue_notify.notify_one();
        Submission {
            operation_id,
            receiver: rx,
        }
    }

    /// Run a sequence of callables as one composite operation on a single
    /// worker; per-item outcomes land in `results`.
    pub fn submit_batch(
        &self,
        operation_type: impl Into<String>,
        callables: Vec<OperationFn>,
    ) -> Submission {
        self.submit(
            operation_type,
            BATCH_PRIORITY,
            Box::new(move || {
                async move {
                    let mut results: Vec<Value> = Vec::with_capacity(callables.len());
                    for (index, callable) in callables.into_iter().enumerate() {
                        let item = match callable().await {
                            Ok(data) => AgentData::new()
                                .with("index", index)
                                .with("success", true)
                                .with("result", data),
                            Err(e) => AgentData::new()
                                .with("index", index)
                                .with("success", false)
                                .with("error", e.to_string()),
                        };
                        results.push(Value::Map(item));
                    }
                    let count = results.len();
                    Ok(AgentData::new()
                        .with("results", Value::List(results))
                        .with("count", count))
                }
                .boxed()
            }),
        )
    }

    /// Best-effort cancellation: only PENDING operations are cancelled
    pub fn cancel(&self, operation_id: &str) -> bool {
        let Some(record) = self
            .inner
            .operations
            .get(operation_id)
            .map(|r| r.value().clone())
        else {
            return false;
        };

        {
            let mut record = record.lock();
            if record.status != OperationStatus::Pending {
                return false;
            }
            record.status = OperationStatus::Cancelled;
            record.ended_at = Some(Utc::now());
        }

        self.inner.cancelled.fetch_add(1, Ordering::SeqCst);
        self.inner
            .events
            .broadcast(Event::new(EventKind::OperationCancelled, operation_id));
        true
    }

    pub fn get_operation_status(&self, operation_id: &str) -> Option<OperationRecord> {
        self.inner
            .operations
            .get(operation_id)
            .map(|r| r.value().lock().clone())
    }

    pub fn get_all_operations(&self) -> Vec<OperationRecord> {
        let mut records: Vec<OperationRecord> = self
            .inner
            .operations
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        records
    }

    pub fn get_operations_by_type(&self, operation_type: &str) -> Vec<OperationRecord> {
        self.get_all_operations()
            .into_iter()
            .filter(|r| r.operation_type == operation_type)
            .collect()
    }

    pub fn queue_size(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn set_max_queue_size(&self, max_size: usize) {
        self.inner
            .max_queue_size
            .store(max_size.max(1), Ordering::SeqCst);
    }

    pub fn queue_statistics(&self) -> QueueStatistics {
        QueueStatistics {
            current_queue_size: self.queue_size(),
            max_queue_size: self.inner.max_queue_size.load(Ordering::SeqCst),
            completed_operations: self.inner.completed.load(Ordering::SeqCst),
            failed_operations: self.inner.failed.load(Ordering::SeqCst),
            cancelled_operations: self.inner.cancelled.load(Ordering::SeqCst),
            worker_count: self.inner.worker_count,
        }
    }

    pub fn worker_statistics(&self) -> WorkerStatistics {
        WorkerStatistics {
            worker_count: self.inner.worker_count,
            running: self.is_running(),
            total_operations_completed: self.inner.completed.load(Ordering::SeqCst),
            total_operations_failed: self.inner.failed.load(Ordering::SeqCst),
            total_operations_cancelled: self.inner.cancelled.load(Ordering::SeqCst),
        }
    }

    /// Stop workers and the reaper, then clear the registry. In-flight
    /// tasks finish; pending tasks observe a dropped promise. Idempotent.
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.inner.queue_notify.notify_waiters();
        self.inner.shutdown_notify.notify_waiters();

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }

        self.inner.queue.lock().clear();
        self.inner.operations.clear();
        info!("async service layer stopped");
    }

    #[cfg(test)]
    fn reap_now(&self, older_than: chrono::Duration) {
        reap(&self.inner, older_than);
    }
}

async fn worker_loop(inner: Arc<ServiceInner>, worker_id: usize) {
    debug!(worker_id, "worker started");
    loop {
        if !inner.running.load(Ordering::SeqCst) {
            break;
        }

        let notified = inner.queue_notify.notified();
        let task = inner.queue.lock().pop();

        let Some(task) = task else {
            // Re-check before sleeping so a push between pop and here is
            // not lost; notified() was created before the pop.
            if !inner.running.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
            continue;
        };

        run_task(&inner, task).await;
    }
    debug!(worker_id, "worker stopped");
}

async fn run_task(inner: &Arc<ServiceInner>, task: QueuedTask) {
    let record = inner
        .operations
        .get(&task.operation_id)
        .map(|r| r.value().clone());

    // Discard tasks cancelled while queued
    if let Some(record) = &record {
        let mut record = record.lock();
        if record.status == OperationStatus::Cancelled {
            drop(record);
            let _ = task.promise.send(Err(TroupeError::Cancelled));
            return;
        }
        record.status = OperationStatus::Running;
    }

    inner
        .events
        .broadcast(Event::new(EventKind::OperationStarted, &*task.operation_id));

    let outcome = std::panic::AssertUnwindSafe((task.callable)())
        .catch_unwind()
        .await;
    let ended_at = Utc::now();

    match outcome {
        Ok(Ok(data)) => {
            if let Some(record) = &record {
                let mut record = record.lock();
                record.status = OperationStatus::Completed;
                record.result = data.clone();
                record.ended_at = Some(ended_at);
            }
            inner.completed.fetch_add(1, Ordering::SeqCst);
            inner.events.broadcast(
                Event::new(EventKind::OperationCompleted, &*task.operation_id)
                    .with_payload(data.clone()),
            );
            let _ = task.promise.send(Ok(data));
        }
        Ok(Err(e)) => {
            fail_task(inner, &task.operation_id, record.as_ref(), e.to_string(), ended_at);
            let _ = task.promise.send(Err(e));
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            fail_task(inner, &task.operation_id, record.as_ref(), message.clone(), ended_at);
            let _ = task.promise.send(Err(TroupeError::internal(message)));
        }
    }
}

fn fail_task(
    inner: &Arc<ServiceInner>,
    operation_id: &str,
    record: Option<&Arc<Mutex<OperationRecord>>>,
    error: String,
    ended_at: DateTime<Utc>,
) {
    if let Some(record) = record {
        let mut record = record.lock();
        record.status = OperationStatus::Failed;
        record.error = error.clone();
        record.ended_at = Some(ended_at);
    }
    inner.failed.fetch_add(1, Ordering::SeqCst);
    inner.events.broadcast(
        Event::new(EventKind::OperationFailed, operation_id)
            .with_payload(AgentData::new().with("error", error)),
    );
}

async fn reaper_loop(inner: Arc<ServiceInner>) {
    loop {
        tokio::select! {
            _ = inner.shutdown_notify.notified() => break,
            _ = tokio::time::sleep(REAPER_INTERVAL) => {
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                reap(&inner, chrono::Duration::seconds(RETENTION_SECS));
            }
        }
    }
}

fn reap(inner: &Arc<ServiceInner>, older_than: chrono::Duration) {
    let cutoff = Utc::now() - older_than;
    inner.operations.retain(|_, record| {
        let record = record.lock();
        match record.ended_at {
            Some(ended) if record.status.is_terminal() => ended >= cutoff,
            _ => true,
        }
    });
}

/// Collision-resistant opaque id: random hex plus a millisecond timestamp
fn generate_operation_id() -> String {
    let mut rng = rand::thread_rng();
    let nonce: u32 = rng.gen();
    format!("op_{:08x}_{}", nonce, Utc::now().timestamp_millis())
}
