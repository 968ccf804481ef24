//! Compensation queue (`spec.md` §4.7): reconciles a dual write whose graph
//! leg failed after the vector leg succeeded, with bounded-concurrency
//! exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::CompensationConfig;
use crate::ports::extractor::Extraction;
use crate::ports::pubsub::MemoryEvent;
use crate::ports::{GraphStore, PubSub, VectorStore};
use crate::schema::MemoryId;
use crate::scope::Scope;

#[derive(Debug, Clone)]
pub struct CompensationTask {
    pub scope: Scope,
    pub id: MemoryId,
    pub extraction: Extraction,
    pub attempt: u32,
}

impl CompensationTask {
    pub fn new(scope: Scope, id: MemoryId, extraction: Extraction) -> Self {
        Self { scope, id, extraction, attempt: 0 }
    }
}

/// Narrow port handles a retry task needs, bundled so the worker never has
/// to hold a full `Context` (which itself owns the worker).
#[derive(Clone)]
struct WorkerDeps {
    graph_store: Arc<dyn GraphStore>,
    vector_store: Arc<dyn VectorStore>,
    pubsub: Arc<dyn PubSub>,
    config: CompensationConfig,
}

/// Drains a bounded channel of [`CompensationTask`]s with a fixed number of
/// concurrent retry tasks in flight (`spec.md` §4.7: "bounded concurrency"),
/// each retrying the graph leg with exponential backoff until it succeeds or
/// `max_attempts` is hit.
pub struct CompensationWorker {
    sender: mpsc::Sender<CompensationTask>,
    handle: JoinHandle<()>,
}

impl CompensationWorker {
    pub fn spawn(graph_store: Arc<dyn GraphStore>, vector_store: Arc<dyn VectorStore>, pubsub: Arc<dyn PubSub>, config: CompensationConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<CompensationTask>(config.queue_capacity.max(1));
        let deps = WorkerDeps { graph_store, vector_store, pubsub, config };
        let handle = tokio::spawn(run_worker(deps, receiver));
        Self { sender, handle }
    }

    /// Non-blocking enqueue: a full queue sheds the task rather than
    /// applying backpressure to the write path that called it.
    pub fn enqueue(&self, task: CompensationTask) {
        if let Err(err) = self.sender.try_send(task) {
            warn!(error = %err, "compensation queue full or closed, task dropped");
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn run_worker(deps: WorkerDeps, mut receiver: mpsc::Receiver<CompensationTask>) {
    let semaphore = Arc::new(Semaphore::new(deps.config.max_concurrent.max(1)));
    while let Some(task) = receiver.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let deps = deps.clone();
        tokio::spawn(async move {
            run_task(&deps, task).await;
            drop(permit);
        });
    }
}

#[instrument(skip(deps, task), fields(id = %task.id, attempt = task.attempt))]
async fn run_task(deps: &WorkerDeps, mut task: CompensationTask) {
    let policy = deps.config;
    loop {
        task.attempt += 1;
        match deps.graph_store.upsert_node(&task.scope, &task.id, &task.extraction.entities).await {
            Ok(()) => match deps.graph_store.upsert_relations(&task.scope, &task.id, &task.extraction.relations).await {
                Ok(()) => {
                    clear_degraded_flag(deps, &task).await;
                    info!("compensation succeeded");
                    return;
                }
                Err(e) => warn!(error = %e, "compensation retry failed on relations leg"),
            },
            Err(e) => warn!(error = %e, "compensation retry failed on node leg"),
        }

        if task.attempt >= policy.max_attempts {
            error!("compensation exhausted retries, marking permanently degraded");
            let _ = deps
                .pubsub
                .publish(
                    "memory.compensation_failed",
                    MemoryEvent::StatusChanged { scope: task.scope.clone(), id: task.id.clone(), new_status: "degraded".to_string() },
                )
                .await;
            return;
        }

        let backoff = backoff_for(&policy, task.attempt);
        tokio::time::sleep(backoff).await;
    }
}

async fn clear_degraded_flag(deps: &WorkerDeps, task: &CompensationTask) {
    if let Ok(Some(mut record)) = deps.vector_store.get(&task.scope, &task.id).await {
        if record.degraded {
            record.degraded = false;
            if let Err(e) = deps.vector_store.put_record(&task.scope, record).await {
                warn!(error = %e, "failed to clear degraded flag after compensation");
            }
        }
    }
}

fn backoff_for(policy: &CompensationConfig, attempt: u32) -> Duration {
    let exp = policy.backoff_factor.saturating_pow(attempt.saturating_sub(1));
    let secs = policy.base_backoff_secs.saturating_mul(exp as u64).min(policy.max_backoff_secs);
    Duration::from_secs(secs)
}

impl Drop for CompensationWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
