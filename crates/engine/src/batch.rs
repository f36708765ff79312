//! Batch coordination: bounded fan-out of trackers over a fleet.
//!
//! A batch takes one script and a list of target instances, runs one
//! tracker per instance with a concurrency cap, and aggregates the
//! per-instance records into a single batch status. Dispatch order
//! follows the request's instance order: the supervisor acquires a
//! semaphore permit before spawning each tracker, so instance N never
//! starts before instance N-1 has at least been admitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use fleetrun_core::config::EngineConfig;
use fleetrun_core::credential::CredentialKey;
use fleetrun_core::error::EngineError;
use fleetrun_core::execution::{BatchResult, Execution};
use fleetrun_core::script::Script;
use fleetrun_core::types::{InstanceId, RegionName};

use crate::sink::ExecutionSink;
use crate::tracker::ExecutionTracker;

/// Live state of one batch, shared between the supervisor task and
/// status queries.
struct BatchState {
    id: Uuid,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    executions: Vec<Arc<Mutex<Execution>>>,
    ended_at: RwLock<Option<DateTime<Utc>>>,
    done: watch::Sender<bool>,
}

impl BatchState {
    async fn snapshot(&self) -> BatchResult {
        let mut executions = Vec::with_capacity(self.executions.len());
        for record in &self.executions {
            executions.push(record.lock().await.clone());
        }
        BatchResult {
            batch_id: self.id,
            status: BatchResult::aggregate(&executions),
            executions,
            started_at: self.started_at,
            ended_at: *self.ended_at.read().await,
        }
    }
}

/// Runs batches and answers status and cancellation requests for them.
///
/// Finished batches stay queryable for the coordinator's lifetime;
/// durable history is the sink's concern.
pub struct BatchCoordinator {
    tracker: Arc<ExecutionTracker>,
    config: EngineConfig,
    sink: Arc<dyn ExecutionSink>,
    batches: RwLock<HashMap<Uuid, Arc<BatchState>>>,
}

impl BatchCoordinator {
    pub fn new(
        tracker: Arc<ExecutionTracker>,
        config: EngineConfig,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        Self {
            tracker,
            config,
            sink,
            batches: RwLock::new(HashMap::new()),
        }
    }

    /// Start a batch and return its ID without waiting for completion.
    pub async fn start(
        &self,
        key: CredentialKey,
        region: RegionName,
        script: Script,
        instance_ids: Vec<InstanceId>,
    ) -> Uuid {
        let batch_id = Uuid::new_v4();
        let executions: Vec<_> = instance_ids
            .into_iter()
            .map(|instance_id| Arc::new(Mutex::new(Execution::new(instance_id))))
            .collect();
        let (done, _) = watch::channel(false);
        let state = Arc::new(BatchState {
            id: batch_id,
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
            executions,
            ended_at: RwLock::new(None),
            done,
        });
        self.batches
            .write()
            .await
            .insert(batch_id, Arc::clone(&state));

        tracing::info!(
            %batch_id,
            instances = state.executions.len(),
            concurrency = self.config.max_concurrent_executions,
            "Starting batch",
        );

        let tracker = Arc::clone(&self.tracker);
        let sink = Arc::clone(&self.sink);
        let limit = self.config.max_concurrent_executions;
        let deadline = self.config.batch_timeout;
        tokio::spawn(async move {
            supervise(state, tracker, sink, limit, deadline, key, region, script).await;
        });

        batch_id
    }

    /// Current snapshot of a batch, running or finished.
    pub async fn status(&self, batch_id: Uuid) -> Result<BatchResult, EngineError> {
        let state = self.lookup(batch_id).await?;
        Ok(state.snapshot().await)
    }

    /// Request cancellation. Pending executions never dispatch; running
    /// ones get a best-effort remote cancel.
    pub async fn cancel(&self, batch_id: Uuid) -> Result<(), EngineError> {
        let state = self.lookup(batch_id).await?;
        tracing::info!(%batch_id, "Cancelling batch");
        state.cancel.cancel();
        Ok(())
    }

    /// Wait for the batch to finish and return the final result.
    pub async fn wait(&self, batch_id: Uuid) -> Result<BatchResult, EngineError> {
        let state = self.lookup(batch_id).await?;
        let mut done = state.done.subscribe();
        // The sender lives in the state we hold; an error here means it
        // already reported completion.
        let _ = done.wait_for(|finished| *finished).await;
        Ok(state.snapshot().await)
    }

    async fn lookup(&self, batch_id: Uuid) -> Result<Arc<BatchState>, EngineError> {
        self.batches
            .read()
            .await
            .get(&batch_id)
            .cloned()
            .ok_or(EngineError::BatchNotFound(batch_id))
    }
}

/// Supervisor body: admit trackers in order under the concurrency cap,
/// then aggregate and publish the final result. The batch deadline runs
/// independently of the per-execution timeouts; when it elapses the
/// batch's cancellation token fires and the trackers wind down.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    state: Arc<BatchState>,
    tracker: Arc<ExecutionTracker>,
    sink: Arc<dyn ExecutionSink>,
    limit: usize,
    deadline: Duration,
    key: CredentialKey,
    region: RegionName,
    script: Script,
) {
    let watchdog = tokio::spawn({
        let cancel = state.cancel.clone();
        let batch_id = state.id;
        async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(
                %batch_id,
                timeout_secs = deadline.as_secs(),
                "Batch exceeded its deadline, cancelling remaining executions",
            );
            cancel.cancel();
        }
    });

    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for record in state.executions.iter().cloned() {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let tracker = Arc::clone(&tracker);
        let cancel = state.cancel.clone();
        let key = key.clone();
        let region = region.clone();
        let script = script.clone();
        let batch_id = state.id;
        tasks.spawn(async move {
            let _permit = permit;
            tracker
                .run(batch_id, &key, &region, &script, record, cancel)
                .await;
        });
    }
    while tasks.join_next().await.is_some() {}
    watchdog.abort();

    *state.ended_at.write().await = Some(Utc::now());
    let result = state.snapshot().await;
    tracing::info!(
        batch_id = %state.id,
        status = ?result.status,
        "Batch finished",
    );
    sink.batch_finished(&result).await;
    let _ = state.done.send(true);
}
