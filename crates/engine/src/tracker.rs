//! Per-execution lifecycle tracking.
//!
//! One tracker run owns one execution record from dispatch to terminal
//! status: it submits the command, then polls the transport with
//! multiplicative backoff until the remote side reports a terminal
//! status, the wall-clock timeout elapses, or the batch is cancelled.
//! Both timeout and cancellation finalize the record immediately and
//! then attempt a best-effort remote cancel in the background.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use fleetrun_core::config::EngineConfig;
use fleetrun_core::credential::{CredentialEntry, CredentialKey};
use fleetrun_core::error::DispatchError;
use fleetrun_core::execution::{Execution, ExecutionStatus};
use fleetrun_core::script::Script;
use fleetrun_core::transport::{CommandTransport, RemoteCommandStatus};
use fleetrun_core::types::{CommandId, InstanceId};

use fleetrun_credential::CredentialStore;

use crate::backoff::PollBackoff;
use crate::dispatcher::Dispatcher;
use crate::sink::ExecutionSink;

/// Consecutive poll failures tolerated before the execution is marked
/// failed. A single flaky poll must not kill a running command.
const MAX_POLL_FAILURES: u32 = 5;

enum PollEnd {
    /// The record reached a terminal status inside the poll loop.
    Terminal,
    /// The batch's cancellation token fired.
    Cancelled,
}

/// Drives one execution record to a terminal status.
pub struct ExecutionTracker {
    transport: Arc<dyn CommandTransport>,
    dispatcher: Dispatcher,
    store: Arc<CredentialStore>,
    config: EngineConfig,
    sink: Arc<dyn ExecutionSink>,
}

impl ExecutionTracker {
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        dispatcher: Dispatcher,
        store: Arc<CredentialStore>,
        config: EngineConfig,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            store,
            config,
            sink,
        }
    }

    /// Run `record` to a terminal status. Never returns an error: every
    /// failure mode lands in the record itself.
    pub async fn run(
        &self,
        batch_id: Uuid,
        key: &CredentialKey,
        region: &str,
        script: &Script,
        record: Arc<Mutex<Execution>>,
        cancel: CancellationToken,
    ) {
        if cancel.is_cancelled() {
            self.apply(batch_id, &record, |e| {
                e.transition(ExecutionStatus::Cancelled)
            })
            .await;
            return;
        }

        let credential = match self.store.get(key).await {
            Ok(credential) => credential,
            Err(err) => {
                self.apply(batch_id, &record, |e| {
                    e.finish(ExecutionStatus::Failed, Some(err.to_string()), None)
                })
                .await;
                return;
            }
        };

        let instance_id = record.lock().await.instance_id.clone();
        let comment = format!("fleetrun batch {batch_id}");
        let command_id = match self
            .dispatch(&credential, key, region, &instance_id, script, &comment)
            .await
        {
            Ok(command_id) => command_id,
            Err(err) => {
                tracing::warn!(instance_id, %err, "Dispatch failed");
                self.apply(batch_id, &record, |e| {
                    e.finish(ExecutionStatus::Failed, Some(err.to_string()), None)
                })
                .await;
                return;
            }
        };
        {
            let id = command_id.clone();
            self.apply(batch_id, &record, move |e| {
                e.dispatched(id);
                true
            })
            .await;
        }

        let tracked =
            self.poll_loop(batch_id, key, region, &command_id, &instance_id, &record, &cancel);
        match tokio::time::timeout(self.config.execution_timeout, tracked).await {
            Ok(PollEnd::Terminal) => {}
            Ok(PollEnd::Cancelled) => {
                // Finalize the record first; the remote cancel is
                // best-effort and must not gate the batch outcome.
                self.apply(batch_id, &record, |e| {
                    e.transition(ExecutionStatus::Cancelled)
                })
                .await;
                self.spawn_remote_cancel(key, region, &command_id, &instance_id);
            }
            Err(_) => {
                tracing::warn!(
                    instance_id,
                    command_id,
                    timeout_secs = self.config.execution_timeout.as_secs(),
                    "Execution exceeded its time limit",
                );
                self.apply(batch_id, &record, |e| {
                    e.finish(ExecutionStatus::TimedOut, None, None)
                })
                .await;
                self.spawn_remote_cancel(key, region, &command_id, &instance_id);
            }
        }
    }

    /// Dispatch with one credential refresh when the transport rejects
    /// the credential mid-batch.
    async fn dispatch(
        &self,
        credential: &CredentialEntry,
        key: &CredentialKey,
        region: &str,
        instance_id: &InstanceId,
        script: &Script,
        comment: &str,
    ) -> Result<CommandId, DispatchError> {
        match self
            .dispatcher
            .dispatch(credential, region, instance_id, script, comment)
            .await
        {
            Err(DispatchError::AuthRejected(reason)) => {
                tracing::warn!(instance_id, reason, "Credential rejected, refreshing once");
                self.store.invalidate(key.environment, &key.account).await;
                let fresh = self
                    .store
                    .get(key)
                    .await
                    .map_err(|err| DispatchError::AuthRejected(err.to_string()))?;
                self.dispatcher
                    .dispatch(&fresh, region, instance_id, script, comment)
                    .await
            }
            other => other,
        }
    }

    /// Poll until the remote side reports a terminal status or the
    /// cancellation token fires.
    #[allow(clippy::too_many_arguments)]
    async fn poll_loop(
        &self,
        batch_id: Uuid,
        key: &CredentialKey,
        region: &str,
        command_id: &CommandId,
        instance_id: &InstanceId,
        record: &Arc<Mutex<Execution>>,
        cancel: &CancellationToken,
    ) -> PollEnd {
        let mut backoff = PollBackoff::new(
            self.config.poll_initial,
            self.config.poll_multiplier,
            self.config.poll_cap,
        );
        let mut failures = 0u32;

        loop {
            let delay = backoff.next_delay();
            tokio::select! {
                _ = cancel.cancelled() => return PollEnd::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }

            let outcome = match self.store.get(key).await {
                Ok(credential) => {
                    self.transport
                        .poll(&credential, region, command_id, instance_id)
                        .await
                        .map_err(|err| err.to_string())
                }
                Err(err) => Err(err.to_string()),
            };

            let poll = match outcome {
                Ok(poll) => poll,
                Err(reason) => {
                    failures += 1;
                    tracing::warn!(
                        instance_id,
                        command_id,
                        attempt = failures,
                        reason,
                        "Status poll failed",
                    );
                    if failures >= MAX_POLL_FAILURES {
                        self.apply(batch_id, record, move |e| {
                            e.finish(ExecutionStatus::Failed, Some(reason), None)
                        })
                        .await;
                        return PollEnd::Terminal;
                    }
                    continue;
                }
            };
            failures = 0;

            match poll.status {
                RemoteCommandStatus::Pending => {}
                RemoteCommandStatus::InProgress => {
                    self.apply(batch_id, record, |e| {
                        e.status == ExecutionStatus::Pending
                            && e.transition(ExecutionStatus::Running)
                    })
                    .await;
                }
                RemoteCommandStatus::Success => {
                    self.apply(batch_id, record, move |e| {
                        e.finish(ExecutionStatus::Completed, poll.output, poll.exit_code)
                    })
                    .await;
                    return PollEnd::Terminal;
                }
                RemoteCommandStatus::Failed => {
                    self.apply(batch_id, record, move |e| {
                        e.finish(ExecutionStatus::Failed, poll.output, poll.exit_code)
                    })
                    .await;
                    return PollEnd::Terminal;
                }
                RemoteCommandStatus::TimedOut => {
                    self.apply(batch_id, record, move |e| {
                        e.finish(ExecutionStatus::TimedOut, poll.output, poll.exit_code)
                    })
                    .await;
                    return PollEnd::Terminal;
                }
                RemoteCommandStatus::Cancelled => {
                    self.apply(batch_id, record, move |e| {
                        e.finish(ExecutionStatus::Cancelled, poll.output, poll.exit_code)
                    })
                    .await;
                    return PollEnd::Terminal;
                }
            }
        }
    }

    /// Best-effort remote cancellation, detached from the tracker task.
    /// The record is already terminal by the time this runs; a slow or
    /// unreachable remote side must not hold up batch finalization.
    fn spawn_remote_cancel(
        &self,
        key: &CredentialKey,
        region: &str,
        command_id: &CommandId,
        instance_id: &InstanceId,
    ) {
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let key = key.clone();
        let region = region.to_string();
        let command_id = command_id.clone();
        let instance_id = instance_id.clone();
        tokio::spawn(async move {
            let credential = match store.get(&key).await {
                Ok(credential) => credential,
                Err(err) => {
                    tracing::warn!(command_id, %err, "Skipping remote cancel, no credential");
                    return;
                }
            };
            if let Err(err) = transport
                .cancel(&credential, &region, &command_id, &instance_id)
                .await
            {
                tracing::warn!(command_id, %err, "Remote cancel failed");
            }
        });
    }

    /// Apply a mutation to the record under its lock; when the mutation
    /// reports a change, push the snapshot to the sink.
    async fn apply<F>(&self, batch_id: Uuid, record: &Arc<Mutex<Execution>>, mutate: F)
    where
        F: FnOnce(&mut Execution) -> bool,
    {
        let snapshot = {
            let mut guard = record.lock().await;
            if !mutate(&mut guard) {
                return;
            }
            guard.clone()
        };
        self.sink.execution_updated(batch_id, &snapshot).await;
    }
}
