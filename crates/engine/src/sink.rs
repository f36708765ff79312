//! Execution event sinks.
//!
//! The engine pushes status changes out through an [`ExecutionSink`]
//! so callers can persist or stream progress without the engine knowing
//! about storage. The engine itself keeps batches in memory only.

use async_trait::async_trait;
use uuid::Uuid;

use fleetrun_core::execution::{BatchResult, Execution};

/// Observer for execution and batch lifecycle events.
///
/// Sink calls happen on the tracker's task; implementations should
/// hand heavy work off rather than block the poll loop.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    /// An execution changed status (or was dispatched).
    async fn execution_updated(&self, batch_id: Uuid, execution: &Execution);

    /// A batch reached its terminal aggregate status.
    async fn batch_finished(&self, result: &BatchResult);
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl ExecutionSink for NoopSink {
    async fn execution_updated(&self, _batch_id: Uuid, _execution: &Execution) {}

    async fn batch_finished(&self, _result: &BatchResult) {}
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ExecutionSink for LogSink {
    async fn execution_updated(&self, batch_id: Uuid, execution: &Execution) {
        tracing::info!(
            %batch_id,
            execution_id = %execution.id,
            instance_id = %execution.instance_id,
            status = %execution.status,
            exit_code = execution.exit_code,
            "Execution updated",
        );
    }

    async fn batch_finished(&self, result: &BatchResult) {
        tracing::info!(
            batch_id = %result.batch_id,
            status = ?result.status,
            executions = result.executions.len(),
            "Batch finished",
        );
    }
}
