//! Execution and batch records with their status machines.
//!
//! An [`Execution`] is the engine's record of one script run against
//! one instance. Its status is monotonic: `pending → running →
//! {completed | failed | timed_out}`, with `cancelled` reachable from
//! `pending` or `running`. Transitions are enforced here so no caller
//! can regress a record; the tracker and coordinator only move records
//! forward through the [`Execution`] methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CommandId, InstanceId};

/// Lifecycle status of a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl ExecutionStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Whether the status machine permits moving to `next`.
    ///
    /// `pending` may advance to `running` or any terminal state;
    /// `running` may advance to any terminal state; terminal states
    /// never change.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

/// Record of one script run against one instance.
///
/// Owned by the execution tracker until terminal, then handed off to
/// the batch coordinator and the persistence sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub instance_id: InstanceId,
    pub status: ExecutionStatus,
    /// Remote command identifier, set once dispatch succeeds.
    pub command_id: Option<CommandId>,
    /// Exit code as reported by the remote agent, recorded as-is.
    pub exit_code: Option<i32>,
    /// Captured stdout/stderr, when the transport provides it.
    pub output: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Create a new `pending` execution for `instance_id`.
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_id,
            status: ExecutionStatus::Pending,
            command_id: None,
            exit_code: None,
            output: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Record the command ID from a successful dispatch.
    pub fn dispatched(&mut self, command_id: CommandId) {
        self.command_id = Some(command_id);
    }

    /// Advance to `next`, enforcing monotonicity.
    ///
    /// Illegal transitions are logged and ignored rather than panicking:
    /// a late poll result racing a cancellation must not corrupt a
    /// terminal record.
    pub fn transition(&mut self, next: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                execution_id = %self.id,
                from = %self.status,
                to = %next,
                "Ignoring illegal status transition",
            );
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        true
    }

    /// Mark terminal with captured output and exit code.
    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        output: Option<String>,
        exit_code: Option<i32>,
    ) -> bool {
        if !self.transition(status) {
            return false;
        }
        if output.is_some() {
            self.output = output;
        }
        if exit_code.is_some() {
            self.exit_code = exit_code;
        }
        true
    }
}

/// Aggregate status of a batch, derived from its executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Result of one batch run: the aggregate status plus the per-instance
/// outcome list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub executions: Vec<Execution>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl BatchResult {
    /// Derive the aggregate status from constituent executions.
    ///
    /// * `completed` only if every execution completed;
    /// * `failed` if any execution failed or timed out;
    /// * `cancelled` only if cancellation landed before any execution
    ///   left `pending` (every record is `cancelled`);
    /// * `running`/`pending` while any execution is non-terminal.
    pub fn aggregate(executions: &[Execution]) -> BatchStatus {
        if executions.is_empty() {
            return BatchStatus::Completed;
        }
        if executions
            .iter()
            .any(|e| !e.status.is_terminal())
        {
            return if executions
                .iter()
                .all(|e| e.status == ExecutionStatus::Pending)
            {
                BatchStatus::Pending
            } else {
                BatchStatus::Running
            };
        }
        if executions
            .iter()
            .all(|e| e.status == ExecutionStatus::Cancelled)
        {
            return BatchStatus::Cancelled;
        }
        if executions.iter().any(|e| {
            matches!(
                e.status,
                ExecutionStatus::Failed | ExecutionStatus::TimedOut
            )
        }) {
            return BatchStatus::Failed;
        }
        if executions
            .iter()
            .all(|e| e.status == ExecutionStatus::Completed)
        {
            return BatchStatus::Completed;
        }
        // Mixed completed/cancelled: the batch did not finish cleanly.
        BatchStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(status: ExecutionStatus) -> Execution {
        let mut e = Execution::new("i-0abc".into());
        if status != ExecutionStatus::Pending {
            if status != ExecutionStatus::Cancelled {
                e.transition(ExecutionStatus::Running);
            }
            if status != ExecutionStatus::Running {
                e.transition(status);
            }
        }
        e
    }

    #[test]
    fn pending_to_running_to_completed() {
        let mut e = Execution::new("i-0abc".into());
        assert!(e.transition(ExecutionStatus::Running));
        assert!(e.ended_at.is_none());
        assert!(e.finish(ExecutionStatus::Completed, Some("ok\n".into()), Some(0)));
        assert_eq!(e.status, ExecutionStatus::Completed);
        assert_eq!(e.exit_code, Some(0));
        assert!(e.ended_at.is_some());
    }

    #[test]
    fn terminal_status_never_regresses() {
        let mut e = Execution::new("i-0abc".into());
        e.transition(ExecutionStatus::Running);
        e.transition(ExecutionStatus::Failed);

        assert!(!e.transition(ExecutionStatus::Running));
        assert!(!e.transition(ExecutionStatus::Completed));
        assert!(!e.transition(ExecutionStatus::Pending));
        assert_eq!(e.status, ExecutionStatus::Failed);
    }

    #[test]
    fn cancelled_reachable_from_pending_and_running() {
        let mut e = Execution::new("i-0abc".into());
        assert!(e.transition(ExecutionStatus::Cancelled));

        let mut e = Execution::new("i-0abc".into());
        e.transition(ExecutionStatus::Running);
        assert!(e.transition(ExecutionStatus::Cancelled));
    }

    #[test]
    fn late_poll_after_cancel_is_ignored() {
        let mut e = Execution::new("i-0abc".into());
        e.transition(ExecutionStatus::Running);
        e.transition(ExecutionStatus::Cancelled);

        assert!(!e.finish(ExecutionStatus::Completed, Some("late".into()), Some(0)));
        assert_eq!(e.status, ExecutionStatus::Cancelled);
        assert!(e.output.is_none());
    }

    #[test]
    fn aggregate_all_completed() {
        let executions = vec![
            terminal(ExecutionStatus::Completed),
            terminal(ExecutionStatus::Completed),
        ];
        assert_eq!(BatchResult::aggregate(&executions), BatchStatus::Completed);
    }

    #[test]
    fn aggregate_any_failure_fails_batch() {
        let executions = vec![
            terminal(ExecutionStatus::Completed),
            terminal(ExecutionStatus::Failed),
            terminal(ExecutionStatus::TimedOut),
        ];
        assert_eq!(BatchResult::aggregate(&executions), BatchStatus::Failed);
    }

    #[test]
    fn aggregate_all_cancelled_is_cancelled() {
        let executions = vec![
            terminal(ExecutionStatus::Cancelled),
            terminal(ExecutionStatus::Cancelled),
        ];
        assert_eq!(BatchResult::aggregate(&executions), BatchStatus::Cancelled);
    }

    #[test]
    fn aggregate_mixed_cancelled_and_completed_is_failed() {
        let executions = vec![
            terminal(ExecutionStatus::Completed),
            terminal(ExecutionStatus::Cancelled),
        ];
        assert_eq!(BatchResult::aggregate(&executions), BatchStatus::Failed);
    }

    #[test]
    fn aggregate_nonterminal_is_running() {
        let executions = vec![
            terminal(ExecutionStatus::Completed),
            terminal(ExecutionStatus::Running),
        ];
        assert_eq!(BatchResult::aggregate(&executions), BatchStatus::Running);
    }

    #[test]
    fn aggregate_all_pending_is_pending() {
        let executions = vec![
            terminal(ExecutionStatus::Pending),
            terminal(ExecutionStatus::Pending),
        ];
        assert_eq!(BatchResult::aggregate(&executions), BatchStatus::Pending);
    }
}
