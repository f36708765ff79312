//! End-to-end engine scenarios over scripted in-memory transports.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use fleetrun_core::config::EngineConfig;
use fleetrun_core::credential::CredentialEntry;
use fleetrun_core::error::{
    CredentialError, DiscoveryError, DispatchError, EngineError, TrackingError,
};
use fleetrun_core::execution::{BatchStatus, ExecutionStatus};
use fleetrun_core::instance::{DiscoveryFilters, Instance, InstanceState, Platform};
use fleetrun_core::script::{InterpreterType, Script};
use fleetrun_core::transport::{
    AccountDirectory, CommandPoll, CommandTransport, IdentityClient, InstanceDiscovery,
    RemoteCommandStatus, TransportSet,
};
use fleetrun_core::types::{AccountSummary, CallerIdentity, CommandId, Environment, InstanceId};
use fleetrun_engine::{BatchRequest, ScriptEngine};

const HOME_ACCOUNT: &str = "111111111111";

/// How the mock transport treats one instance.
#[derive(Clone, Copy)]
enum Plan {
    /// `polls` in-progress polls, then success with `exit_code`.
    Succeed { polls: u32, exit_code: i32 },
    /// One in-progress poll, then remote failure with exit code 1.
    RemoteFailure,
    /// Reports in-progress forever.
    NeverFinishes,
    /// Throttle the first `times` dispatch attempts, then succeed.
    Throttle { times: u32 },
    /// Reject the first dispatch as an auth failure, then succeed.
    RejectAuthOnce,
    /// Reject every dispatch: the instance cannot accept commands.
    Ineligible,
}

struct MockTransport {
    plans: Mutex<HashMap<InstanceId, Plan>>,
    send_delay: Duration,
    /// When set, `cancel` never acknowledges.
    hang_cancels: AtomicBool,
    sends: AtomicUsize,
    throttles_left: Mutex<HashMap<InstanceId, u32>>,
    rejected: Mutex<HashSet<InstanceId>>,
    polls: Mutex<HashMap<CommandId, u32>>,
    targets: Mutex<HashMap<CommandId, InstanceId>>,
    cancelled: Mutex<Vec<CommandId>>,
    finished: Mutex<HashSet<CommandId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockTransport {
    fn new() -> Self {
        Self::with_send_delay(Duration::ZERO)
    }

    fn with_send_delay(send_delay: Duration) -> Self {
        Self {
            plans: Mutex::new(HashMap::new()),
            send_delay,
            hang_cancels: AtomicBool::new(false),
            sends: AtomicUsize::new(0),
            throttles_left: Mutex::new(HashMap::new()),
            rejected: Mutex::new(HashSet::new()),
            polls: Mutex::new(HashMap::new()),
            targets: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(Vec::new()),
            finished: Mutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }

    fn set_plan(&self, instance_id: &str, plan: Plan) {
        self.plans.lock().unwrap().insert(instance_id.into(), plan);
    }

    fn plan_for(&self, instance_id: &str) -> Plan {
        self.plans
            .lock()
            .unwrap()
            .get(instance_id)
            .copied()
            .unwrap_or(Plan::Succeed {
                polls: 2,
                exit_code: 0,
            })
    }

    fn success_after(
        &self,
        command_id: &CommandId,
        needed: u32,
        exit_code: i32,
        count: u32,
    ) -> CommandPoll {
        if count <= needed {
            CommandPoll {
                status: RemoteCommandStatus::InProgress,
                output: None,
                exit_code: None,
            }
        } else {
            self.mark_finished(command_id);
            CommandPoll {
                status: RemoteCommandStatus::Success,
                output: Some("ok\n".into()),
                exit_code: Some(exit_code),
            }
        }
    }

    fn mark_finished(&self, command_id: &CommandId) {
        if self.finished.lock().unwrap().insert(command_id.clone()) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CommandTransport for MockTransport {
    async fn send(
        &self,
        _credential: &CredentialEntry,
        _region: &str,
        instance_id: &InstanceId,
        _script: &Script,
        _comment: &str,
    ) -> Result<CommandId, DispatchError> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.sends.fetch_add(1, Ordering::SeqCst);

        match self.plan_for(instance_id) {
            Plan::Throttle { times } => {
                let mut left = self.throttles_left.lock().unwrap();
                let remaining = left.entry(instance_id.clone()).or_insert(times);
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DispatchError::Throttled("rate exceeded".into()));
                }
            }
            Plan::RejectAuthOnce => {
                if self.rejected.lock().unwrap().insert(instance_id.clone()) {
                    return Err(DispatchError::AuthRejected("token expired".into()));
                }
            }
            Plan::Ineligible => {
                return Err(DispatchError::IneligibleState {
                    instance_id: instance_id.clone(),
                    reason: "instance is stopped".into(),
                });
            }
            _ => {}
        }

        let command_id = format!("cmd-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.targets
            .lock()
            .unwrap()
            .insert(command_id.clone(), instance_id.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        Ok(command_id)
    }

    async fn poll(
        &self,
        _credential: &CredentialEntry,
        _region: &str,
        command_id: &CommandId,
        _instance_id: &InstanceId,
    ) -> Result<CommandPoll, TrackingError> {
        let instance_id = self
            .targets
            .lock()
            .unwrap()
            .get(command_id)
            .cloned()
            .ok_or_else(|| TrackingError::MalformedResponse("unknown command".into()))?;

        let count = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(command_id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        Ok(match self.plan_for(&instance_id) {
            Plan::NeverFinishes => CommandPoll {
                status: RemoteCommandStatus::InProgress,
                output: None,
                exit_code: None,
            },
            Plan::RemoteFailure => {
                if count == 1 {
                    CommandPoll {
                        status: RemoteCommandStatus::InProgress,
                        output: None,
                        exit_code: None,
                    }
                } else {
                    self.mark_finished(command_id);
                    CommandPoll {
                        status: RemoteCommandStatus::Failed,
                        output: Some("boom\n".into()),
                        exit_code: Some(1),
                    }
                }
            }
            Plan::Succeed { polls, exit_code } => {
                self.success_after(command_id, polls, exit_code, count)
            }
            Plan::Throttle { .. } | Plan::RejectAuthOnce | Plan::Ineligible => {
                self.success_after(command_id, 1, 0, count)
            }
        })
    }

    async fn cancel(
        &self,
        _credential: &CredentialEntry,
        _region: &str,
        command_id: &CommandId,
        _instance_id: &InstanceId,
    ) -> Result<(), TrackingError> {
        if self.hang_cancels.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.cancelled.lock().unwrap().push(command_id.clone());
        self.mark_finished(command_id);
        Ok(())
    }
}

#[derive(Default)]
struct MockIdentity {
    validations: AtomicUsize,
    assumptions: AtomicUsize,
}

#[async_trait]
impl IdentityClient for MockIdentity {
    async fn validate(
        &self,
        _environment: Environment,
        _credential: &CredentialEntry,
    ) -> Result<CallerIdentity, CredentialError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        Ok(CallerIdentity {
            account: HOME_ACCOUNT.into(),
            arn: format!("arn:aws:iam::{HOME_ACCOUNT}:user/ops"),
        })
    }

    async fn assume_role(
        &self,
        _environment: Environment,
        _base: &CredentialEntry,
        role_arn: &str,
        _session_name: &str,
    ) -> Result<CredentialEntry, CredentialError> {
        self.assumptions.fetch_add(1, Ordering::SeqCst);
        Ok(CredentialEntry {
            access_key_id: format!("ASIA-{role_arn}"),
            secret_access_key: "scoped-secret".into(),
            session_token: Some("token".into()),
            expires_at: Utc::now() + chrono::Duration::seconds(3600),
            temporary: true,
        })
    }
}

#[derive(Default)]
struct MockDiscovery {
    fail_first: AtomicBool,
}

#[async_trait]
impl InstanceDiscovery for MockDiscovery {
    async fn list(
        &self,
        _credential: &CredentialEntry,
        _region: &str,
        filters: &DiscoveryFilters,
    ) -> Result<Vec<Instance>, DiscoveryError> {
        if self.fail_first.swap(false, Ordering::SeqCst) {
            return Err(DiscoveryError::AuthExpired("token expired".into()));
        }
        let fleet = vec![
            Instance {
                id: "i-linux".into(),
                platform: Platform::Linux,
                state: InstanceState::Running,
                private_ip: Some("10.0.0.5".into()),
                public_ip: None,
                tags: HashMap::new(),
            },
            Instance {
                id: "i-windows".into(),
                platform: Platform::Windows,
                state: InstanceState::Stopped,
                private_ip: Some("10.0.0.6".into()),
                public_ip: None,
                tags: HashMap::new(),
            },
        ];
        Ok(fleet.into_iter().filter(|i| filters.matches(i)).collect())
    }
}

struct MockAccounts;

#[async_trait]
impl AccountDirectory for MockAccounts {
    async fn list_accounts(
        &self,
        _environment: Environment,
        _credential: &CredentialEntry,
    ) -> Result<Vec<AccountSummary>, CredentialError> {
        Ok(vec![
            AccountSummary {
                id: HOME_ACCOUNT.into(),
                name: Some("management".into()),
                status: Some("ACTIVE".into()),
            },
            AccountSummary {
                id: "222222222222".into(),
                name: Some("workloads".into()),
                status: Some("ACTIVE".into()),
            },
        ])
    }
}

struct Harness {
    engine: ScriptEngine,
    transport: Arc<MockTransport>,
    identity: Arc<MockIdentity>,
    discovery: Arc<MockDiscovery>,
}

async fn harness_with(transport: MockTransport) -> Harness {
    harness_with_config(EngineConfig::default(), transport).await
}

async fn harness_with_config(config: EngineConfig, transport: MockTransport) -> Harness {
    let transport = Arc::new(transport);
    let identity = Arc::new(MockIdentity::default());
    let discovery = Arc::new(MockDiscovery::default());
    let transports = TransportSet {
        identity: Arc::clone(&identity) as Arc<dyn IdentityClient>,
        discovery: Arc::clone(&discovery) as Arc<dyn InstanceDiscovery>,
        command: Arc::clone(&transport) as Arc<dyn CommandTransport>,
        accounts: Arc::new(MockAccounts),
    };
    let engine = ScriptEngine::new(config, transports);
    engine
        .put_credentials(
            Environment::Com,
            "AKIA123".into(),
            "secret".into(),
            None,
        )
        .await
        .expect("credentials accepted");
    Harness {
        engine,
        transport,
        identity,
        discovery,
    }
}

async fn harness() -> Harness {
    harness_with(MockTransport::new()).await
}

fn request(instance_ids: &[&str]) -> BatchRequest {
    BatchRequest {
        environment: Environment::Com,
        account: HOME_ACCOUNT.into(),
        region: "us-east-1".into(),
        script: Script::new("uptime", InterpreterType::Shell),
        instance_ids: instance_ids.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test(start_paused = true)]
async fn batch_completes_when_all_instances_succeed() {
    let h = harness().await;
    let result = h
        .engine
        .run_batch(request(&["i-01", "i-02", "i-03"]))
        .await
        .expect("batch runs");

    assert_eq!(result.status, BatchStatus::Completed);
    assert!(result.ended_at.is_some());
    for execution in &result.executions {
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.exit_code, Some(0));
        assert_eq!(execution.output.as_deref(), Some("ok\n"));
        assert!(execution.command_id.is_some());
        assert!(execution.ended_at.is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn failing_instance_fails_the_batch() {
    let h = harness().await;
    h.transport.set_plan("i-bad", Plan::RemoteFailure);

    let result = h
        .engine
        .run_batch(request(&["i-good", "i-bad"]))
        .await
        .expect("batch runs");

    assert_eq!(result.status, BatchStatus::Failed);
    let bad = result
        .executions
        .iter()
        .find(|e| e.instance_id == "i-bad")
        .expect("record for i-bad");
    assert_eq!(bad.status, ExecutionStatus::Failed);
    assert_eq!(bad.exit_code, Some(1));
    assert_eq!(bad.output.as_deref(), Some("boom\n"));

    let good = result
        .executions
        .iter()
        .find(|e| e.instance_id == "i-good")
        .expect("record for i-good");
    assert_eq!(good.status, ExecutionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn stuck_instance_times_out_with_remote_cancel() {
    let h = harness().await;
    h.transport.set_plan("i-stuck", Plan::NeverFinishes);

    let result = h
        .engine
        .run_batch(request(&["i-ok", "i-stuck"]))
        .await
        .expect("batch runs");

    assert_eq!(result.status, BatchStatus::Failed);
    let stuck = result
        .executions
        .iter()
        .find(|e| e.instance_id == "i-stuck")
        .expect("record for i-stuck");
    assert_eq!(stuck.status, ExecutionStatus::TimedOut);

    // The remote cancel runs detached from batch finalization.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!h.transport.cancelled.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mixed_outcomes_report_per_instance_results() {
    let h = harness().await;
    h.transport.set_plan("i-fails", Plan::RemoteFailure);
    h.transport.set_plan("i-stuck", Plan::NeverFinishes);

    let result = h
        .engine
        .run_batch(request(&["i-completes", "i-fails", "i-stuck"]))
        .await
        .expect("batch runs");

    assert_eq!(result.status, BatchStatus::Failed);
    let by_id = |id: &str| {
        result
            .executions
            .iter()
            .find(|e| e.instance_id == id)
            .expect("record exists")
    };
    assert_eq!(by_id("i-completes").status, ExecutionStatus::Completed);
    assert_eq!(by_id("i-fails").status, ExecutionStatus::Failed);
    assert_eq!(by_id("i-fails").exit_code, Some(1));
    assert_eq!(by_id("i-stuck").status, ExecutionStatus::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn ineligible_instance_does_not_poison_siblings() {
    let h = harness().await;
    h.transport.set_plan("i-stopped", Plan::Ineligible);

    let result = h
        .engine
        .run_batch(request(&["i-stopped", "i-running"]))
        .await
        .expect("batch runs");

    assert_eq!(result.status, BatchStatus::Failed);
    let stopped = result
        .executions
        .iter()
        .find(|e| e.instance_id == "i-stopped")
        .expect("record for i-stopped");
    assert_eq!(stopped.status, ExecutionStatus::Failed);
    assert!(stopped.output.as_deref().unwrap().contains("not eligible"));

    let running = result
        .executions
        .iter()
        .find(|e| e.instance_id == "i-running")
        .expect("record for i-running");
    assert_eq!(running.status, ExecutionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn batch_status_is_stable_after_completion() {
    let h = harness().await;
    let result = h.engine.run_batch(request(&["i-01"])).await.expect("batch runs");

    let first = h.engine.batch_status(result.batch_id).await.expect("status");
    let second = h.engine.batch_status(result.batch_id).await.expect("status");
    assert_eq!(first.status, BatchStatus::Completed);
    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!(first.executions[0].status, second.executions[0].status);
    assert_eq!(first.ended_at, second.ended_at);
}

#[tokio::test(start_paused = true)]
async fn throttled_dispatch_retries_then_succeeds() {
    let h = harness().await;
    h.transport.set_plan("i-01", Plan::Throttle { times: 2 });

    let result = h.engine.run_batch(request(&["i-01"])).await.expect("batch runs");

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(h.transport.sends.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn throttle_exhaustion_fails_the_execution() {
    let h = harness().await;
    h.transport.set_plan("i-01", Plan::Throttle { times: 5 });

    let result = h.engine.run_batch(request(&["i-01"])).await.expect("batch runs");

    assert_eq!(result.status, BatchStatus::Failed);
    assert_eq!(result.executions[0].status, ExecutionStatus::Failed);
    assert!(result.executions[0]
        .output
        .as_deref()
        .unwrap()
        .contains("rate exceeded"));
    // Three attempts, no more.
    assert_eq!(h.transport.sends.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn auth_rejection_triggers_one_refresh() {
    let h = harness().await;
    h.transport.set_plan("i-01", Plan::RejectAuthOnce);

    let result = h.engine.run_batch(request(&["i-01"])).await.expect("batch runs");

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(h.transport.sends.load(Ordering::SeqCst), 2);
    // One validation when the credentials were supplied, one for the
    // refresh after the rejection.
    assert_eq!(h.identity.validations.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_the_cap() {
    let h = harness().await;
    let ids: Vec<String> = (0..25).map(|n| format!("i-{n:02}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let result = h.engine.run_batch(request(&id_refs)).await.expect("batch runs");

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.executions.len(), 25);
    assert!(h.transport.max_in_flight.load(Ordering::SeqCst) <= 10);
}

#[tokio::test(start_paused = true)]
async fn cancel_before_dispatch_cancels_every_execution() {
    let h = harness_with(MockTransport::with_send_delay(Duration::from_secs(30))).await;

    let batch_id = h
        .engine
        .start_batch(request(&["i-01", "i-02"]))
        .await
        .expect("batch starts");
    h.engine.cancel_batch(batch_id).await.expect("cancel accepted");

    let result = h.engine.wait_batch(batch_id).await.expect("batch finishes");
    assert_eq!(result.status, BatchStatus::Cancelled);
    for execution in &result.executions {
        assert_eq!(execution.status, ExecutionStatus::Cancelled);
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_while_running_requests_remote_cancel() {
    let h = harness().await;
    h.transport.set_plan("i-01", Plan::NeverFinishes);

    let batch_id = h.engine.start_batch(request(&["i-01"])).await.expect("batch starts");

    let mut status = h.engine.batch_status(batch_id).await.expect("status");
    while status.executions[0].status != ExecutionStatus::Running {
        tokio::time::sleep(Duration::from_secs(1)).await;
        status = h.engine.batch_status(batch_id).await.expect("status");
    }

    h.engine.cancel_batch(batch_id).await.expect("cancel accepted");
    let result = h.engine.wait_batch(batch_id).await.expect("batch finishes");

    assert_eq!(result.status, BatchStatus::Cancelled);
    assert_eq!(result.executions[0].status, ExecutionStatus::Cancelled);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!h.transport.cancelled.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_finalizes_without_remote_ack() {
    let h = harness().await;
    h.transport.set_plan("i-01", Plan::NeverFinishes);
    h.transport.hang_cancels.store(true, Ordering::SeqCst);

    let batch_id = h.engine.start_batch(request(&["i-01"])).await.expect("batch starts");

    let mut status = h.engine.batch_status(batch_id).await.expect("status");
    while status.executions[0].status != ExecutionStatus::Running {
        tokio::time::sleep(Duration::from_secs(1)).await;
        status = h.engine.batch_status(batch_id).await.expect("status");
    }

    h.engine.cancel_batch(batch_id).await.expect("cancel accepted");
    let result = h.engine.wait_batch(batch_id).await.expect("batch finishes");

    assert_eq!(result.status, BatchStatus::Cancelled);
    assert_eq!(result.executions[0].status, ExecutionStatus::Cancelled);
    assert!(result.ended_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn timeout_is_recorded_even_when_remote_cancel_hangs() {
    let h = harness().await;
    h.transport.set_plan("i-stuck", Plan::NeverFinishes);
    h.transport.hang_cancels.store(true, Ordering::SeqCst);

    let result = h.engine.run_batch(request(&["i-stuck"])).await.expect("batch runs");

    assert_eq!(result.status, BatchStatus::Failed);
    assert_eq!(result.executions[0].status, ExecutionStatus::TimedOut);
    assert!(result.ended_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn batch_deadline_cancels_inflight_executions() {
    let config = EngineConfig {
        execution_timeout: Duration::from_secs(7200),
        batch_timeout: Duration::from_secs(60),
        ..EngineConfig::default()
    };
    let h = harness_with_config(config, MockTransport::new()).await;
    h.transport.set_plan("i-stuck", Plan::NeverFinishes);

    let result = h.engine.run_batch(request(&["i-stuck"])).await.expect("batch runs");

    assert_eq!(result.status, BatchStatus::Cancelled);
    assert_eq!(result.executions[0].status, ExecutionStatus::Cancelled);
    assert!(result.ended_at.is_some());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!h.transport.cancelled.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_batch_completes_immediately() {
    let h = harness().await;
    let result = h.engine.run_batch(request(&[])).await.expect("batch runs");
    assert_eq!(result.status, BatchStatus::Completed);
    assert!(result.executions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_batch_id_is_an_error() {
    let h = harness().await;
    let err = h.engine.batch_status(Uuid::new_v4()).await.expect_err("unknown id");
    assert_matches!(err, EngineError::BatchNotFound(_));
}

#[tokio::test(start_paused = true)]
async fn cross_account_batches_assume_the_org_role() {
    let h = harness().await;
    let mut req = request(&["i-01"]);
    req.account = "222222222222".into();

    let result = h.engine.run_batch(req).await.expect("batch runs");

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(h.identity.assumptions.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn list_instances_retries_once_after_expiry() {
    let h = harness().await;
    h.discovery.fail_first.store(true, Ordering::SeqCst);

    let filters = DiscoveryFilters::default().with_state(InstanceState::Running);
    let instances = h
        .engine
        .list_instances(Environment::Com, HOME_ACCOUNT, "us-east-1", &filters)
        .await
        .expect("instances listed");

    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].id, "i-linux");
    // Initial validation plus the refresh forced by the expiry.
    assert_eq!(h.identity.validations.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn list_accounts_uses_the_base_credential() {
    let h = harness().await;
    let accounts = h
        .engine
        .list_accounts(Environment::Com)
        .await
        .expect("accounts listed");
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].id, HOME_ACCOUNT);
}

#[tokio::test(start_paused = true)]
async fn credential_status_tracks_validation_and_clearing() {
    let h = harness().await;

    let status = h.engine.credential_status(Environment::Com, HOME_ACCOUNT).await;
    assert!(status.valid);
    assert!(status.expires_in.unwrap() > 300);

    let other = h.engine.credential_status(Environment::Com, "222222222222").await;
    assert!(!other.valid);

    h.engine.clear_credentials(Environment::Com).await;
    let status = h.engine.credential_status(Environment::Com, HOME_ACCOUNT).await;
    assert!(!status.valid);

    assert!(h.engine.environments().await.is_empty());
}
