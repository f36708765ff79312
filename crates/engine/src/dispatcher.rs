//! Command dispatch with bounded throttle retry.

use std::sync::Arc;
use std::time::Duration;

use fleetrun_core::credential::CredentialEntry;
use fleetrun_core::error::DispatchError;
use fleetrun_core::script::Script;
use fleetrun_core::transport::CommandTransport;
use fleetrun_core::types::{CommandId, InstanceId};

use crate::backoff;

/// Submits commands through the transport, retrying throttled attempts
/// with exponential backoff. All other errors pass straight through;
/// auth rejection in particular is the tracker's business.
pub struct Dispatcher {
    transport: Arc<dyn CommandTransport>,
    attempts: u32,
    base_delay: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn CommandTransport>, attempts: u32, base_delay: Duration) -> Self {
        Self {
            transport,
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub async fn dispatch(
        &self,
        credential: &CredentialEntry,
        region: &str,
        instance_id: &InstanceId,
        script: &Script,
        comment: &str,
    ) -> Result<CommandId, DispatchError> {
        let mut attempt = 0;
        loop {
            match self
                .transport
                .send(credential, region, instance_id, script, comment)
                .await
            {
                Ok(command_id) => return Ok(command_id),
                Err(err) if err.is_throttle() && attempt + 1 < self.attempts => {
                    let delay = backoff::dispatch_delay(self.base_delay, attempt);
                    tracing::warn!(
                        instance_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Dispatch throttled, backing off",
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;

    use fleetrun_core::error::TrackingError;
    use fleetrun_core::script::InterpreterType;
    use fleetrun_core::transport::CommandPoll;

    /// Transport that throttles the first `throttles` sends.
    struct ThrottlingTransport {
        throttles: u32,
        sends: AtomicU32,
    }

    #[async_trait]
    impl CommandTransport for ThrottlingTransport {
        async fn send(
            &self,
            _credential: &CredentialEntry,
            _region: &str,
            _instance_id: &InstanceId,
            _script: &Script,
            _comment: &str,
        ) -> Result<CommandId, DispatchError> {
            let attempt = self.sends.fetch_add(1, Ordering::SeqCst);
            if attempt < self.throttles {
                Err(DispatchError::Throttled("rate exceeded".into()))
            } else {
                Ok("cmd-1".into())
            }
        }

        async fn poll(
            &self,
            _credential: &CredentialEntry,
            _region: &str,
            _command_id: &CommandId,
            _instance_id: &InstanceId,
        ) -> Result<CommandPoll, TrackingError> {
            unreachable!("dispatcher never polls")
        }

        async fn cancel(
            &self,
            _credential: &CredentialEntry,
            _region: &str,
            _command_id: &CommandId,
            _instance_id: &InstanceId,
        ) -> Result<(), TrackingError> {
            unreachable!("dispatcher never cancels")
        }
    }

    fn credential() -> CredentialEntry {
        CredentialEntry {
            access_key_id: "AKIA123".into(),
            secret_access_key: "secret".into(),
            session_token: None,
            expires_at: Utc::now() + chrono::Duration::seconds(3600),
            temporary: false,
        }
    }

    fn script() -> Script {
        Script::new("uptime", InterpreterType::Shell)
    }

    async fn run(throttles: u32, attempts: u32) -> (Result<CommandId, DispatchError>, u32) {
        let transport = Arc::new(ThrottlingTransport {
            throttles,
            sends: AtomicU32::new(0),
        });
        let dispatcher = Dispatcher::new(
            Arc::clone(&transport) as Arc<dyn CommandTransport>,
            attempts,
            Duration::from_secs(1),
        );
        let result = dispatcher
            .dispatch(&credential(), "us-east-1", &"i-0abc".to_string(), &script(), "test")
            .await;
        (result, transport.sends.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_through_throttling() {
        let (result, sends) = run(2, 3).await;
        assert_eq!(result.expect("command id"), "cmd-1");
        assert_eq!(sends, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_configured_attempts() {
        let (result, sends) = run(5, 3).await;
        assert_matches!(result, Err(DispatchError::Throttled(_)));
        assert_eq!(sends, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_needs_no_retry() {
        let (result, sends) = run(0, 3).await;
        assert!(result.is_ok());
        assert_eq!(sends, 1);
    }
}
