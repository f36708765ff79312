//! SSM-backed remote-execution transport: send, poll, cancel.
//!
//! The document name follows the script's interpreter type
//! (`AWS-RunShellScript` / `AWS-RunPowerShellScript`); the script body
//! travels in the document's `commands` parameter.

use async_trait::async_trait;
use aws_sdk_ssm::config::{BehaviorVersion, Region};
use aws_sdk_ssm::error::ProvideErrorMetadata;

use fleetrun_core::credential::CredentialEntry;
use fleetrun_core::error::{DispatchError, TrackingError};
use fleetrun_core::script::Script;
use fleetrun_core::transport::{CommandPoll, CommandTransport, RemoteCommandStatus};
use fleetrun_core::types::{CommandId, InstanceId};

use crate::classify;
use crate::sdk_credentials;

/// Remote-side timeout handed to SSM, seconds. Independent of the
/// engine's own tracking timeout.
const SSM_COMMAND_TIMEOUT_SECS: i32 = 3600;

/// Remote-execution transport backed by AWS Systems Manager.
#[derive(Debug, Default)]
pub struct SsmCommandTransport;

impl SsmCommandTransport {
    fn client(&self, entry: &CredentialEntry, region: &str) -> aws_sdk_ssm::Client {
        let config = aws_sdk_ssm::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(sdk_credentials(entry))
            .build();
        aws_sdk_ssm::Client::from_conf(config)
    }
}

/// Map an SSM invocation status name onto the engine's remote view.
///
/// `Delayed` means the agent has not picked the command up yet;
/// `Cancelling` is treated as already cancelled since the engine never
/// waits out a cancellation.
fn map_status(status: &str) -> Result<RemoteCommandStatus, TrackingError> {
    match status {
        "Pending" | "Delayed" => Ok(RemoteCommandStatus::Pending),
        "InProgress" => Ok(RemoteCommandStatus::InProgress),
        "Success" => Ok(RemoteCommandStatus::Success),
        "Failed" => Ok(RemoteCommandStatus::Failed),
        "Cancelled" | "Cancelling" => Ok(RemoteCommandStatus::Cancelled),
        "TimedOut" => Ok(RemoteCommandStatus::TimedOut),
        other => Err(TrackingError::MalformedResponse(format!(
            "unknown invocation status {other:?}"
        ))),
    }
}

/// Merge stdout and stderr the way the invocation output reports them.
fn merge_output(stdout: Option<&str>, stderr: Option<&str>) -> Option<String> {
    match (
        stdout.filter(|s| !s.is_empty()),
        stderr.filter(|s| !s.is_empty()),
    ) {
        (Some(out), Some(err)) => Some(format!("{out}\n{err}")),
        (Some(out), None) => Some(out.to_string()),
        (None, Some(err)) => Some(err.to_string()),
        (None, None) => None,
    }
}

#[async_trait]
impl CommandTransport for SsmCommandTransport {
    async fn send(
        &self,
        credential: &CredentialEntry,
        region: &str,
        instance_id: &InstanceId,
        script: &Script,
        comment: &str,
    ) -> Result<CommandId, DispatchError> {
        let response = self
            .client(credential, region)
            .send_command()
            .instance_ids(instance_id)
            .document_name(script.interpreter.document_name())
            .comment(comment)
            .timeout_seconds(SSM_COMMAND_TIMEOUT_SECS)
            .parameters("commands", vec![script.content.clone()])
            .send()
            .await
            .map_err(|err| {
                let message = err.message().unwrap_or("SendCommand failed").to_string();
                classify::dispatch_error(err.code(), &message, instance_id)
            })?;

        let command_id = response
            .command()
            .and_then(|c| c.command_id())
            .ok_or_else(|| {
                DispatchError::Other("SendCommand response missing command ID".into())
            })?
            .to_string();

        tracing::info!(instance_id, command_id, "Command sent");
        Ok(command_id)
    }

    async fn poll(
        &self,
        credential: &CredentialEntry,
        region: &str,
        command_id: &CommandId,
        instance_id: &InstanceId,
    ) -> Result<CommandPoll, TrackingError> {
        let response = match self
            .client(credential, region)
            .get_command_invocation()
            .command_id(command_id)
            .instance_id(instance_id)
            .send()
            .await
        {
            Ok(response) => response,
            // The invocation record appears shortly after SendCommand;
            // until then the command is simply pending.
            Err(err) if err.code() == Some("InvocationDoesNotExist") => {
                return Ok(CommandPoll {
                    status: RemoteCommandStatus::Pending,
                    output: None,
                    exit_code: None,
                });
            }
            Err(err) => {
                let message = err
                    .message()
                    .unwrap_or("GetCommandInvocation failed")
                    .to_string();
                return Err(TrackingError::RemoteUnreachable(message));
            }
        };

        let status = map_status(
            response
                .status()
                .map(|s| s.as_str())
                .unwrap_or("Pending"),
        )?;

        let (output, exit_code) = if status.is_terminal() {
            (
                merge_output(
                    response.standard_output_content(),
                    response.standard_error_content(),
                ),
                Some(response.response_code()),
            )
        } else {
            (None, None)
        };

        Ok(CommandPoll {
            status,
            output,
            exit_code,
        })
    }

    async fn cancel(
        &self,
        credential: &CredentialEntry,
        region: &str,
        command_id: &CommandId,
        instance_id: &InstanceId,
    ) -> Result<(), TrackingError> {
        self.client(credential, region)
            .cancel_command()
            .command_id(command_id)
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|err| {
                let message = err.message().unwrap_or("CancelCommand failed").to_string();
                TrackingError::RemoteUnreachable(message)
            })?;

        tracing::info!(command_id, instance_id, "Cancellation requested");
        Ok(())
    }
}
