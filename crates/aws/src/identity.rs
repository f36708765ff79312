//! STS-backed identity client: credential validation and role
//! assumption.
//!
//! Each call builds a short-lived STS client pinned to the partition's
//! regional endpoint (GovCloud has no global STS endpoint). Stateless
//! by design — caching and refresh discipline live in the credential
//! store.

use async_trait::async_trait;
use aws_sdk_sts::config::{BehaviorVersion, Region};
use aws_sdk_sts::error::ProvideErrorMetadata;

use fleetrun_core::credential::CredentialEntry;
use fleetrun_core::error::CredentialError;
use fleetrun_core::transport::{expiry_from_epoch_secs, IdentityClient};
use fleetrun_core::types::{CallerIdentity, Environment};

use crate::classify;
use crate::sdk_credentials;

/// Identity/trust transport backed by AWS STS.
#[derive(Debug, Default)]
pub struct StsIdentityClient {
    /// Requested lifetime for assumed-role sessions, seconds.
    session_duration_secs: i32,
}

impl StsIdentityClient {
    pub fn new(session_duration: std::time::Duration) -> Self {
        Self {
            session_duration_secs: session_duration.as_secs().min(i32::MAX as u64) as i32,
        }
    }

    fn client(&self, environment: Environment, entry: &CredentialEntry) -> aws_sdk_sts::Client {
        let config = aws_sdk_sts::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(environment.home_region()))
            .endpoint_url(environment.sts_endpoint())
            .credentials_provider(sdk_credentials(entry))
            .build();
        aws_sdk_sts::Client::from_conf(config)
    }
}

#[async_trait]
impl IdentityClient for StsIdentityClient {
    async fn validate(
        &self,
        environment: Environment,
        credential: &CredentialEntry,
    ) -> Result<CallerIdentity, CredentialError> {
        let response = self
            .client(environment, credential)
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| {
                let message = err.message().unwrap_or("GetCallerIdentity failed").to_string();
                classify::credential_error(err.code(), &message)
            })?;

        let account = response
            .account()
            .ok_or_else(|| CredentialError::Transient("identity response missing account".into()))?
            .to_string();
        let arn = response
            .arn()
            .ok_or_else(|| CredentialError::Transient("identity response missing ARN".into()))?
            .to_string();

        tracing::info!(%environment, account, "Validated caller identity");
        Ok(CallerIdentity { account, arn })
    }

    async fn assume_role(
        &self,
        environment: Environment,
        base: &CredentialEntry,
        role_arn: &str,
        session_name: &str,
    ) -> Result<CredentialEntry, CredentialError> {
        tracing::debug!(%environment, role_arn, "Assuming role");

        let response = self
            .client(environment, base)
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(self.session_duration_secs)
            .send()
            .await
            .map_err(|err| {
                let message = err.message().unwrap_or("AssumeRole failed").to_string();
                classify::credential_error(err.code(), &message)
            })?;

        let credentials = response.credentials().ok_or_else(|| {
            CredentialError::Transient("AssumeRole response missing credentials".into())
        })?;

        Ok(CredentialEntry {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: Some(credentials.session_token().to_string()),
            expires_at: expiry_from_epoch_secs(credentials.expiration().secs()),
            temporary: true,
        })
    }
}
