//! Pure classification of AWS error codes into the engine's taxonomy.
//!
//! Kept free of SDK types so the retry/refresh policies are testable
//! without a network. Callers extract `(code, message)` from an
//! `SdkError` via `ProvideErrorMetadata` and hand them here.

use fleetrun_core::error::{CredentialError, DiscoveryError, DispatchError};

/// Codes STS/EC2/SSM use for throttling and rate limiting.
fn is_throttle_code(code: &str) -> bool {
    matches!(
        code,
        "Throttling" | "ThrottlingException" | "RequestLimitExceeded" | "TooManyUpdates"
    )
}

/// Codes indicating the presented key material itself is bad or
/// expired.
fn is_bad_token_code(code: &str) -> bool {
    matches!(
        code,
        "InvalidClientTokenId"
            | "UnrecognizedClientException"
            | "SignatureDoesNotMatch"
            | "ExpiredToken"
            | "ExpiredTokenException"
            | "RequestExpired"
            | "AuthFailure"
    )
}

/// Classify an identity-service failure (validation or assume-role).
pub fn credential_error(code: Option<&str>, message: &str) -> CredentialError {
    match code {
        Some(code) if is_bad_token_code(code) => CredentialError::InvalidBase(message.to_string()),
        Some("AccessDenied") | Some("AccessDeniedException") => {
            CredentialError::AssumptionDenied(message.to_string())
        }
        _ => CredentialError::Transient(message.to_string()),
    }
}

/// Classify a command-submission failure for `instance_id`.
pub fn dispatch_error(code: Option<&str>, message: &str, instance_id: &str) -> DispatchError {
    match code {
        Some(code) if is_throttle_code(code) => DispatchError::Throttled(message.to_string()),
        Some(code) if is_bad_token_code(code) => DispatchError::AuthRejected(message.to_string()),
        Some("AccessDeniedException") => DispatchError::AuthRejected(message.to_string()),
        // SSM rejects instances that are stopped, terminated, or not
        // agent-managed with InvalidInstanceId.
        Some("InvalidInstanceId") | Some("UnsupportedPlatformType") => {
            DispatchError::IneligibleState {
                instance_id: instance_id.to_string(),
                reason: message.to_string(),
            }
        }
        _ => DispatchError::Other(message.to_string()),
    }
}

/// Classify an instance-discovery failure.
pub fn discovery_error(code: Option<&str>, message: &str) -> DiscoveryError {
    match code {
        Some(code) if is_bad_token_code(code) => DiscoveryError::AuthExpired(message.to_string()),
        Some("UnauthorizedOperation") => DiscoveryError::AuthExpired(message.to_string()),
        _ => DiscoveryError::Transient(message.to_string()),
    }
}
