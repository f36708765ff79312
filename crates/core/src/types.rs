//! Cloud partition, account, and identifier types.
//!
//! An [`Environment`] is a top-level trust partition (commercial vs.
//! GovCloud). Accounts, regions, and the remote-command identifiers are
//! plain string aliases — they are opaque handles minted by AWS, and the
//! engine never inspects their structure.

use serde::{Deserialize, Serialize};

/// AWS account ID (12-digit string).
pub type AccountId = String;

/// AWS region name, e.g. `us-east-1` or `us-gov-west-1`.
pub type RegionName = String;

/// EC2 instance ID, e.g. `i-0abc123`.
pub type InstanceId = String;

/// SSM command ID returned by the remote-execution transport.
pub type CommandId = String;

/// Conventional cross-account role created by AWS Organizations.
pub const ORG_ACCESS_ROLE: &str = "OrganizationAccountAccessRole";

/// A top-level cloud trust partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Commercial AWS partition (`aws`).
    Com,
    /// GovCloud partition (`aws-us-gov`).
    Gov,
}

impl Environment {
    /// Parse from the operator-facing short name (`com` / `gov`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "com" => Some(Self::Com),
            "gov" => Some(Self::Gov),
            _ => None,
        }
    }

    /// ARN partition name.
    pub fn partition(self) -> &'static str {
        match self {
            Self::Com => "aws",
            Self::Gov => "aws-us-gov",
        }
    }

    /// Region used for partition-level API calls (STS, Organizations).
    pub fn home_region(self) -> &'static str {
        match self {
            Self::Com => "us-east-1",
            Self::Gov => "us-gov-west-1",
        }
    }

    /// Regional STS endpoint for the partition.
    ///
    /// GovCloud has no global STS endpoint, so both partitions pin the
    /// regional one.
    pub fn sts_endpoint(self) -> &'static str {
        match self {
            Self::Com => "https://sts.us-east-1.amazonaws.com",
            Self::Gov => "https://sts.us-gov-west-1.amazonaws.com",
        }
    }

    /// US regions reachable within the partition.
    pub fn regions(self) -> &'static [&'static str] {
        match self {
            Self::Com => &["us-east-1", "us-east-2", "us-west-1", "us-west-2"],
            Self::Gov => &["us-gov-west-1", "us-gov-east-1"],
        }
    }

    /// ARN of the conventional organization-access role in `account`.
    pub fn org_role_arn(self, account: &str) -> String {
        format!(
            "arn:{}:iam::{}:role/{}",
            self.partition(),
            account,
            ORG_ACCESS_ROLE
        )
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Com => write!(f, "com"),
            Self::Gov => write!(f, "gov"),
        }
    }
}

/// An account visible to the operator, as reported by the account
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    /// 12-digit account ID.
    pub id: AccountId,
    /// Human-readable account name, when the directory provides one.
    pub name: Option<String>,
    /// Directory status string (e.g. `ACTIVE`).
    pub status: Option<String>,
}

/// Resolved caller identity for a validated credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Account the credential belongs to.
    pub account: AccountId,
    /// Full ARN of the calling principal.
    pub arn: String,
}
