//! Compute instance snapshots and discovery filters.
//!
//! An [`Instance`] is a read-only snapshot produced by one discovery
//! pass. It is never mutated locally — when staleness matters, the
//! caller re-discovers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::InstanceId;

/// OS family of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    /// EC2 reports a `platform` field only for Windows; anything else
    /// is treated as Linux.
    pub fn from_ec2(platform: Option<&str>) -> Self {
        match platform {
            Some(p) if p.eq_ignore_ascii_case("windows") => Self::Windows,
            _ => Self::Linux,
        }
    }
}

/// EC2 instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    /// Parse the state name as reported by the EC2 API.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "shutting-down" => Some(Self::ShuttingDown),
            "terminated" => Some(Self::Terminated),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// State name as used by the EC2 `instance-state-name` filter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the remote-execution transport will accept a command for
    /// an instance in this state.
    pub fn dispatch_eligible(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Read-only snapshot of a compute instance from one discovery pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub platform: Platform,
    pub state: InstanceState,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    /// Tag mapping; keys are unique, insertion order irrelevant.
    pub tags: HashMap<String, String>,
}

/// Filter set for instance discovery.
///
/// All present filters must match. Built with the `with_*` methods:
///
/// ```rust
/// use fleetrun_core::instance::{DiscoveryFilters, InstanceState, Platform};
///
/// let filters = DiscoveryFilters::default()
///     .with_state(InstanceState::Running)
///     .with_platform(Platform::Linux)
///     .with_tag("team", "ops");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryFilters {
    /// Restrict by OS family.
    pub platform: Option<Platform>,
    /// Restrict by lifecycle state.
    pub state: Option<InstanceState>,
    /// Exact-match tag key/value pairs.
    pub tags: HashMap<String, String>,
}

impl DiscoveryFilters {
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_state(mut self, state: InstanceState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Whether `instance` satisfies every present filter.
    ///
    /// The EC2 adapter pushes state and tag filters server-side; this
    /// local check covers the platform filter and backstops providers
    /// that cannot filter remotely.
    pub fn matches(&self, instance: &Instance) -> bool {
        if let Some(platform) = self.platform {
            if instance.platform != platform {
                return false;
            }
        }
        if let Some(state) = self.state {
            if instance.state != state {
                return false;
            }
        }
        self.tags
            .iter()
            .all(|(k, v)| instance.tags.get(k) == Some(v))
    }
}
