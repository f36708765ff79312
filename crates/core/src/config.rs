//! Engine configuration loaded from environment variables.

use std::time::Duration;

/// Tunable parameters for the execution engine.
///
/// All fields have defaults suitable for production use; override via
/// environment variables where operations need different limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent in-flight execution trackers per batch
    /// (default: `10`).
    pub max_concurrent_executions: usize,
    /// Per-execution wall-clock limit before the tracker records
    /// `timed_out` (default: `900` seconds).
    pub execution_timeout: Duration,
    /// Batch-level wall-clock limit; when it elapses every execution
    /// still in flight is cancelled (default: `3600` seconds).
    pub batch_timeout: Duration,
    /// First poll delay after dispatch (default: `2` seconds).
    pub poll_initial: Duration,
    /// Multiplicative poll backoff factor (default: `1.5`).
    pub poll_multiplier: f64,
    /// Upper bound on the poll interval (default: `15` seconds).
    pub poll_cap: Duration,
    /// Dispatch attempts on throttling (default: `3`).
    pub dispatch_attempts: u32,
    /// Base delay between dispatch retries (default: `1` second,
    /// doubled each attempt with jitter).
    pub dispatch_base_delay: Duration,
    /// Validity a cached credential must retain to be handed out
    /// (default: `300` seconds).
    pub credential_margin: Duration,
    /// Requested lifetime for assumed-role sessions and assumed expiry
    /// for long-term keys (default: `3600` seconds).
    pub session_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
            execution_timeout: Duration::from_secs(900),
            batch_timeout: Duration::from_secs(3600),
            poll_initial: Duration::from_secs(2),
            poll_multiplier: 1.5,
            poll_cap: Duration::from_secs(15),
            dispatch_attempts: 3,
            dispatch_base_delay: Duration::from_secs(1),
            credential_margin: Duration::from_secs(300),
            session_duration: Duration::from_secs(3600),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `MAX_CONCURRENT_EXECUTIONS` | `10`    |
    /// | `EXECUTION_TIMEOUT_SECS`    | `900`   |
    /// | `BATCH_TIMEOUT_SECS`        | `3600`  |
    /// | `POLL_INITIAL_SECS`         | `2`     |
    /// | `POLL_CAP_SECS`             | `15`    |
    /// | `DISPATCH_ATTEMPTS`         | `3`     |
    /// | `CREDENTIAL_MARGIN_SECS`    | `300`   |
    /// | `SESSION_DURATION_SECS`     | `3600`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_executions: env_parse(
                "MAX_CONCURRENT_EXECUTIONS",
                defaults.max_concurrent_executions,
            ),
            execution_timeout: env_secs("EXECUTION_TIMEOUT_SECS", defaults.execution_timeout),
            batch_timeout: env_secs("BATCH_TIMEOUT_SECS", defaults.batch_timeout),
            poll_initial: env_secs("POLL_INITIAL_SECS", defaults.poll_initial),
            poll_multiplier: defaults.poll_multiplier,
            poll_cap: env_secs("POLL_CAP_SECS", defaults.poll_cap),
            dispatch_attempts: env_parse("DISPATCH_ATTEMPTS", defaults.dispatch_attempts),
            dispatch_base_delay: defaults.dispatch_base_delay,
            credential_margin: env_secs("CREDENTIAL_MARGIN_SECS", defaults.credential_margin),
            session_duration: env_secs("SESSION_DURATION_SECS", defaults.session_duration),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_design_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_executions, 10);
        assert_eq!(config.execution_timeout, Duration::from_secs(900));
        assert_eq!(config.batch_timeout, Duration::from_secs(3600));
        assert_eq!(config.poll_initial, Duration::from_secs(2));
        assert_eq!(config.poll_cap, Duration::from_secs(15));
        assert_eq!(config.dispatch_attempts, 3);
        assert_eq!(config.credential_margin, Duration::from_secs(300));
    }
}
