//! Ambient run limits: sanity caps on a runbook's size, read from
//! environment variables the same way the teacher's `ExecutionLimits`
//! reads `RUNNER_MAX_*`. Not part of the executor model itself — a
//! guard applied once, before the sequence starts.

use std::time::Duration;

/// Default cap on the number of hosts one run may target.
pub const DEFAULT_MAX_HOSTS: usize = 200;

/// Default cap on the number of executors in one sequence.
pub const DEFAULT_MAX_EXECUTORS: usize = 500;

/// Default per-command timeout. The core run loop does not enforce this
/// itself (spec §5: "none in the core"); it is available for callers
/// that want to wrap `SessionPool::run_command` in a `tokio::time::timeout`.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct RunLimits {
    pub max_hosts: usize,
    pub max_executors: usize,
    pub command_timeout: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_hosts: DEFAULT_MAX_HOSTS,
            max_executors: DEFAULT_MAX_EXECUTORS,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }
}

impl RunLimits {
    /// Reads `CRIT_MAX_HOSTS`, `CRIT_MAX_EXECUTORS`, `CRIT_COMMAND_TIMEOUT_SECS`,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Ok(val) = std::env::var("CRIT_MAX_HOSTS") {
            if let Ok(n) = val.parse() {
                limits.max_hosts = n;
            }
        }
        if let Ok(val) = std::env::var("CRIT_MAX_EXECUTORS") {
            if let Ok(n) = val.parse() {
                limits.max_executors = n;
            }
        }
        if let Ok(val) = std::env::var("CRIT_COMMAND_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                limits.command_timeout = Duration::from_secs(n);
            }
        }

        limits
    }
}

#[derive(Debug, Clone)]
pub struct LimitViolation {
    pub limit_name: &'static str,
    pub message: String,
}

/// Checks a loaded runbook against `limits`, returning any violations.
/// Does not fail the process itself — the CLI surfaces these as a
/// pre-run config error, same exit-code class as a malformed runbook.
pub fn validate_limits(host_count: usize, executor_count: usize, limits: &RunLimits) -> Vec<LimitViolation> {
    let mut violations = Vec::new();

    if host_count > limits.max_hosts {
        violations.push(LimitViolation {
            limit_name: "max_hosts",
            message: format!("runbook targets {host_count} hosts, limit is {}", limits.max_hosts),
        });
    }
    if executor_count > limits.max_executors {
        violations.push(LimitViolation {
            limit_name: "max_executors",
            message: format!(
                "runbook declares {executor_count} executors, limit is {}",
                limits.max_executors
            ),
        });
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_a_small_runbook() {
        let limits = RunLimits::default();
        assert!(validate_limits(3, 5, &limits).is_empty());
    }

    #[test]
    fn flags_too_many_hosts() {
        let limits = RunLimits::default();
        let violations = validate_limits(limits.max_hosts + 1, 1, &limits);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].limit_name, "max_hosts");
    }
}
