//! The sequence engine (spec §4.4, C6): runs a list of executors one at a
//! time, fanning each one out across its hosts in parallel.
//!
//! Scheduling is cooperative at the sequence level — executor *k+1* never
//! starts before every host has finished executor *k* — and parallel
//! within one executor, one task per host, joined via a [`JoinSet`] the
//! way [`crate::planner::DagPlanner`] joins its DAG layers.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::executors::{can_run_tags, Executor};
use crate::host::Host;
use crate::result::{ExecResult, Status};

/// An ordered list of executors run against a config's hosts (or each
/// executor's own host override).
pub struct Sequence {
    executors: Vec<Arc<dyn Executor>>,
    /// Sequence-level host override (spec §3: "optional host override").
    /// `None` means "use the config's hosts", same default as a single
    /// executor's own `hosts_override`.
    hosts: Option<Vec<Host>>,
}

impl Sequence {
    pub fn new(executors: Vec<Arc<dyn Executor>>) -> Self {
        Self { executors, hosts: None }
    }

    pub fn with_hosts(mut self, hosts: Vec<Host>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    /// Number of executors in the sequence, for run-limit validation.
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Runs every executor in order, fanning each one out across hosts,
    /// then closes every pooled SSH session (spec §4.4: "closes all the
    /// channels of the hosts after running the executors").
    pub async fn run(&self, config: &Config) {
        for executor in &self.executors {
            self.run_one(executor, config).await;
        }
        config.channels.close_all().await;
    }

    async fn run_one(&self, executor: &Arc<dyn Executor>, config: &Config) {
        info!(executor = %executor.display_name(), "running executor");

        if !can_run_tags(executor.tags(), config) {
            info!(executor = %executor.display_name(), "SKIPPING based on tags");
            return;
        }

        let hosts: Vec<Host> = executor
            .hosts_override()
            .map(<[Host]>::to_vec)
            .or_else(|| self.hosts.clone())
            .unwrap_or_else(|| config.hosts.clone());

        let mut set = JoinSet::new();
        for host in hosts {
            let executor = Arc::clone(executor);
            let config = config.clone();
            set.spawn(async move {
                let result = executor.run(host.clone(), &config).await;
                (host, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((host, result)) => render_result(&host, &result),
                Err(e) => error!(error = %e, "executor task panicked"),
            }
        }
    }
}

/// Logs one host's result at a level matching its severity (spec §4.4:
/// printed output order across hosts is not guaranteed).
fn render_result(host: &Host, result: &ExecResult) {
    match result.status() {
        Status::Fail => {
            error!(host = %host.repr(), message = %result.message, stdin = %result.stdin, "FAIL")
        }
        Status::Skipping => {
            info!(host = %host.repr(), message = %result.message, "SKIPPING")
        }
        Status::Changed => {
            warn!(host = %host.repr(), stdin = %result.stdin, "CHANGED")
        }
        Status::Success => {
            info!(host = %host.repr(), stdin = %result.stdin, "SUCCESS")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneralConfig;
    use crate::executors::command::CommandExecutor;

    #[tokio::test]
    async fn runs_every_executor_against_every_host() {
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        let config = Config::new(general, vec![]);

        let e1: Arc<dyn Executor> = Arc::new(CommandExecutor::command("echo one"));
        let e2: Arc<dyn Executor> = Arc::new(CommandExecutor::command("echo two").with_hosts(vec![Host::localhost()]));
        let sequence = Sequence::new(vec![e1, e2]);

        sequence.run(&config).await;
    }

    #[tokio::test]
    async fn sequence_level_tag_gate_skips_without_fanning_out() {
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        let config = Config::new(general, vec![]).with_tags(vec!["db".into()]);

        let executor: Arc<dyn Executor> = Arc::new(CommandExecutor::command("echo hi").with_tags(vec!["web".into()]));
        let sequence = Sequence::new(vec![executor]);

        sequence.run(&config).await;
    }

    #[tokio::test]
    async fn sequence_level_host_override_is_used_when_executor_has_none() {
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        let config = Config::new(general, vec![]);

        let executor: Arc<dyn Executor> = Arc::new(CommandExecutor::command("echo hi"));
        let sequence = Sequence::new(vec![executor]).with_hosts(vec![Host::localhost()]);

        sequence.run(&config).await;
    }
}
