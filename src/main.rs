//! `crit` CLI entry point.
//!
//! Parses arguments, loads the runbook, resolves the host selection and
//! extra-vars, then hands everything to [`crit::sequence::Sequence::run`].
//! Per spec §6: exit code is 0 on completion; nonzero only for pre-run
//! errors. Per-host `FAIL` results never change the exit code.

use clap::Parser;
use tracing::{error, info, Level};
use uuid::Uuid;

use crit::cli::Cli;
use crit::config::Config;
use crit::errors::ConfigError;
use crit::host::Host;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let run_id = Uuid::new_v4();
    let start = chrono::Utc::now();
    info!(run_id = %run_id, runbook = %cli.runbook.display(), "crit starting");

    if let Err(e) = run(&cli).await {
        error!(run_id = %run_id, error = %e, "crit exiting with a pre-run error");
        std::process::exit(1);
    }

    let elapsed = chrono::Utc::now().signed_duration_since(start);
    info!(run_id = %run_id, elapsed_ms = elapsed.num_milliseconds(), "crit finished");
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let (general_config, sequence) = crit::runbook::load_runbook(&cli.runbook)?;

    let limits = crit::limits::RunLimits::from_env();
    let violations = crit::limits::validate_limits(general_config.hosts.len(), sequence.len(), &limits);
    if !violations.is_empty() {
        for v in &violations {
            error!(limit = v.limit_name, "{}", v.message);
        }
        anyhow::bail!("runbook exceeds configured run limits");
    }

    let hosts = resolve_hosts(&cli.hosts, &general_config)?;

    let mut config = Config::new(general_config, hosts)
        .with_tags(cli.tags_list())
        .with_skip_tags(cli.skip_tags_list())
        .with_verbose(cli.verbose);

    for token in cli.extra_vars_tokens() {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedExtraVar { token: token.clone() })?;
        config.registry.set_extra_var(key, value).await;
    }

    if cli.linux_pass {
        let password = rpassword::prompt_password("sudo password: ")?;
        config = config.with_linux_password(password);
    }

    sequence.run(&config).await;

    Ok(())
}

/// Implements spec §6's `-h/--hosts` selection: `all`, `localhost`/`127.0.0.1`,
/// or a comma list of inventory urls. Unknown urls are a pre-run config error.
fn resolve_hosts(spec: &str, general_config: &crit::config::GeneralConfig) -> anyhow::Result<Vec<Host>> {
    match spec {
        "all" => Ok(general_config.hosts.clone()),
        "localhost" | "127.0.0.1" => Ok(vec![Host::localhost()]),
        urls => urls
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|url| {
                general_config
                    .find_host(url)
                    .cloned()
                    .ok_or_else(|| ConfigError::HostNotFound { url: url.to_string() }.into())
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crit::config::GeneralConfig;

    fn sample_general_config() -> GeneralConfig {
        GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy"), Host::new("10.0.0.2", "deploy")]).expect("ok")
    }

    #[test]
    fn all_selects_every_inventory_host() {
        let general_config = sample_general_config();
        let hosts = resolve_hosts("all", &general_config).expect("ok");
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn localhost_bypasses_inventory() {
        let general_config = sample_general_config();
        let hosts = resolve_hosts("localhost", &general_config).expect("ok");
        assert_eq!(hosts, vec![Host::localhost()]);
    }

    #[test]
    fn unknown_url_is_a_config_error() {
        let general_config = sample_general_config();
        assert!(resolve_hosts("10.0.0.9", &general_config).is_err());
    }

    #[test]
    fn comma_list_resolves_each_url() {
        let general_config = sample_general_config();
        let hosts = resolve_hosts("10.0.0.1, 10.0.0.2", &general_config).expect("ok");
        assert_eq!(hosts.len(), 2);
    }
}
