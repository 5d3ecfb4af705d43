//! JSON runbook loader.
//!
//! Loading a foreign host DSL is out of scope; instead a run is described
//! by one JSON file declaring the inventory and the executor sequence,
//! read the same way [`crate::loader::load_plan_from_file`] reads a UTDL
//! plan. `env` is a list of `[key, value]` pairs rather than a JSON object
//! so insertion order survives `serde_json`'s default (non-preserving)
//! map deserialization.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::config::{GeneralConfig, VaultClient};
use crate::errors::ConfigError;
use crate::executors::command::CommandExecutor;
use crate::executors::git::GitExecutor;
use crate::executors::template::TemplateExecutor;
use crate::executors::{Executor, MultiExecutorBase};
use crate::host::Host;
use crate::sequence::Sequence;

#[derive(Debug, Deserialize)]
struct RunbookHost {
    url: String,
    ssh_user: String,
    #[serde(default)]
    ssh_password: Option<String>,
    #[serde(default)]
    ssh_identity_file: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    passwordless_user: bool,
}

#[derive(Debug, Deserialize, Default)]
struct RunbookCommonFields {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    sudo: bool,
    #[serde(default)]
    register: Option<String>,
    #[serde(default)]
    env: Vec<(String, String)>,
    #[serde(default)]
    chdir: Option<String>,
    #[serde(default)]
    output: bool,
    #[serde(default)]
    hosts: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RunbookExecutor {
    Command {
        command: String,
        #[serde(flatten)]
        common: RunbookCommonFields,
    },
    Template {
        src: String,
        dest: String,
        #[serde(flatten)]
        common: RunbookCommonFields,
    },
    Git {
        repository: String,
        #[serde(default = "default_git_version")]
        version: String,
        #[serde(default)]
        force: bool,
        #[serde(flatten)]
        common: RunbookCommonFields,
    },
}

fn default_git_version() -> String {
    "master".to_string()
}

#[derive(Debug, Deserialize)]
struct RunbookFile {
    hosts: Vec<RunbookHost>,
    #[serde(default)]
    sequence: Vec<RunbookExecutor>,
    /// Sequence-level host override (spec.md §3), a subset of `hosts` by
    /// url. Distinct from an individual executor's own `hosts` override.
    #[serde(default)]
    sequence_hosts: Option<Vec<String>>,
}

/// Loads a runbook JSON file and resolves it into a [`GeneralConfig`] and
/// a runnable [`Sequence`]. Host references inside `sequence[*].hosts`
/// must name a url declared in `hosts`.
pub fn load_runbook(path: impl AsRef<Path>) -> Result<(GeneralConfig, Sequence)> {
    let content = fs::read_to_string(path.as_ref()).context("failed to read runbook file")?;
    let runbook: RunbookFile = serde_json::from_str(&content).context("failed to parse runbook JSON")?;

    let hosts: Vec<Host> = runbook
        .hosts
        .into_iter()
        .map(|h| {
            let mut host = Host::new(h.url, h.ssh_user);
            if h.passwordless_user {
                host = host.passwordless();
            }
            if let Some(password) = h.ssh_password {
                host = host.with_password(password);
            }
            if let Some(identity) = h.ssh_identity_file {
                host = host.with_identity_file(identity);
            }
            if let Some(name) = h.name {
                host = host.with_name(name);
            }
            host
        })
        .collect();

    let general_config = GeneralConfig::new(hosts)?.with_vault(VaultClient::new(Default::default()));

    if runbook.sequence.is_empty() {
        return Err(ConfigError::NoSequence.into());
    }

    let executors = runbook
        .sequence
        .into_iter()
        .map(|entry| build_executor(entry, &general_config))
        .collect::<Result<Vec<Arc<dyn Executor>>>>()?;

    let mut sequence = Sequence::new(executors);
    if let Some(hosts) = resolve_hosts(runbook.sequence_hosts, &general_config)? {
        sequence = sequence.with_hosts(hosts);
    }

    Ok((general_config, sequence))
}

fn resolve_hosts(urls: Option<Vec<String>>, general_config: &GeneralConfig) -> Result<Option<Vec<Host>>> {
    let Some(urls) = urls else { return Ok(None) };
    let hosts = urls
        .into_iter()
        .map(|url| {
            general_config
                .find_host(&url)
                .cloned()
                .ok_or_else(|| ConfigError::HostNotFound { url: url.clone() }.into())
        })
        .collect::<Result<Vec<Host>>>()?;
    Ok(Some(hosts))
}

fn build_executor(entry: RunbookExecutor, general_config: &GeneralConfig) -> Result<Arc<dyn Executor>> {
    match entry {
        RunbookExecutor::Command { command, common } => {
            let mut executor = CommandExecutor::command(command)
                .with_tags(common.tags)
                .with_sudo(common.sudo)
                .with_env(common.env)
                .with_output(common.output);
            if let Some(name) = common.name {
                executor = executor.with_name(name);
            }
            if let Some(register) = common.register {
                executor = executor.with_register(register);
            }
            if let Some(chdir) = common.chdir {
                executor = executor.with_chdir(chdir);
            }
            if let Some(hosts) = resolve_hosts(common.hosts, general_config)? {
                executor = executor.with_hosts(hosts);
            }
            Ok(Arc::new(executor))
        }
        RunbookExecutor::Template { src, dest, common } => {
            let mut executor = TemplateExecutor::template(src, dest, common.sudo)
                .with_tags(common.tags)
                .with_env(common.env)
                .with_output(common.output);
            if let Some(name) = common.name {
                executor = executor.with_name(name);
            }
            if let Some(register) = common.register {
                executor = executor.with_register(register);
            }
            if let Some(chdir) = common.chdir {
                executor = executor.with_chdir(chdir);
            }
            if let Some(hosts) = resolve_hosts(common.hosts, general_config)? {
                executor = executor.with_hosts(hosts);
            }
            Ok(Arc::new(executor))
        }
        RunbookExecutor::Git {
            repository,
            version,
            force,
            common,
        } => {
            let hosts = resolve_hosts(common.hosts, general_config)?;
            let base = MultiExecutorBase {
                name: common.name,
                hosts,
                tags: common.tags,
                sudo: common.sudo,
                register: common.register,
                env: common.env,
                chdir: common.chdir,
            };
            Ok(Arc::new(GitExecutor::new(repository, version, force).with_base(base)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_runbook() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        std::io::Write::write_all(
            &mut file,
            br#"{
                "hosts": [{"url": "10.0.0.1", "ssh_user": "deploy"}],
                "sequence": [{"type": "command", "command": "echo hi"}]
            }"#,
        )
        .expect("write");

        let (general_config, _sequence) = load_runbook(file.path()).expect("loads");
        assert_eq!(general_config.hosts.len(), 1);
        assert_eq!(general_config.hosts[0].url, "10.0.0.1");
    }

    #[test]
    fn rejects_empty_sequence() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        std::io::Write::write_all(
            &mut file,
            br#"{"hosts": [{"url": "10.0.0.1", "ssh_user": "deploy"}], "sequence": []}"#,
        )
        .expect("write");

        let err = load_runbook(file.path()).unwrap_err();
        assert!(err.to_string().contains("does not contain a sequence"));
    }

    #[test]
    fn sequence_hosts_sets_sequence_level_override() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        std::io::Write::write_all(
            &mut file,
            br#"{
                "hosts": [
                    {"url": "10.0.0.1", "ssh_user": "deploy"},
                    {"url": "10.0.0.2", "ssh_user": "deploy"}
                ],
                "sequence": [{"type": "command", "command": "echo hi"}],
                "sequence_hosts": ["10.0.0.1"]
            }"#,
        )
        .expect("write");

        let (_general_config, sequence) = load_runbook(file.path()).expect("loads");
        assert_eq!(sequence.len(), 1);
    }

    #[test]
    fn unresolved_executor_host_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        std::io::Write::write_all(
            &mut file,
            br#"{
                "hosts": [{"url": "10.0.0.1", "ssh_user": "deploy"}],
                "sequence": [{"type": "command", "command": "echo hi", "hosts": ["10.0.0.2"]}]
            }"#,
        )
        .expect("write");

        let err = load_runbook(file.path()).unwrap_err();
        assert!(err.to_string().contains("10.0.0.2"));
    }
}
