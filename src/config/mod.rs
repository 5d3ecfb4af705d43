//! Process-scoped run configuration (spec §3 `Config`).
//!
//! `Config` is the process-wide aggregate every executor reads from: the
//! selected hosts, the tag filters, the pooled sessions, the registry, and
//! the sudo password. It is built once by the CLI before
//! [`crate::sequence::Sequence::run`] and is read-only afterward except
//! for `registry` and `channels`, which are internally synchronized.

use std::collections::HashMap;

use crate::host::Host;
use crate::registry::Registry;
use crate::session::SessionPool;

/// Minimal stand-in for a secret-store client (the original's HashiCorp
/// Vault integration). Only the read path templates/executors need is
/// modeled; no real Vault wire protocol is in scope for this crate.
#[derive(Debug, Clone, Default)]
pub struct VaultClient {
    secrets: HashMap<String, String>,
}

impl VaultClient {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    pub fn get_secret(&self, path: &str) -> Option<&str> {
        self.secrets.get(path).map(String::as_str)
    }
}

/// The user-declared inventory and auxiliary clients, set once at startup
/// and read-only for the lifetime of the run.
#[derive(Debug, Clone, Default)]
pub struct GeneralConfig {
    pub hosts: Vec<Host>,
    pub vault: Option<VaultClient>,
}

impl GeneralConfig {
    /// Builds a `GeneralConfig`, rejecting duplicate host urls up front
    /// (spec §3 invariant 1: "duplicate URLs forbidden ... fails at
    /// config load").
    pub fn new(hosts: Vec<Host>) -> Result<Self, crate::errors::ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for host in &hosts {
            if !seen.insert(host.url.clone()) {
                return Err(crate::errors::ConfigError::DuplicateHostUrl {
                    url: host.url.clone(),
                });
            }
        }
        if hosts.is_empty() {
            return Err(crate::errors::ConfigError::NoHosts);
        }
        Ok(Self { hosts, vault: None })
    }

    pub fn with_vault(mut self, vault: VaultClient) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn find_host(&self, url: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.url == url)
    }
}

/// The process-wide run configuration.
#[derive(Clone)]
pub struct Config {
    pub general_config: GeneralConfig,
    pub hosts: Vec<Host>,
    pub channels: SessionPool,
    pub tags: Vec<String>,
    pub skip_tags: Vec<String>,
    pub registry: Registry,
    pub verbose: u8,
    pub linux_password: Option<String>,
    pub sequence_name: Option<String>,
}

impl Config {
    /// Builds a `Config` for a run. `hosts` must already be the resolved
    /// subset described by spec §3 invariant 1
    /// (`hosts ⊆ general_config.hosts ∪ {Localhost}`).
    pub fn new(general_config: GeneralConfig, hosts: Vec<Host>) -> Self {
        Self {
            general_config,
            hosts,
            channels: SessionPool::new(),
            tags: Vec::new(),
            skip_tags: Vec::new(),
            registry: Registry::new(),
            verbose: 0,
            linux_password: None,
            sequence_name: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_skip_tags(mut self, skip_tags: Vec<String>) -> Self {
        self.skip_tags = skip_tags;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_linux_password(mut self, password: impl Into<String>) -> Self {
        self.linux_password = Some(password.into());
        self
    }

    /// True if `host` is part of this run's selected hosts (or is
    /// Localhost, which is always implicitly allowed per spec §4.2 step 2).
    pub fn allows_host(&self, host: &Host) -> bool {
        host.is_localhost() || self.hosts.iter().any(|h| h == host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_host_urls_rejected_at_load() {
        let hosts = vec![Host::new("10.0.0.1", "a"), Host::new("10.0.0.1", "b")];
        let err = GeneralConfig::new(hosts).unwrap_err();
        assert!(matches!(err, crate::errors::ConfigError::DuplicateHostUrl { .. }));
    }

    #[test]
    fn empty_inventory_rejected() {
        let err = GeneralConfig::new(vec![]).unwrap_err();
        assert!(matches!(err, crate::errors::ConfigError::NoHosts));
    }

    #[test]
    fn allows_host_accepts_localhost_unconditionally() {
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "a")]).expect("ok");
        let config = Config::new(general, vec![]);
        assert!(config.allows_host(&Host::localhost()));
    }

    #[test]
    fn allows_host_rejects_hosts_outside_selection() {
        let general = GeneralConfig::new(vec![
            Host::new("10.0.0.1", "a"),
            Host::new("10.0.0.2", "b"),
        ])
        .expect("ok");
        let selected = vec![general.hosts[0].clone()];
        let config = Config::new(general, selected);
        assert!(config.allows_host(&Host::new("10.0.0.1", "a")));
        assert!(!config.allows_host(&Host::new("10.0.0.2", "b")));
    }
}
