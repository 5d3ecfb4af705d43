//! Host inventory model.
//!
//! A [`Host`] is an immutable descriptor of a remote machine `crit` can
//! open a shell session against. Equality and map-key identity are defined
//! by `url` alone — two hosts with the same url collide even if other
//! fields differ, which is how the config loader detects duplicates.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde_json::Value;

/// Default location of the private key used for SSH auth when a host
/// does not specify its own `ssh_identity_file`.
pub const DEFAULT_IDENTITY_FILE: &str = "~/.ssh/id_rsa";

/// Reserved urls recognized as "run locally, skip the network" targets.
pub const LOCALHOST_URLS: [&str; 2] = ["localhost", "127.0.0.1"];

/// An inventory entry: one machine `crit` can connect to.
#[derive(Debug, Clone)]
pub struct Host {
    pub url: String,
    pub ssh_user: String,
    pub ssh_password: Option<String>,
    pub ssh_identity_file: String,
    pub name: Option<String>,
    pub data: Option<HashMap<String, Value>>,
    /// True if this host's sudo does not prompt for a password.
    pub passwordless_user: bool,
}

impl Host {
    /// Builds a host with the identity file defaulted and no password set.
    pub fn new(url: impl Into<String>, ssh_user: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ssh_user: ssh_user.into(),
            ssh_password: None,
            ssh_identity_file: DEFAULT_IDENTITY_FILE.to_string(),
            name: None,
            data: None,
            passwordless_user: false,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.ssh_password = Some(password.into());
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<String>) -> Self {
        self.ssh_identity_file = path.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_data(mut self, data: HashMap<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn passwordless(mut self) -> Self {
        self.passwordless_user = true;
        self
    }

    /// Premade `Localhost` host: bypasses the network entirely in the
    /// session layer and runs commands via a local shell.
    pub fn localhost() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| "root".to_string());
        Self {
            url: "localhost".to_string(),
            ssh_user: user,
            ssh_password: None,
            ssh_identity_file: DEFAULT_IDENTITY_FILE.to_string(),
            name: None,
            data: None,
            passwordless_user: true,
        }
    }

    /// True if this host should bypass the network session path.
    pub fn is_localhost(&self) -> bool {
        LOCALHOST_URLS.contains(&self.url.as_str())
    }

    /// Display representation: `name` if set, else `url`. Used as the
    /// registry's host key and in rendered output.
    pub fn repr(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// Expands `~` in `ssh_identity_file` to the user's home directory.
    pub fn expanded_identity_file(&self) -> PathBuf {
        expand_tilde(&self.ssh_identity_file)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_prefers_name_over_url() {
        let h = Host::new("10.0.0.1", "deploy").with_name("web-1");
        assert_eq!(h.repr(), "web-1");
    }

    #[test]
    fn repr_falls_back_to_url() {
        let h = Host::new("10.0.0.1", "deploy");
        assert_eq!(h.repr(), "10.0.0.1");
    }

    #[test]
    fn equality_and_hash_are_url_only() {
        let a = Host::new("10.0.0.1", "deploy").with_name("a");
        let b = Host::new("10.0.0.1", "other").with_name("b");
        assert_eq!(a, b);
    }

    #[test]
    fn localhost_bypasses_network() {
        let h = Host::localhost();
        assert!(h.is_localhost());
        assert!(h.passwordless_user);
    }

    #[test]
    fn remote_host_is_not_localhost() {
        let h = Host::new("example.com", "deploy");
        assert!(!h.is_localhost());
    }

    #[test]
    fn expands_tilde_in_identity_file() {
        std::env::set_var("HOME", "/home/tester");
        let h = Host::new("example.com", "deploy");
        assert_eq!(
            h.expanded_identity_file(),
            PathBuf::from("/home/tester/.ssh/id_rsa")
        );
    }
}
