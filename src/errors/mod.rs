//! Structured error types for the parts of `crit` that can fail before a
//! sequence ever starts running. Per-host failures during a run are not
//! exceptions — they are [`crate::result::ExecResult`] values — so this
//! module only covers the fatal, pre-run error kinds from spec.md §7.

use thiserror::Error;

/// Fatal configuration errors. Surfaced to the CLI with a nonzero exit
/// code; never raised mid-sequence.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The runbook's config section declared no hosts at all.
    #[error("config has no hosts defined")]
    NoHosts,

    /// Two hosts in `general_config.hosts` share the same `url`.
    #[error("more than one host with the same url in the config: {url}")]
    DuplicateHostUrl { url: String },

    /// `-h/--hosts` named a url not present in the inventory.
    #[error("host not found in config: {url}")]
    HostNotFound { url: String },

    /// The runbook file has no `sequence` section.
    #[error("runbook file does not contain a sequence")]
    NoSequence,

    /// An `-e/--extra-vars` token was not `KEY=VALUE`.
    #[error("extra-vars entry is not in KEY=VALUE format: {token}")]
    MalformedExtraVar { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_offending_value() {
        let err = ConfigError::DuplicateHostUrl {
            url: "10.0.0.1".into(),
        };
        assert!(err.to_string().contains("10.0.0.1"));
    }
}
