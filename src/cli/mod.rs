//! Command-line surface (spec §6), built with `clap`'s derive API the
//! way the teacher's own `Cli`/`Commands` pair is.

use std::path::PathBuf;

use clap::Parser;

/// `crit <runbook> [options]`
///
/// `<runbook>` stands in for the original config/sequence declaration
/// pair (see SPEC_FULL.md §1): one JSON file listing hosts and the
/// executor sequence to run against them.
#[derive(Parser, Debug)]
#[command(name = "crit")]
#[command(about = "Agentless remote-execution orchestrator: run tagged executor sequences over SSH.")]
pub struct Cli {
    /// Path to the runbook file.
    pub runbook: PathBuf,

    /// Comma-separated host urls, or `all`, or `localhost`/`127.0.0.1`.
    #[arg(short = 'h', long = "hosts", default_value = "all")]
    pub hosts: String,

    /// Comma-separated run-filter tags.
    #[arg(short = 't', long = "tags", default_value = "")]
    pub tags: String,

    /// Comma-separated skip-filter tags. Spec.md's short form is `-st`;
    /// clap only supports single-character shorts, so this is long-only.
    #[arg(long = "skip-tags", default_value = "")]
    pub skip_tags: String,

    /// Space-separated `KEY=VALUE` tokens, inserted into the registry's
    /// reserved extra-vars host before the sequence runs.
    #[arg(short = 'e', long = "extra-vars", default_value = "")]
    pub extra_vars: String,

    /// Verbosity, 0-3. Repeat to increase (`-vvv`).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Prompt once (no echo) for the sudo password.
    #[arg(short = 'p', long = "linux-pass", default_value_t = false)]
    pub linux_pass: bool,
}

impl Cli {
    pub fn tags_list(&self) -> Vec<String> {
        split_comma(&self.tags)
    }

    pub fn skip_tags_list(&self) -> Vec<String> {
        split_comma(&self.skip_tags)
    }

    pub fn extra_vars_tokens(&self) -> Vec<String> {
        self.extra_vars
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

fn split_comma(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tags_produce_empty_list() {
        let cli = Cli::parse_from(["crit", "run.json"]);
        assert!(cli.tags_list().is_empty());
        assert!(cli.skip_tags_list().is_empty());
    }

    #[test]
    fn comma_separated_tags_split_and_trim() {
        let cli = Cli::parse_from(["crit", "run.json", "-t", "web, deploy"]);
        assert_eq!(cli.tags_list(), vec!["web".to_string(), "deploy".to_string()]);
    }

    #[test]
    fn verbose_count_accumulates() {
        let cli = Cli::parse_from(["crit", "run.json", "-vvv"]);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn extra_vars_split_on_whitespace() {
        let cli = Cli::parse_from(["crit", "run.json", "-e", "ENV=prod REGION=us"]);
        assert_eq!(
            cli.extra_vars_tokens(),
            vec!["ENV=prod".to_string(), "REGION=us".to_string()]
        );
    }
}
