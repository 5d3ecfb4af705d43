//! Git repository executors: `clone` → `checkout` → `pull`, composed into
//! one `MultiExecutor`-style [`GitExecutor`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{CommandSource, ExecContext, Executor, MultiExecutorBase, SingleExecutor};
use crate::config::Config;
use crate::host::Host;
use crate::result::ExecResult;

static ALREADY_CLONED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"fatal: destination path .* already exists and is not an empty directory").unwrap());

#[derive(Debug, Clone)]
pub struct GitCloneSource {
    pub repository: String,
}

#[async_trait]
impl CommandSource for GitCloneSource {
    async fn commands(&self, _ctx: &ExecContext<'_>) -> anyhow::Result<String> {
        Ok(format!("git clone {}", self.repository))
    }

    fn catched_error(&self, output: &[String]) -> bool {
        output.first().is_some_and(|line| ALREADY_CLONED.is_match(line))
    }

    fn is_changed(&self, output: &[String]) -> bool {
        output.iter().any(|line| line.contains("Cloning into"))
    }
}

pub type GitCloneExecutor = SingleExecutor<GitCloneSource>;

#[derive(Debug, Clone)]
pub struct GitCheckoutSource {
    pub version: String,
    pub force: bool,
}

#[async_trait]
impl CommandSource for GitCheckoutSource {
    async fn commands(&self, _ctx: &ExecContext<'_>) -> anyhow::Result<String> {
        let force = if self.force { "--force " } else { "" };
        Ok(format!("git checkout {force}{}", self.version))
    }

    fn is_changed(&self, output: &[String]) -> bool {
        output.iter().any(|line| line.contains("Switched to branch"))
    }
}

pub type GitCheckoutExecutor = SingleExecutor<GitCheckoutSource>;

#[derive(Debug, Clone)]
pub struct GitPullSource {
    pub force: bool,
}

#[async_trait]
impl CommandSource for GitPullSource {
    async fn commands(&self, _ctx: &ExecContext<'_>) -> anyhow::Result<String> {
        let force = if self.force { " --force" } else { "" };
        Ok(format!("git pull{force}"))
    }

    fn is_changed(&self, output: &[String]) -> bool {
        output.iter().any(|line| line.contains("Updating"))
    }
}

pub type GitPullExecutor = SingleExecutor<GitPullSource>;

/// Clones, checks out, and pulls `repository` at `version`, short-circuiting
/// on the first child `FAIL` (spec §4.3, §9 scenario 5).
pub struct GitExecutor {
    pub base: MultiExecutorBase,
    pub repository: String,
    pub version: String,
    pub force: bool,
}

impl GitExecutor {
    pub fn new(repository: impl Into<String>, version: impl Into<String>, force: bool) -> Self {
        Self {
            base: MultiExecutorBase::default(),
            repository: repository.into(),
            version: version.into(),
            force,
        }
    }

    pub fn with_base(mut self, base: MultiExecutorBase) -> Self {
        self.base = base;
        self
    }

    fn clone_child(&self) -> GitCloneExecutor {
        let attrs = self.base.base_attributes();
        SingleExecutor::new(GitCloneSource {
            repository: self.repository.clone(),
        })
        .with_name(format!("Cloning {}", self.repository))
        .with_tags(attrs.tags)
        .with_sudo(attrs.sudo)
        .with_env(attrs.env)
        .maybe_chdir(attrs.chdir)
        .maybe_register(attrs.register)
    }

    fn checkout_child(&self) -> GitCheckoutExecutor {
        let attrs = self.base.base_attributes();
        SingleExecutor::new(GitCheckoutSource {
            version: self.version.clone(),
            force: self.force,
        })
        .with_name(format!("Checking out {} for {}", self.version, self.repository))
        .with_tags(attrs.tags)
        .with_sudo(attrs.sudo)
        .with_env(attrs.env)
        .maybe_chdir(attrs.chdir)
        .maybe_register(attrs.register)
    }

    fn pull_child(&self) -> GitPullExecutor {
        let attrs = self.base.base_attributes();
        SingleExecutor::new(GitPullSource { force: self.force })
            .with_name(format!("Pulling {}", self.repository))
            .with_tags(attrs.tags)
            .with_sudo(attrs.sudo)
            .with_env(attrs.env)
            .maybe_chdir(attrs.chdir)
            .maybe_register(attrs.register)
    }
}

#[async_trait]
impl Executor for GitExecutor {
    fn display_name(&self) -> String {
        self.base.name.clone().unwrap_or_else(|| format!("GitExecutor({})", self.repository))
    }

    fn hosts_override(&self) -> Option<&[Host]> {
        self.base.hosts.as_deref()
    }

    fn tags(&self) -> &[String] {
        &self.base.tags
    }

    async fn run(&self, host: Host, config: &Config) -> ExecResult {
        if !super::can_run_tags(&self.base.tags, config) {
            return ExecResult::skipping("Skipping based on tags");
        }
        if let Some(skip) = super::host_gate(&host, self.base.hosts.as_deref(), config) {
            return skip;
        }

        let mut results = Vec::with_capacity(3);

        if let Some(failed) = self
            .base
            .execute_executor(&self.clone_child(), &host, config, &mut results)
            .await
        {
            return failed;
        }
        if let Some(failed) = self
            .base
            .execute_executor(&self.checkout_child(), &host, config, &mut results)
            .await
        {
            return failed;
        }
        if let Some(failed) = self
            .base
            .execute_executor(&self.pull_child(), &host, config, &mut results)
            .await
        {
            return failed;
        }

        let result = self.base.result_from_executor(&results, "Updated github repository");
        config
            .registry
            .register(host.repr(), self.base.register.as_deref(), result.clone())
            .await;
        result
    }
}

/// Small ergonomic helper: `Option<String>` chdir/register without an
/// extra branch at every call site in [`GitExecutor`]'s child builders.
trait MaybeChdir {
    fn maybe_chdir(self, chdir: Option<String>) -> Self;
    fn maybe_register(self, register: Option<String>) -> Self;
}

impl<T: super::CommandSource> MaybeChdir for SingleExecutor<T> {
    fn maybe_chdir(self, chdir: Option<String>) -> Self {
        match chdir {
            Some(dir) => self.with_chdir(dir),
            None => self,
        }
    }

    fn maybe_register(self, register: Option<String>) -> Self {
        match register {
            Some(name) => self.with_register(name),
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GeneralConfig};

    fn test_config() -> Config {
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        Config::new(general, vec![])
    }

    #[test]
    fn clone_catches_already_exists_error() {
        let source = GitCloneSource {
            repository: "git@example.com:repo.git".into(),
        };
        let output = vec!["fatal: destination path 'repo' already exists and is not an empty directory".to_string()];
        assert!(source.catched_error(&output));
    }

    #[tokio::test]
    async fn checkout_force_prefixes_flag() {
        let config = test_config();
        let host = Host::localhost();
        let ctx = ExecContext {
            host: &host,
            config: &config,
        };
        let source = GitCheckoutSource {
            version: "main".into(),
            force: true,
        };
        assert_eq!(source.commands(&ctx).await.unwrap(), "git checkout --force main");
    }

    #[tokio::test]
    async fn git_executor_fails_fast_on_missing_repo() {
        let config = test_config();
        let executor = GitExecutor::new("/nonexistent/does-not-exist.git", "main", false);
        let result = executor.run(Host::localhost(), &config).await;
        assert!(result.is_fail());
    }
}
