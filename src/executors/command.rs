//! Plain shell command executor — the simplest [`CommandSource`].

use async_trait::async_trait;

use super::{CommandSource, ExecContext};

/// Runs a fixed shell command, unchanged across hosts.
#[derive(Debug, Clone)]
pub struct CommandExecutorSource {
    pub command: String,
}

impl CommandExecutorSource {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl CommandSource for CommandExecutorSource {
    async fn commands(&self, _ctx: &ExecContext<'_>) -> anyhow::Result<String> {
        Ok(self.command.clone())
    }
}

pub type CommandExecutor = super::SingleExecutor<CommandExecutorSource>;

impl CommandExecutor {
    pub fn command(command: impl Into<String>) -> Self {
        Self::new(CommandExecutorSource::new(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GeneralConfig};
    use crate::executors::Executor;
    use crate::host::Host;
    use crate::result::Status;

    #[tokio::test]
    async fn runs_fixed_command_on_localhost() {
        let host = Host::localhost();
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        let config = Config::new(general, vec![]);

        let executor = CommandExecutor::command("echo hello");
        let result = executor.run(host, &config).await;

        assert_eq!(result.status(), Status::Success);
        assert_eq!(result.stdout[0], "hello");
    }

    #[tokio::test]
    async fn skips_when_tags_do_not_match() {
        let host = Host::localhost();
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        let config = Config::new(general, vec![]).with_tags(vec!["db".into()]);

        let executor = CommandExecutor::command("echo hi").with_tags(vec!["web".into()]);
        let result = executor.run(host, &config).await;

        assert_eq!(result.status(), Status::Skipping);
    }

    #[tokio::test]
    async fn sudo_without_password_or_passwordless_user_fails() {
        let host = Host::new("10.0.0.1", "deploy");
        let general = GeneralConfig::new(vec![host.clone()]).expect("ok");
        let config = Config::new(general, vec![host.clone()]);

        let executor = CommandExecutor::command("whoami").with_sudo(true);
        let result = executor.run(host, &config).await;

        assert_eq!(result.status(), Status::Fail);
        assert!(result.message.contains("Pass linux password"));
    }
}
