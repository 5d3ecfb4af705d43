//! Executor model (spec §4.2 `SingleExecutor`, §4.3 `MultiExecutor`).
//!
//! An [`Executor`] is anything with a `run(host) -> ExecResult` contract.
//! [`SingleExecutor<T>`] is the base implementation shared by every
//! command-assembling executor (`CommandExecutor`, `TemplateExecutor`,
//! the git family); `T: CommandSource` supplies only what's specific to
//! that executor (how to build the command, and its error/changed
//! heuristics). Composite executors (`MultiExecutor` in spec terms) are
//! built from [`MultiExecutorBase`] plus ordinary `Executor` children —
//! composition, not an inheritance sibling, per spec §9's Design Note.

pub mod command;
pub mod git;
pub mod template;

use async_trait::async_trait;

use crate::config::Config;
use crate::host::Host;
use crate::result::{ExecResult, Status};

/// Substrings that mark a command's stdout as an error (spec §4.2 step 8).
/// Subclasses may extend this via [`CommandSource::extra_error_markers`].
pub const BASE_ERROR_MARKERS: &[&str] = &[
    "fail",
    "fatal",
    "error",
    "no such file or directory",
    "command not found",
    "invalid",
    "denied",
];

/// Per-invocation context handed to a [`CommandSource`] while it builds its
/// command string — the host it is about to run on, and read access to the
/// shared `Config` (registry, inventory) for executors like `TemplateExecutor`
/// that interpolate previously registered results.
pub struct ExecContext<'a> {
    pub host: &'a Host,
    pub config: &'a Config,
}

/// What a concrete executor type contributes to the shared
/// [`SingleExecutor`] machinery.
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// Builds the command to run, before env/sudo/chdir are applied.
    async fn commands(&self, ctx: &ExecContext<'_>) -> anyhow::Result<String>;

    /// Subclass hook: turn an apparent error into a benign outcome
    /// (spec §4.2 step 8, "catched_error"). Default: never.
    fn catched_error(&self, _output: &[String]) -> bool {
        false
    }

    /// Subclass hook: decide whether clean output counts as `CHANGED`
    /// rather than `SUCCESS`. Default: always `SUCCESS`.
    fn is_changed(&self, _output: &[String]) -> bool {
        false
    }

    /// Extra substrings this executor type adds to [`BASE_ERROR_MARKERS`]
    /// (e.g. apt's `"E: Unable to locate package"`).
    fn extra_error_markers(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Anything the sequence engine can run once per host.
#[async_trait]
pub trait Executor: Send + Sync {
    fn display_name(&self) -> String;

    /// Per-executor host override (spec §4.2 `hosts` field). `None` means
    /// "use the sequence's / config's hosts".
    fn hosts_override(&self) -> Option<&[Host]> {
        None
    }

    /// This executor's run-filter tags, so the sequence engine can gate on
    /// them once per executor instead of once per host (spec §4.4).
    fn tags(&self) -> &[String] {
        &[]
    }

    async fn run(&self, host: Host, config: &Config) -> ExecResult;
}

/// Spec §4.2 step 1: tag gating, shared by `SingleExecutor` and every
/// `MultiExecutor`-style composite.
pub fn can_run_tags(executor_tags: &[String], config: &Config) -> bool {
    if !config.tags.is_empty() {
        if executor_tags.is_empty() {
            return false;
        }
        return executor_tags.iter().any(|t| config.tags.contains(t));
    }
    if !config.skip_tags.is_empty() {
        if executor_tags.is_empty() {
            return true;
        }
        return !executor_tags.iter().any(|t| config.skip_tags.contains(t));
    }
    true
}

/// Spec §4.2 step 2: host gating. Returns `Some(skip result)` if the
/// executor should not run against `host`.
pub fn host_gate(host: &Host, executor_hosts: Option<&[Host]>, config: &Config) -> Option<ExecResult> {
    if !config.allows_host(host) {
        return Some(ExecResult::skipping(
            "Host is not in global config or passed as argument",
        ));
    }
    if let Some(hosts) = executor_hosts {
        if !hosts.iter().any(|h| h == host) {
            return Some(ExecResult::skipping("Host not in executor's host"));
        }
    }
    None
}

/// Assembles the final command string from the raw `commands()` output,
/// `env`, `sudo`, and `chdir` — spec §4.2 step 4, deterministic order:
/// env prefix (insertion order) → `sudo ` → `cd <dir> && ` (outermost).
pub fn assemble_command(raw: &str, env: &[(String, String)], sudo: bool, chdir: Option<&str>) -> String {
    let mut command = raw.to_string();
    for (key, value) in env.iter().rev() {
        command = format!("{key}=\"{value}\" {command}");
    }
    if sudo {
        command = format!("sudo {command}");
    }
    if let Some(dir) = chdir {
        command = format!("cd {dir} && {command}");
    }
    command
}

/// Spec §4.2 step 8 classification: error-in-text trumps is_changed;
/// catched_error trumps error-in-text.
pub fn classify(output: &[String], source: &dyn CommandSource) -> (bool, bool) {
    let mut markers: Vec<String> = BASE_ERROR_MARKERS.iter().map(|s| s.to_string()).collect();
    markers.extend(source.extra_error_markers().into_iter().map(str::to_string));

    let error_in_text = output.iter().any(|line| {
        let lower = line.to_lowercase();
        markers.iter().any(|marker| lower.contains(marker.as_str()))
    });

    (error_in_text, source.catched_error(output))
}

/// The shared "assemble, run, classify, register" machinery for one
/// command-executing leaf (spec §4.2). `T` supplies the command and the
/// error/changed heuristics.
pub struct SingleExecutor<T: CommandSource> {
    pub name: Option<String>,
    pub hosts: Option<Vec<Host>>,
    pub tags: Vec<String>,
    pub sudo: bool,
    pub register: Option<String>,
    /// Insertion-ordered `K=V` pairs, per spec §4.2.
    pub env: Vec<(String, String)>,
    pub chdir: Option<String>,
    pub output: bool,
    pub source: T,
}

impl<T: CommandSource> SingleExecutor<T> {
    pub fn new(source: T) -> Self {
        Self {
            name: None,
            hosts: None,
            tags: Vec::new(),
            sudo: false,
            register: None,
            env: Vec::new(),
            chdir: None,
            output: false,
            source,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_register(mut self, register: impl Into<String>) -> Self {
        self.register = Some(register.into());
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_chdir(mut self, chdir: impl Into<String>) -> Self {
        self.chdir = Some(chdir.into());
        self
    }

    pub fn with_output(mut self, output: bool) -> Self {
        self.output = output;
        self
    }

    pub fn with_hosts(mut self, hosts: Vec<Host>) -> Self {
        self.hosts = Some(hosts);
        self
    }
}

#[async_trait]
impl<T: CommandSource> Executor for SingleExecutor<T> {
    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| std::any::type_name::<T>().to_string())
    }

    fn hosts_override(&self) -> Option<&[Host]> {
        self.hosts.as_deref()
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn run(&self, host: Host, config: &Config) -> ExecResult {
        if !can_run_tags(&self.tags, config) {
            return ExecResult::skipping("Skipping based on tags");
        }
        if let Some(skip) = host_gate(&host, self.hosts.as_deref(), config) {
            return skip;
        }

        let ctx = ExecContext {
            host: &host,
            config,
        };
        let raw_command = match self.source.commands(&ctx).await {
            Ok(c) => c,
            Err(e) => {
                let result = ExecResult::fail(format!("Failed to build command: {e}"));
                config
                    .registry
                    .register(host.repr(), self.register.as_deref(), result.clone())
                    .await;
                return result;
            }
        };
        let command = assemble_command(&raw_command, &self.env, self.sudo, self.chdir.as_deref());

        let sudo_password = if self.sudo && !host.passwordless_user {
            match &config.linux_password {
                Some(p) => Some(p.clone()),
                None => {
                    let result =
                        ExecResult::fail("Pass linux password with -p or passwordless_user on hosts!");
                    config
                        .registry
                        .register(host.repr(), self.register.as_deref(), result.clone())
                        .await;
                    return result;
                }
            }
        } else {
            None
        };

        let session = match config.channels.open(&host).await {
            Ok(s) => s,
            Err(e) => {
                let result = ExecResult::fail(format!("{e}"));
                config
                    .registry
                    .register(host.repr(), self.register.as_deref(), result.clone())
                    .await;
                return result;
            }
        };

        let outcome = config
            .channels
            .run_command(session, host.repr().to_string(), command.clone(), sudo_password)
            .await;

        let result = match outcome {
            Ok(crate::session::CommandOutcome::PasswordRequired) => {
                ExecResult::fail("Pass linux password with -p or passwordless_user on hosts!")
            }
            Ok(crate::session::CommandOutcome::PasswordIncorrect) => {
                ExecResult::fail("Incorrect linux password!")
            }
            Ok(crate::session::CommandOutcome::Ran { stdout }) => {
                let (error_in_text, catched) = classify(&stdout, &self.source);
                if error_in_text && !catched {
                    ExecResult::fail_with_output(command, stdout)
                } else if self.source.is_changed(&stdout) {
                    ExecResult::changed(command, stdout, self.output)
                } else {
                    ExecResult::success(command, stdout, self.output)
                }
            }
            Err(e) => ExecResult::fail(format!("{e}")),
        };

        config
            .registry
            .register(host.repr(), self.register.as_deref(), result.clone())
            .await;

        result
    }
}

/// Attributes a [`MultiExecutor`]-style composite propagates to each
/// child it constructs, per spec §4.3 `get_base_attributes`.
#[derive(Debug, Clone, Default)]
pub struct BaseAttributes {
    pub tags: Vec<String>,
    pub sudo: bool,
    pub register: Option<String>,
    pub env: Vec<(String, String)>,
    pub chdir: Option<String>,
}

/// Shared plumbing for composite executors: base attributes, child
/// execution with short-circuit on failure, and result reduction
/// (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct MultiExecutorBase {
    pub name: Option<String>,
    pub hosts: Option<Vec<Host>>,
    pub tags: Vec<String>,
    pub sudo: bool,
    pub register: Option<String>,
    pub env: Vec<(String, String)>,
    pub chdir: Option<String>,
}

impl MultiExecutorBase {
    pub fn base_attributes(&self) -> BaseAttributes {
        BaseAttributes {
            tags: self.tags.clone(),
            sudo: self.sudo,
            register: self.register.clone(),
            env: self.env.clone(),
            chdir: self.chdir.clone(),
        }
    }

    /// Runs `child` against `host`, appending its result to `results`.
    /// Returns `Some(result)` if `child` failed — the caller must
    /// short-circuit and surface that result as the composite's own,
    /// per spec §4.3 ("a failing child ... the composite catches it to
    /// return ... a FAIL with the child's message").
    pub async fn execute_executor(
        &self,
        child: &dyn Executor,
        host: &Host,
        config: &Config,
        results: &mut Vec<ExecResult>,
    ) -> Option<ExecResult> {
        let result = child.run(host.clone(), config).await;
        if config.verbose >= 2 {
            tracing::info!(child = %child.display_name(), status = %result.status(), "child executor finished");
        }
        let failed = result.is_fail();
        results.push(result.clone());
        if failed {
            Some(result)
        } else {
            None
        }
    }

    /// Reduces collected child results into one composite `Result`
    /// (spec §4.3 `result_from_executor`): `CHANGED` if any child
    /// changed, else `SUCCESS`. Never called when a child failed — that
    /// path short-circuits via [`Self::execute_executor`].
    pub fn result_from_executor(&self, results: &[ExecResult], message: impl Into<String>) -> ExecResult {
        if results.iter().any(|r| r.status() == Status::Changed) {
            ExecResult::composite_changed(message)
        } else {
            ExecResult::composite_success(message)
        }
    }
}
