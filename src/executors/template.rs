//! Template rendering executor (spec §4.5).
//!
//! Reads a source file, substitutes a small set of `{{ ... }}`
//! placeholders against `host` and the registry, then ships the rendered
//! text to the remote host as `printf '<escaped>' | [sudo] tee <dest>` —
//! no file transfer, no remote template engine.

use std::path::PathBuf;

use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{CommandSource, ExecContext};
use crate::registry::EXTRA_VARS_HOST;

static STDOUT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*registry\["([^"]+)"\]\["([^"]+)"\]\.stdout\[(\d+)\]\s*\}\}"#).unwrap()
});
static STATUS_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*registry\["([^"]+)"\]\["([^"]+)"\]\.status\s*\}\}"#).unwrap()
});
static HOST_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*host\.(url|name)\s*\}\}").unwrap());
static EXTRA_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\{\{\s*extra_vars\["([^"]+)"\]\s*\}\}"#).unwrap());

/// Renders `body` against `ctx`'s host and registry snapshot. Any
/// `{{ registry[...] }}` reference to an entry that was never
/// registered, or any malformed placeholder, is an error — a template
/// that silently renders blanks is worse than one that fails loudly.
pub async fn render(body: &str, ctx: &ExecContext<'_>) -> anyhow::Result<String> {
    let snapshot = ctx.config.registry.snapshot().await;
    let mut rendered = body.to_string();

    rendered = replace_fallibly(&rendered, &STDOUT_REF, |caps| {
        let (host, name, idx) = (&caps[1], &caps[2], &caps[3]);
        let idx: usize = idx.parse().context("stdout index is not a number")?;
        let result = snapshot
            .get(host)
            .and_then(|m| m.get(name))
            .ok_or_else(|| anyhow!("no registered result {name:?} on host {host:?}"))?;
        result
            .stdout
            .get(idx)
            .cloned()
            .ok_or_else(|| anyhow!("stdout[{idx}] out of range for {name:?} on host {host:?}"))
    })?;

    rendered = replace_fallibly(&rendered, &STATUS_REF, |caps| {
        let (host, name) = (&caps[1], &caps[2]);
        let result = snapshot
            .get(host)
            .and_then(|m| m.get(name))
            .ok_or_else(|| anyhow!("no registered result {name:?} on host {host:?}"))?;
        Ok(result.status().to_string())
    })?;

    rendered = replace_fallibly(&rendered, &HOST_FIELD, |caps| match &caps[1] {
        "url" => Ok(ctx.host.url.clone()),
        "name" => Ok(ctx.host.repr().to_string()),
        other => Err(anyhow!("unknown host field {other:?}")),
    })?;

    rendered = replace_fallibly(&rendered, &EXTRA_VAR, |caps| {
        let key = &caps[1];
        let result = snapshot
            .get(EXTRA_VARS_HOST)
            .and_then(|m| m.get(key))
            .ok_or_else(|| anyhow!("no extra-var {key:?} was passed"))?;
        result
            .stdout
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("extra-var {key:?} had no value"))
    })?;

    if rendered.contains("{{") {
        return Err(anyhow!("unresolved template placeholder in rendered body"));
    }

    Ok(rendered)
}

fn replace_fallibly(
    text: &str,
    pattern: &Regex,
    mut resolve: impl FnMut(&regex::Captures) -> anyhow::Result<String>,
) -> anyhow::Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    for caps in pattern.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        out.push_str(&text[last_end..whole.start()]);
        out.push_str(&resolve(&caps)?);
        last_end = whole.end();
    }
    out.push_str(&text[last_end..]);
    Ok(out)
}

/// Encodes rendered text into a single-quoted `printf` argument.
/// Embedded newlines become the two-character escape `\n`; embedded
/// single quotes are closed, escaped, and reopened per POSIX shell rules.
pub fn escape_for_printf(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' => escaped.push_str("\\n"),
            '\'' => escaped.push_str("'\\''"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Reads `src`, renders it, and builds the `printf | [sudo] tee dest`
/// command. `sudo` is handled here rather than via
/// [`crate::executors::SingleExecutor::sudo`] because it must apply only
/// to `tee`, not to `printf` on the left of the pipe.
#[derive(Debug, Clone)]
pub struct TemplateExecutorSource {
    pub src: PathBuf,
    pub dest: String,
    pub sudo: bool,
}

impl TemplateExecutorSource {
    pub fn new(src: impl Into<PathBuf>, dest: impl Into<String>, sudo: bool) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            sudo,
        }
    }
}

#[async_trait]
impl CommandSource for TemplateExecutorSource {
    async fn commands(&self, ctx: &ExecContext<'_>) -> anyhow::Result<String> {
        let body = std::fs::read_to_string(&self.src)
            .with_context(|| format!("failed to read template source {:?}", self.src))?;
        let rendered = render(&body, ctx).await?;
        let escaped = escape_for_printf(&rendered);
        let tee = if self.sudo { "sudo tee" } else { "tee" };
        Ok(format!("printf '{escaped}' | {tee} {}", self.dest))
    }
}

pub type TemplateExecutor = super::SingleExecutor<TemplateExecutorSource>;

impl TemplateExecutor {
    /// `sudo` here governs `tee`'s privileges, not the overall command —
    /// the wrapping `SingleExecutor.sudo` flag stays `false`.
    pub fn template(src: impl Into<PathBuf>, dest: impl Into<String>, sudo: bool) -> Self {
        Self::new(TemplateExecutorSource::new(src, dest, sudo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GeneralConfig};
    use crate::executors::Executor;
    use crate::host::Host;
    use crate::result::{ExecResult, Status};
    use std::io::Write;

    #[test]
    fn escapes_newlines_and_single_quotes() {
        assert_eq!(escape_for_printf("a\nb"), "a\\nb");
        assert_eq!(escape_for_printf("it's"), "it'\\''s");
    }

    #[tokio::test]
    async fn renders_stdout_reference_from_registry() {
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        let config = Config::new(general, vec![]);
        config
            .registry
            .register("localhost", Some("greet"), ExecResult::success("echo hi", vec!["hi".into()], false))
            .await;

        let host = Host::localhost();
        let ctx = ExecContext {
            host: &host,
            config: &config,
        };
        let rendered = render(r#"{{ registry["localhost"]["greet"].stdout[0] }}"#, &ctx)
            .await
            .expect("renders");
        assert_eq!(rendered, "hi");
    }

    #[tokio::test]
    async fn unregistered_reference_is_an_error() {
        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        let config = Config::new(general, vec![]);
        let host = Host::localhost();
        let ctx = ExecContext {
            host: &host,
            config: &config,
        };
        let err = render(r#"{{ registry["localhost"]["missing"].stdout[0] }}"#, &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn assembles_printf_tee_pipeline() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        write!(file, "hi").expect("write");

        let general = GeneralConfig::new(vec![Host::new("10.0.0.1", "deploy")]).expect("ok");
        let config = Config::new(general, vec![]);
        let host = Host::localhost();

        let executor = TemplateExecutor::template(file.path(), "/tmp/out", false);
        let result = executor.run(host, &config).await;
        assert_eq!(result.status(), Status::Success);
        assert_eq!(result.stdin, "printf 'hi' | tee /tmp/out");
    }
}
