//! Host-keyed registry: the sole cross-executor communication channel.
//!
//! `registry[host_repr][name] = result` is written by any executor with
//! `register` set, and read by later executors (and by
//! [`crate::executors::template`]) to branch or interpolate on earlier
//! outcomes. Writes from distinct hosts within one executor's fan-out are
//! disjoint by construction (each worker only ever writes its own host's
//! sub-map), so the lock here only protects the rare case of two hosts'
//! first write racing to create their sub-map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::result::ExecResult;

/// Reserved host key `-e/--extra-vars` tokens are registered under.
pub const EXTRA_VARS_HOST: &str = "__extra_vars__";

#[derive(Debug, Default, Clone)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<String, HashMap<String, ExecResult>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `result` under `registry[host][name]`, creating the host's
    /// sub-map on first write. A no-op if `name` is `None` (an executor
    /// with no `register` configured never touches the registry).
    pub async fn register(&self, host: &str, name: Option<&str>, result: ExecResult) {
        let Some(name) = name else { return };
        let mut guard = self.inner.lock().await;
        guard
            .entry(host.to_string())
            .or_default()
            .insert(name.to_string(), result);
    }

    /// Looks up a previously registered result.
    pub async fn get(&self, host: &str, name: &str) -> Option<ExecResult> {
        let guard = self.inner.lock().await;
        guard.get(host).and_then(|m| m.get(name)).cloned()
    }

    /// A point-in-time snapshot, exposed to template rendering (spec §4.5:
    /// "Template rendering exposes ... the registry").
    pub async fn snapshot(&self) -> HashMap<String, HashMap<String, ExecResult>> {
        self.inner.lock().await.clone()
    }

    /// Inserts a CLI `-e KEY=VALUE` extra-var as a registered success result
    /// under the reserved [`EXTRA_VARS_HOST`] key.
    pub async fn set_extra_var(&self, key: &str, value: &str) {
        self.register(
            EXTRA_VARS_HOST,
            Some(key),
            ExecResult::success(String::new(), vec![value.to_string()], false),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Status;

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = Registry::new();
        let result = ExecResult::success("echo hi", vec!["hi".into(), String::new()], false);
        registry.register("web-1", Some("greet"), result.clone()).await;

        let fetched = registry.get("web-1", "greet").await.expect("registered");
        assert_eq!(fetched.status(), Status::Success);
        assert_eq!(fetched.stdout, result.stdout);
    }

    #[tokio::test]
    async fn unregistered_lookup_is_none() {
        let registry = Registry::new();
        assert!(registry.get("web-1", "missing").await.is_none());
    }

    #[tokio::test]
    async fn register_without_name_is_noop() {
        let registry = Registry::new();
        registry
            .register("web-1", None, ExecResult::fail("boom"))
            .await;
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn extra_vars_land_under_reserved_host() {
        let registry = Registry::new();
        registry.set_extra_var("env", "prod").await;
        let got = registry.get(EXTRA_VARS_HOST, "env").await.expect("set");
        assert_eq!(got.stdout, vec!["prod".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_hosts_write_disjoint_keys() {
        let registry = Registry::new();
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .register(&format!("host-{i}"), Some("r"), ExecResult::success("c", vec![], false))
                    .await;
            }));
        }
        for h in handles {
            h.await.expect("task");
        }
        assert_eq!(registry.snapshot().await.len(), 8);
    }
}
