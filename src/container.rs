//! Container handles returned to callers.

use std::sync::Arc;

use serde::Serialize;

use crate::engine::ContainerEngine;
use crate::error::EngineError;

/// Opaque identifier the engine printed for a launched container.
///
/// A non-empty id means the container was created; it says nothing about
/// whether it is ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A running, reachable container owned by the caller.
///
/// The caller is responsible for calling [`kill_and_remove`](Self::kill_and_remove).
/// Dropping a live handle only logs a warning; it does not stop the container.
#[derive(Debug)]
pub struct ProvisionedContainer {
    id: ContainerId,
    host: String,
    port: u16,
    engine: Arc<ContainerEngine>,
    /// `kill` already succeeded; only `rm` is left.
    killed: bool,
}

/// Serializable view of a [`ProvisionedContainer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub host: String,
    pub port: u16,
    pub address: String,
}

impl ProvisionedContainer {
    pub(crate) fn new(id: ContainerId, host: String, port: u16, engine: Arc<ContainerEngine>) -> Self {
        Self {
            id,
            host,
            port,
            engine,
            killed: false,
        }
    }

    /// Container id; empty once torn down.
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Host the service is reachable on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// External (host-side) port the service is reachable on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            address: self.address(),
        }
    }

    /// Kill the container, then remove it if the kill succeeded.
    ///
    /// Idempotent: once both steps have gone through the handle is emptied
    /// and later calls do nothing. On failure the handle stays populated so
    /// the caller can retry; a retry after a failed `rm` only removes.
    pub async fn kill_and_remove(&mut self) -> Result<(), EngineError> {
        if self.id.is_empty() {
            return Ok(());
        }

        if !self.killed {
            self.engine.kill_container(self.id.as_str()).await?;
            self.killed = true;
        }
        self.engine.remove_container(self.id.as_str()).await?;

        let id = std::mem::take(&mut self.id);
        tracing::info!("Tore down container {}", id);
        Ok(())
    }

    /// Give up ownership without tearing down. The container keeps running.
    pub fn into_id(mut self) -> ContainerId {
        std::mem::take(&mut self.id)
    }
}

impl Drop for ProvisionedContainer {
    fn drop(&mut self) {
        if !self.id.is_empty() {
            tracing::warn!(
                "Container {} ({}) dropped without kill_and_remove(), it may remain running",
                self.id,
                self.address()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::CommandOutput;
    use crate::testing::ScriptedRunner;

    fn handle(runner: &Arc<ScriptedRunner>, id: &str) -> ProvisionedContainer {
        let engine = Arc::new(ContainerEngine::with_runner(
            EngineConfig::default(),
            runner.clone(),
        ));
        ProvisionedContainer::new(ContainerId::new(id), "127.0.0.1".to_string(), 4321, engine)
    }

    #[test]
    fn test_address_and_summary() {
        let runner = Arc::new(ScriptedRunner::new());
        let container = handle(&runner, "abc123");

        assert_eq!(container.address(), "127.0.0.1:4321");
        let json = serde_json::to_value(container.summary()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "abc123",
                "host": "127.0.0.1",
                "port": 4321,
                "address": "127.0.0.1:4321"
            })
        );
        let _ = container.into_id();
    }

    #[tokio::test]
    async fn test_kill_and_remove_twice() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut container = handle(&runner, "abc123");

        container.kill_and_remove().await.unwrap();
        container.kill_and_remove().await.unwrap();

        assert!(container.id().is_empty());
        assert_eq!(runner.calls(), vec!["docker kill abc123", "docker rm -v abc123"]);
    }

    #[tokio::test]
    async fn test_empty_handle_is_noop() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut container = handle(&runner, "");

        container.kill_and_remove().await.unwrap();
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_kill_keeps_handle_and_skips_remove() {
        let runner = Arc::new(
            ScriptedRunner::new().on("docker kill", CommandOutput::failed(1, "No such container")),
        );
        let mut container = handle(&runner, "abc123");

        assert!(container.kill_and_remove().await.is_err());
        assert_eq!(container.id().as_str(), "abc123");
        assert_eq!(runner.calls(), vec!["docker kill abc123"]);
        let _ = container.into_id();
    }

    #[test]
    fn test_teardown_from_blocking_context() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut container = handle(&runner, "abc123");

        tokio_test::block_on(container.kill_and_remove()).unwrap();
        assert!(container.id().is_empty());
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_handle_for_retry() {
        let runner = Arc::new(
            ScriptedRunner::new().on("docker rm", CommandOutput::failed(1, "removal already in progress")),
        );
        let mut container = handle(&runner, "abc123");

        assert!(container.kill_and_remove().await.is_err());
        assert_eq!(container.id().as_str(), "abc123");
        assert_eq!(runner.calls(), vec!["docker kill abc123", "docker rm -v abc123"]);

        // Stopped container: a retry only removes.
        assert!(container.kill_and_remove().await.is_err());
        assert_eq!(
            runner.calls(),
            vec!["docker kill abc123", "docker rm -v abc123", "docker rm -v abc123"]
        );
        let _ = container.into_id();
    }
}
