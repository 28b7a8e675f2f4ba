//! Container lifecycle controller.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              Provisioner                                   │
//! │                                                                            │
//! │   provision(spec)                                                          │
//! │         │                                                                  │
//! │         ▼                                                                  │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Preflight    │────▶│ Ensure Image │────▶│ Launch (run -d -P -p ..) │  │
//! │   │ (engine/VM)  │     │ (pull)       │     │                          │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                                                        │                   │
//! │                                                        ▼                   │
//! │                       ┌──────────────┐     ┌──────────────────────────┐   │
//! │                       │ Rollback     │◀────│ Resolve Address & Probe  │   │
//! │                       │ (kill, rm)   │ err │                          │   │
//! │                       └──────────────┘     └──────────────────────────┘   │
//! │                                                        │ ok                │
//! │                                                        ▼                   │
//! │                                            ProvisionedContainer            │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every path that creates a container and then fails tears it down before
//! the error is returned.

mod generators;
mod spec;

pub use generators::{NameGenerator, PORT_RANGE, PortPicker, RandomPorts, UuidNames};
pub use spec::ServiceSpec;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DEFAULT_MACHINE, DOCKER_MACHINE, FixtureConfig};
use crate::container::{ContainerId, ProvisionedContainer};
use crate::engine::{CommandRunner, ContainerEngine, ProcessRunner};
use crate::error::{EngineError, ProvisionError};
use crate::probe::await_reachable;

/// Launches containers and hands back reachable handles.
///
/// Holds only immutable configuration, so one instance can be shared across
/// tasks provisioning independent containers.
pub struct Provisioner {
    config: FixtureConfig,
    engine: Arc<ContainerEngine>,
    names: Arc<dyn NameGenerator>,
    ports: Arc<dyn PortPicker>,
}

/// Builder for [`Provisioner`] with injectable collaborators.
pub struct ProvisionerBuilder {
    config: FixtureConfig,
    runner: Option<Arc<dyn CommandRunner>>,
    names: Option<Arc<dyn NameGenerator>>,
    ports: Option<Arc<dyn PortPicker>>,
}

impl ProvisionerBuilder {
    /// Run engine commands through `runner` instead of spawning processes.
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn names(mut self, names: impl NameGenerator + 'static) -> Self {
        self.names = Some(Arc::new(names));
        self
    }

    pub fn ports(mut self, ports: impl PortPicker + 'static) -> Self {
        self.ports = Some(Arc::new(ports));
        self
    }

    pub fn build(self) -> Provisioner {
        let runner = self.runner.unwrap_or_else(|| Arc::new(ProcessRunner));
        let engine = ContainerEngine::with_runner(self.config.engine.clone(), runner);
        Provisioner {
            config: self.config,
            engine: Arc::new(engine),
            names: self.names.unwrap_or_else(|| Arc::new(UuidNames::default())),
            ports: self.ports.unwrap_or_else(|| Arc::new(RandomPorts)),
        }
    }
}

impl Provisioner {
    /// Provisioner with real processes, uuid names and random ports.
    pub fn new(config: FixtureConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: FixtureConfig) -> ProvisionerBuilder {
        ProvisionerBuilder {
            config,
            runner: None,
            names: None,
            ports: None,
        }
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<ContainerEngine> {
        &self.engine
    }

    /// Launch `spec` and wait until it accepts TCP connections.
    pub async fn provision(&self, spec: &ServiceSpec) -> Result<ProvisionedContainer, ProvisionError> {
        self.preflight().await?;
        self.ensure_image(&spec.image).await?;

        let name = self.names.generate();
        let host_port = self.ports.pick();
        let args = spec.run_args(&name, host_port, self.config.bind_localhost);

        let id = self
            .engine
            .run_container(&args)
            .await
            .map_err(|source| ProvisionError::Launch {
                image: spec.image.clone(),
                source,
            })?;

        tracing::info!("Started container {} ({}) from {}", name, id, spec.image);

        let probe_port = spec.probe_port.unwrap_or(host_port);
        let timeout = spec.startup_timeout.unwrap_or(self.config.startup_timeout);

        match self.await_ready(&id, probe_port, timeout).await {
            Ok(host) => {
                tracing::info!("Container {} ready at {}:{}", name, host, host_port);
                Ok(ProvisionedContainer::new(id, host, host_port, self.engine.clone()))
            }
            Err(e) => {
                self.rollback(&id).await;
                Err(e)
            }
        }
    }

    /// Launch `image` with one forwarded port, environment assignments and
    /// extra `run` options.
    pub async fn provision_image(
        &self,
        image: &str,
        container_port: u16,
        env: &[(&str, &str)],
        extra_args: &[&str],
    ) -> Result<ProvisionedContainer, ProvisionError> {
        let mut spec = ServiceSpec::new(image, container_port).args(extra_args.iter().copied());
        for (key, value) in env {
            spec = spec.env(*key, *value);
        }
        self.provision(&spec).await
    }

    /// Kill a container by id, then remove it if the kill succeeded.
    pub async fn teardown(&self, id: &ContainerId) -> Result<(), EngineError> {
        self.engine.kill_container(id.as_str()).await?;
        self.engine.remove_container(id.as_str()).await
    }

    /// Make sure the engine (or the VM hosting it) can be reached.
    ///
    /// The configured route is tried first: the docker-machine VM when one is
    /// named, the local engine otherwise. If its tool is missing the other
    /// route is used instead. Fails only when neither tool is on the path.
    async fn preflight(&self) -> Result<(), ProvisionError> {
        let binary = &self.config.engine.binary;
        let configured = self.config.engine.docker_machine.as_deref();

        match configured {
            Some(machine) => {
                if self.engine.remote_tool_present().await {
                    self.use_machine(machine).await;
                    return Ok(());
                }
                if self.engine.engine_present().await {
                    tracing::warn!(
                        "{} not found, falling back to local engine '{}'",
                        DOCKER_MACHINE,
                        binary
                    );
                    self.engine.route_local();
                    return Ok(());
                }
            }
            None => {
                if self.engine.engine_present().await {
                    self.engine.route_local();
                    return Ok(());
                }
                if self.engine.remote_tool_present().await {
                    tracing::warn!(
                        "{} not found, falling back to docker machine '{}'",
                        binary,
                        DEFAULT_MACHINE
                    );
                    self.use_machine(DEFAULT_MACHINE).await;
                    return Ok(());
                }
            }
        }

        Err(ProvisionError::EngineMissing {
            engine: binary.clone(),
            remote_tool: DOCKER_MACHINE.to_string(),
        })
    }

    /// Route engine commands to `machine`, starting it if needed.
    async fn use_machine(&self, machine: &str) {
        self.engine.route_remote(machine);

        let running = self.engine.machine_running().await.unwrap_or_else(|e| {
            tracing::debug!("Could not query machine status: {}", e);
            false
        });
        // Not fatal: later engine calls fail loudly if the VM is really down.
        if !running && let Err(e) = self.engine.start_machine().await {
            tracing::warn!("Failed to start docker machine '{}': {}", machine, e);
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), ProvisionError> {
        let present = self
            .engine
            .image_present(image)
            .await
            .map_err(|source| ProvisionError::ImageCheck {
                image: image.to_string(),
                source,
            })?;

        if present {
            tracing::debug!("Image '{}' exists locally", image);
            return Ok(());
        }

        self.engine
            .pull_image(image)
            .await
            .map_err(|source| ProvisionError::ImagePull {
                image: image.to_string(),
                source,
            })
    }

    /// Resolve the host the container is reachable on.
    async fn resolve_host(&self, id: &ContainerId) -> Result<String, EngineError> {
        if let Some(ip) = self.engine.machine_ip().await? {
            return Ok(ip);
        }
        if self.config.bind_localhost {
            return Ok("127.0.0.1".to_string());
        }
        self.engine.inspect_ip_address(id.as_str()).await
    }

    async fn await_ready(
        &self,
        id: &ContainerId,
        port: u16,
        timeout: Duration,
    ) -> Result<String, ProvisionError> {
        let host = self
            .resolve_host(id)
            .await
            .map_err(|source| ProvisionError::AddressLookup {
                id: id.to_string(),
                source,
            })?;

        let addr = format!("{host}:{port}");
        await_reachable(&addr, timeout)
            .await
            .map_err(|source| ProvisionError::Unreachable {
                id: id.to_string(),
                source,
            })?;
        Ok(host)
    }

    /// Tear down a container that failed to become ready. Failures are logged;
    /// the caller's original error takes precedence.
    pub(crate) async fn rollback(&self, id: &ContainerId) {
        tracing::info!("Rolling back container {}", id);
        if let Err(e) = self.teardown(id).await {
            tracing::warn!("Rollback of container {} failed: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::CommandOutput;
    use crate::engine::detect::lookup_tool;
    use crate::testing::{FixedNames, FixedPort, ScriptedRunner};

    const ID: &str = "9c0ffee";

    fn provisioner(runner: &Arc<ScriptedRunner>, config: FixtureConfig, port: u16) -> Provisioner {
        Provisioner::builder(config)
            .runner(runner.clone())
            .names(FixedNames::new("fx"))
            .ports(FixedPort(port))
            .build()
    }

    fn localhost_config() -> FixtureConfig {
        FixtureConfig {
            bind_localhost: true,
            startup_timeout: Duration::from_millis(400),
            ..Default::default()
        }
    }

    fn launching_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .on("docker images", CommandOutput::ok("redis  7-alpine\n"))
            .on("docker run", CommandOutput::ok(format!("{ID}\n")))
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_successful_provision() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let runner = Arc::new(launching_runner());
        let provisioner = provisioner(&runner, localhost_config(), port);

        let mut container = provisioner
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap();

        assert_eq!(container.id().as_str(), ID);
        assert_eq!(container.address(), format!("127.0.0.1:{port}"));
        assert_eq!(
            runner.calls(),
            vec![
                format!("{} docker", lookup_tool()),
                "docker images --no-trunc --format {{.Repository}}:{{.Tag}}".to_string(),
                format!("docker run --name fx-0 -d -P -p 127.0.0.1:{port}:6379 redis"),
            ]
        );

        container.kill_and_remove().await.unwrap();
        assert!(runner.called(&format!("docker rm -v {ID}")));
    }

    #[tokio::test]
    async fn test_inspected_address_is_used_without_loopback_override() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let runner = Arc::new(launching_runner().on(
            "docker inspect",
            CommandOutput::ok(r#"[{"NetworkSettings":{"IPAddress":"127.0.0.1"}}]"#),
        ));
        let config = FixtureConfig {
            startup_timeout: Duration::from_secs(2),
            ..Default::default()
        };

        let mut container = provisioner(&runner, config, port)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap();

        assert!(runner.called(&format!("docker run --name fx-0 -d -P -p {port}:6379 redis")));
        assert!(runner.called(&format!("docker inspect {ID}")));
        assert_eq!(container.host(), "127.0.0.1");
        container.kill_and_remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_container_is_rolled_back() {
        let port = closed_port().await;
        let runner = Arc::new(launching_runner());

        let err = provisioner(&runner, localhost_config(), port)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Unreachable { .. }), "{err}");
        let calls = runner.calls();
        assert_eq!(
            &calls[calls.len() - 2..],
            &[format!("docker kill {ID}"), format!("docker rm -v {ID}")]
        );
    }

    #[tokio::test]
    async fn test_probe_port_override_forces_rollback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let unreachable = closed_port().await;
        let runner = Arc::new(launching_runner());

        let spec = ServiceSpec::new("redis", 6379).probe_port(unreachable);
        let err = provisioner(&runner, localhost_config(), port)
            .provision(&spec)
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Unreachable { .. }));
        assert!(runner.called(&format!("docker rm -v {ID}")));
    }

    #[tokio::test]
    async fn test_address_lookup_failure_is_rolled_back() {
        let runner = Arc::new(
            launching_runner().on("docker inspect", CommandOutput::ok(r#"[{"NetworkSettings":{"IPAddress":""}}]"#)),
        );

        let err = provisioner(&runner, FixtureConfig::default(), 40000)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap_err();

        match err {
            ProvisionError::AddressLookup { source, .. } => {
                assert!(matches!(source, EngineError::NotRunning { .. }))
            }
            other => panic!("expected AddressLookup, got {other:?}"),
        }
        assert!(runner.called(&format!("docker kill {ID}")));
        assert!(runner.called(&format!("docker rm -v {ID}")));
    }

    #[tokio::test]
    async fn test_rollback_skips_remove_when_kill_fails() {
        let port = closed_port().await;
        let runner = Arc::new(
            launching_runner().on("docker kill", CommandOutput::failed(1, "is not running")),
        );

        let err = provisioner(&runner, localhost_config(), port)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Unreachable { .. }));
        assert!(runner.called("docker kill"));
        assert!(!runner.called("docker rm"));
    }

    #[tokio::test]
    async fn test_debug_mode_keeps_failed_container() {
        let port = closed_port().await;
        let runner = Arc::new(launching_runner());
        let config = FixtureConfig {
            engine: EngineConfig {
                keep_containers: true,
                ..Default::default()
            },
            ..localhost_config()
        };

        let _ = provisioner(&runner, config, port)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap_err();

        assert!(runner.called(&format!("docker kill {ID}")));
        assert!(!runner.called("docker rm"));
    }

    #[tokio::test]
    async fn test_missing_engine_and_remote_tool_is_fatal() {
        // Prefix matches both `docker` and `docker-machine` lookups.
        let runner = Arc::new(
            ScriptedRunner::new().on(&format!("{} docker", lookup_tool()), CommandOutput::failed(1, "")),
        );

        let err = provisioner(&runner, FixtureConfig::default(), 40000)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::EngineMissing { ref engine, ref remote_tool }
                if engine == "docker" && remote_tool == "docker-machine"
        ));
        assert_eq!(
            runner.calls(),
            vec![
                format!("{} docker", lookup_tool()),
                format!("{} docker-machine", lookup_tool()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_engine_falls_back_to_default_machine() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(
                    &format!("{} docker-machine", lookup_tool()),
                    CommandOutput::ok("/usr/local/bin/docker-machine\n"),
                )
                .on(&format!("{} docker", lookup_tool()), CommandOutput::failed(1, ""))
                .on("docker-machine status default", CommandOutput::ok("Running\n"))
                .on("docker-machine ip default", CommandOutput::ok("127.0.0.1\n"))
                .on("docker-machine ssh default docker images", CommandOutput::ok("redis:latest\n"))
                .on("docker-machine ssh default docker run", CommandOutput::ok(format!("{ID}\n"))),
        );
        let config = FixtureConfig {
            startup_timeout: Duration::from_secs(2),
            ..Default::default()
        };

        let mut container = provisioner(&runner, config, port)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap();

        assert!(runner.called(&format!(
            "docker-machine ssh default docker run --name fx-0 -d -P -p {port}:6379 redis"
        )));
        assert!(!runner.called("docker-machine start"));
        assert!(!runner.called("docker run"));
        assert_eq!(container.address(), format!("127.0.0.1:{port}"));

        container.kill_and_remove().await.unwrap();
        assert!(runner.called(&format!("docker-machine ssh default docker rm -v {ID}")));
    }

    #[tokio::test]
    async fn test_absent_image_is_pulled() {
        let port = closed_port().await;
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("docker images", CommandOutput::ok("REPOSITORY TAG\n"))
                .on("docker run", CommandOutput::ok(format!("{ID}\n"))),
        );

        let _ = provisioner(&runner, localhost_config(), port)
            .provision(&ServiceSpec::new("nats:2", 4222))
            .await;

        assert!(runner.called("docker pull nats:2"));
    }

    #[tokio::test]
    async fn test_pull_failure_aborts_before_launch() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("docker images", CommandOutput::ok(""))
                .on("docker pull", CommandOutput::failed(1, "pull access denied")),
        );

        let err = provisioner(&runner, FixtureConfig::default(), 40000)
            .provision(&ServiceSpec::new("private/thing", 80))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ImagePull { .. }));
        assert!(err.to_string().contains("private/thing"));
        assert!(!runner.called("docker run"));
    }

    #[tokio::test]
    async fn test_launch_failure_has_nothing_to_roll_back() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("docker images", CommandOutput::ok("redis\n"))
                .on("docker run", CommandOutput::ok("docker: invalid reference format.\n")),
        );

        let err = provisioner(&runner, FixtureConfig::default(), 40000)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap_err();

        match err {
            ProvisionError::Launch { source, .. } => {
                assert!(source.to_string().contains("invalid reference format"))
            }
            other => panic!("expected Launch, got {other:?}"),
        }
        assert!(!runner.called("docker kill"));
    }

    #[tokio::test]
    async fn test_remote_machine_is_started_and_used() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("docker-machine status dev", CommandOutput::ok("Stopped\n"))
                .on("docker-machine start dev", CommandOutput::failed(1, "VM not found"))
                .on("docker-machine ip dev", CommandOutput::ok("127.0.0.1\n"))
                .on("docker-machine ssh dev docker images", CommandOutput::ok("redis\n"))
                .on("docker-machine ssh dev docker run", CommandOutput::ok(format!("{ID}\n"))),
        );
        let config = FixtureConfig {
            engine: EngineConfig {
                docker_machine: Some("dev".to_string()),
                ..Default::default()
            },
            startup_timeout: Duration::from_secs(2),
            ..Default::default()
        };

        let mut container = provisioner(&runner, config, port)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap();

        assert!(runner.called(&format!("{} docker-machine", lookup_tool())));
        assert!(runner.called("docker-machine start dev"));
        assert!(!runner.called("docker inspect"));
        assert_eq!(container.address(), format!("127.0.0.1:{port}"));

        container.kill_and_remove().await.unwrap();
        assert!(runner.called(&format!("docker-machine ssh dev docker kill {ID}")));
    }

    #[tokio::test]
    async fn test_missing_remote_tool_falls_back_to_local_engine() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&format!("{} docker-machine", lookup_tool()), CommandOutput::failed(1, ""))
                .on("docker images", CommandOutput::ok("redis:latest\n"))
                .on("docker run", CommandOutput::ok(format!("{ID}\n"))),
        );
        let config = FixtureConfig {
            engine: EngineConfig {
                docker_machine: Some("dev".to_string()),
                ..Default::default()
            },
            ..localhost_config()
        };

        let mut container = provisioner(&runner, config, port)
            .provision(&ServiceSpec::new("redis", 6379))
            .await
            .unwrap();

        assert!(runner.called(&format!("{} docker", lookup_tool())));
        assert!(runner.called(&format!("docker run --name fx-0 -d -P -p 127.0.0.1:{port}:6379 redis")));
        assert!(!runner.called("docker-machine ssh"));
        assert!(!runner.called("docker-machine ip"));
        assert_eq!(container.address(), format!("127.0.0.1:{port}"));

        container.kill_and_remove().await.unwrap();
        assert!(runner.called(&format!("docker kill {ID}")));
    }

    #[tokio::test]
    async fn test_provision_image_forwards_env_and_args() {
        let port = closed_port().await;
        let runner = Arc::new(launching_runner());

        let _ = provisioner(&runner, localhost_config(), port)
            .provision_image("redis", 6379, &[("A", "1")], &["--rm"])
            .await;

        assert!(runner.called(&format!(
            "docker run --name fx-0 -d -P -p 127.0.0.1:{port}:6379 -e A=1 --rm redis"
        )));
    }
}
