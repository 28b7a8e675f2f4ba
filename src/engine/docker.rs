//! Container engine adapter.
//!
//! Translates lifecycle intents into engine CLI invocations and parses their
//! output. All invocations are built by [`ContainerEngine::invocation`], which
//! reroutes them over `docker-machine ssh` when a remote machine is
//! configured, so callers never need to know where the engine runs.

use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

use regex::Regex;

use crate::config::{DOCKER_MACHINE, EngineConfig};
use crate::container::ContainerId;
use crate::engine::detect::binary_exists;
use crate::engine::inspect::parse_ip_address;
use crate::engine::runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
use crate::error::EngineError;

static CONTAINER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]+$").expect("container id pattern is valid")
});

/// `images --format` template producing `repository:tag` lines.
pub const IMAGE_LISTING_FORMAT: &str = "{{.Repository}}:{{.Tag}}";

/// Adapter over the engine's command-line interface.
pub struct ContainerEngine {
    config: EngineConfig,
    runner: Arc<dyn CommandRunner>,
    /// Machine engine commands are currently forwarded to, if any. Starts as
    /// the configured machine; preflight may reroute when a tool is missing.
    route: RwLock<Option<String>>,
}

impl std::fmt::Debug for ContainerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerEngine")
            .field("config", &self.config)
            .field("machine", &self.machine())
            .finish_non_exhaustive()
    }
}

impl ContainerEngine {
    /// Create an adapter that spawns real processes.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    /// Create an adapter over a custom runner.
    pub fn with_runner(config: EngineConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let route = RwLock::new(config.docker_machine.clone());
        Self {
            config,
            runner,
            route,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether engine commands are forwarded to a docker-machine VM.
    pub fn is_remote(&self) -> bool {
        self.machine().is_some()
    }

    /// Machine engine commands are forwarded to, if any.
    pub fn machine(&self) -> Option<String> {
        self.route
            .read()
            .map(|route| route.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Forward engine commands to `machine` from now on.
    pub fn route_remote(&self, machine: impl Into<String>) {
        self.set_route(Some(machine.into()));
    }

    /// Run engine commands locally from now on.
    pub fn route_local(&self) {
        self.set_route(None);
    }

    fn set_route(&self, machine: Option<String>) {
        match self.route.write() {
            Ok(mut route) => *route = machine,
            Err(poisoned) => *poisoned.into_inner() = machine,
        }
    }

    /// Build the invocation for an engine subcommand.
    pub fn invocation(&self, args: &[String], timeout: Duration) -> Invocation {
        match self.machine() {
            Some(machine) => {
                let mut forwarded = vec!["ssh".to_string(), machine];
                forwarded.push(shell_words::quote(&self.config.binary).into_owned());
                forwarded.extend(args.iter().map(|a| shell_words::quote(a).into_owned()));
                Invocation::new(DOCKER_MACHINE, forwarded, timeout)
            }
            None => Invocation::new(self.config.binary.clone(), args.iter().cloned(), timeout),
        }
    }

    async fn invoke(&self, args: Vec<String>, timeout: Duration) -> Result<CommandOutput, EngineError> {
        let invocation = self.invocation(&args, timeout);
        self.runner.run(&invocation).await
    }

    /// Invoke and turn a non-zero exit into [`EngineError::CommandFailed`]
    /// carrying stderr.
    async fn invoke_checked(&self, args: Vec<String>) -> Result<CommandOutput, EngineError> {
        let invocation = self.invocation(&args, self.config.command_timeout);
        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            return Err(EngineError::CommandFailed {
                command: invocation.command_line(),
                status: output.status(),
                output: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Check whether the engine executable is on the search path.
    pub async fn engine_present(&self) -> bool {
        binary_exists(self.runner.as_ref(), &self.config.binary).await
    }

    /// Check whether `docker-machine` is on the search path.
    pub async fn remote_tool_present(&self) -> bool {
        binary_exists(self.runner.as_ref(), DOCKER_MACHINE).await
    }

    fn machine_invocation(&self, subcommand: &str) -> Option<Invocation> {
        let machine = self.machine()?;
        Some(Invocation::new(
            DOCKER_MACHINE,
            [subcommand, machine.as_str()],
            self.config.command_timeout,
        ))
    }

    async fn run_machine(&self, subcommand: &str) -> Result<Option<CommandOutput>, EngineError> {
        let Some(invocation) = self.machine_invocation(subcommand) else {
            return Ok(None);
        };
        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            return Err(EngineError::CommandFailed {
                command: invocation.command_line(),
                status: output.status(),
                output: output.combined(),
            });
        }
        Ok(Some(output))
    }

    /// Whether the current machine reports `Running`. Always `true` for a
    /// local engine.
    pub async fn machine_running(&self) -> Result<bool, EngineError> {
        Ok(self
            .run_machine("status")
            .await?
            .is_none_or(|out| out.stdout.trim() == "Running"))
    }

    /// Start the current machine. No-op for a local engine.
    pub async fn start_machine(&self) -> Result<(), EngineError> {
        self.run_machine("start").await.map(|_| ())
    }

    /// IP address of the current machine, if any.
    pub async fn machine_ip(&self) -> Result<Option<String>, EngineError> {
        Ok(self
            .run_machine("ip")
            .await?
            .map(|out| out.stdout.trim().to_string()))
    }

    /// Check whether `name` appears in the local image listing.
    ///
    /// The listing is rendered one `repository:tag` per line so tagged names
    /// can match. This is a substring match, so `redis` also matches
    /// `redis-stack:latest`. A false positive only means the pull is skipped
    /// and the subsequent `run` pulls or fails loudly.
    pub async fn image_present(&self, name: &str) -> Result<bool, EngineError> {
        let output = self
            .invoke_checked(vec![
                "images".to_string(),
                "--no-trunc".to_string(),
                "--format".to_string(),
                IMAGE_LISTING_FORMAT.to_string(),
            ])
            .await?;
        Ok(output.stdout.contains(name))
    }

    /// Pull an image.
    pub async fn pull_image(&self, name: &str) -> Result<(), EngineError> {
        let args = vec!["pull".to_string(), name.to_string()];
        let invocation = self.invocation(&args, self.config.pull_timeout);

        tracing::info!("Pulling image: {}", name);
        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            return Err(EngineError::CommandFailed {
                command: invocation.command_line(),
                status: output.status(),
                output: output.combined(),
            });
        }
        tracing::info!("Pulled image: {}", name);
        Ok(())
    }

    /// `run` with the given arguments; returns the new container's id.
    pub async fn run_container(&self, args: &[String]) -> Result<ContainerId, EngineError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("run".to_string());
        full.extend_from_slice(args);

        let output = self.invoke_checked(full).await?;
        let id = output.stdout.trim();
        if id.is_empty() {
            return Err(EngineError::EmptyContainerId);
        }
        if !CONTAINER_ID.is_match(id) {
            return Err(EngineError::InvalidContainerId {
                output: output.stdout.trim().to_string(),
            });
        }
        Ok(ContainerId::new(id))
    }

    /// `kill` a container. An empty id is a no-op.
    pub async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        if id.is_empty() {
            return Ok(());
        }
        self.invoke_checked(vec!["kill".to_string(), id.to_string()])
            .await
            .map(|_| ())
    }

    /// `rm -v` a container. Skipped for an empty id, and when containers are
    /// kept for debugging.
    pub async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        if id.is_empty() {
            return Ok(());
        }
        if self.config.keep_containers {
            tracing::info!("Keeping container {} (debug mode)", id);
            return Ok(());
        }
        self.invoke_checked(vec!["rm".to_string(), "-v".to_string(), id.to_string()])
            .await
            .map(|_| ())
    }

    /// IP address of a container from its network settings.
    pub async fn inspect_ip_address(&self, id: &str) -> Result<String, EngineError> {
        let output = self
            .invoke_checked(vec!["inspect".to_string(), id.to_string()])
            .await?;
        parse_ip_address(id, &output.stdout)
    }

    /// Run an arbitrary engine subcommand without interpreting the exit code.
    pub async fn raw(&self, args: Vec<String>) -> Result<CommandOutput, EngineError> {
        self.invoke(args, self.config.command_timeout).await
    }
}
