//! Process-wide configuration for fixture provisioning.
//!
//! Resolved once (from the environment, or from any key lookup in tests) and
//! handed to the [`Provisioner`](crate::provision::Provisioner) at
//! construction. Nothing here is mutated while containers are provisioned.

mod helpers;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;
use helpers::{optional_var, parse_bool, parse_optional};

/// Default engine executable.
pub const DEFAULT_ENGINE: &str = "docker";

/// Tool used to reach a VM-hosted engine.
pub const DOCKER_MACHINE: &str = "docker-machine";

/// Machine used when the local engine is missing and none is configured.
pub const DEFAULT_MACHINE: &str = "default";

/// Container engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine executable (default: `docker`).
    pub binary: String,
    /// Name of a docker-machine VM to run engine commands on, if any.
    pub docker_machine: Option<String>,
    /// Skip `rm` on teardown so failed containers can be inspected (debug mode).
    pub keep_containers: bool,
    /// Timeout for every engine invocation other than `pull`.
    pub command_timeout: Duration,
    /// Timeout for `pull`.
    pub pull_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_ENGINE.to_string(),
            docker_machine: None,
            keep_containers: false,
            command_timeout: Duration::from_secs(120),
            pull_timeout: Duration::from_secs(900),
        }
    }
}

/// Username and password for a SQL-speaking preset.
#[derive(Debug, Clone)]
pub struct SqlCredentials {
    pub username: String,
    pub password: SecretString,
}

impl SqlCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Get the password (exposes the secret).
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub engine: EngineConfig,
    /// Bind forwarded ports to 127.0.0.1 and resolve container addresses there.
    pub bind_localhost: bool,
    /// How long to wait for a new container to accept TCP connections.
    pub startup_timeout: Duration,
    pub mysql: SqlCredentials,
    pub postgres: SqlCredentials,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            bind_localhost: false,
            startup_timeout: Duration::from_secs(60),
            mysql: SqlCredentials::new("root", "root"),
            postgres: SqlCredentials::new("postgres", "docker"),
        }
    }
}

impl FixtureConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup. Unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let engine_defaults = defaults.engine;

        let engine = EngineConfig {
            binary: optional_var(&lookup, "FIXTUREBOX_ENGINE").unwrap_or(engine_defaults.binary),
            docker_machine: optional_var(&lookup, "FIXTUREBOX_DOCKER_MACHINE"),
            keep_containers: parse_bool(&lookup, "FIXTUREBOX_DEBUG", engine_defaults.keep_containers)?,
            command_timeout: Duration::from_secs(parse_optional(
                &lookup,
                "FIXTUREBOX_COMMAND_TIMEOUT_SECS",
                engine_defaults.command_timeout.as_secs(),
            )?),
            pull_timeout: Duration::from_secs(parse_optional(
                &lookup,
                "FIXTUREBOX_PULL_TIMEOUT_SECS",
                engine_defaults.pull_timeout.as_secs(),
            )?),
        };

        let mysql = SqlCredentials::new(
            optional_var(&lookup, "FIXTUREBOX_MYSQL_USER").unwrap_or_else(|| defaults.mysql.username.clone()),
            optional_var(&lookup, "FIXTUREBOX_MYSQL_PASSWORD")
                .unwrap_or_else(|| defaults.mysql.password().to_string()),
        );
        let postgres = SqlCredentials::new(
            optional_var(&lookup, "FIXTUREBOX_POSTGRES_USER").unwrap_or_else(|| defaults.postgres.username.clone()),
            optional_var(&lookup, "FIXTUREBOX_POSTGRES_PASSWORD")
                .unwrap_or_else(|| defaults.postgres.password().to_string()),
        );

        Ok(Self {
            engine,
            bind_localhost: parse_bool(&lookup, "FIXTUREBOX_BIND_LOCALHOST", defaults.bind_localhost)?,
            startup_timeout: Duration::from_secs(parse_optional(
                &lookup,
                "FIXTUREBOX_STARTUP_TIMEOUT_SECS",
                defaults.startup_timeout.as_secs(),
            )?),
            mysql,
            postgres,
        })
    }
}
