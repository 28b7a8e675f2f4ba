//! Error types for fixture provisioning.

use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by statement executors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Configuration resolution errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value was present but could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Environment key.
        key: String,
        /// What was wrong with it.
        message: String,
    },
}

/// Errors from invoking the container engine or parsing its output.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The executable could not be spawned at all.
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The invocation did not finish within its timeout and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        /// Rendered command line.
        command: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The invocation exited unsuccessfully.
    #[error("`{command}` failed ({status}): {output}")]
    CommandFailed {
        /// Rendered command line.
        command: String,
        /// Exit status description.
        status: String,
        /// Diagnostic output (stderr, or combined output for `pull`).
        output: String,
    },

    /// `run` printed nothing on stdout.
    #[error("unexpected empty output from `run`")]
    EmptyContainerId,

    /// `run` printed something that is not a container identifier.
    #[error("unexpected output from `run`, not a container id: {output}")]
    InvalidContainerId {
        /// Raw stdout of the invocation.
        output: String,
    },

    /// `inspect` returned an empty array.
    #[error("no output from inspect for container {id}")]
    NoInspectOutput {
        /// Container that was inspected.
        id: String,
    },

    /// `inspect` reported no IP address for the container.
    #[error("could not find an IP address for container {id}, not running?")]
    NotRunning {
        /// Container that was inspected.
        id: String,
    },

    /// `inspect` output did not match the expected schema.
    #[error("failed to decode inspect output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from the reachability prober.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No connection could be made before the deadline.
    #[error("{addr} unreachable for {waited:?}")]
    Unreachable {
        /// Probed address.
        addr: String,
        /// Maximum wait that elapsed.
        waited: Duration,
    },

    /// The caller cancelled the probe.
    #[error("probe of {addr} cancelled")]
    Cancelled {
        /// Probed address.
        addr: String,
    },
}

/// Errors from the statement retrier.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The budget allowed no attempts.
    #[error("did not try at all")]
    NoAttempts,

    /// Every attempt failed; carries the last error.
    #[error("failed {attempts} times: {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: BoxError,
    },
}

impl RetryError {
    /// Number of attempts that were made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::NoAttempts => 0,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Errors surfaced by the lifecycle controller and the presets.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Neither the engine nor the remote tool is on the search path.
    #[error("container engine not available: neither `{engine}` nor `{remote_tool}` found on PATH")]
    EngineMissing {
        /// Engine executable that was looked up.
        engine: String,
        /// Remote tool that was looked up.
        remote_tool: String,
    },

    /// Listing local images failed.
    #[error("Failed to check for image '{image}': {source}")]
    ImageCheck {
        /// Image name.
        image: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// Pulling the image failed.
    #[error("Failed to pull image '{image}': {source}")]
    ImagePull {
        /// Image name.
        image: String,
        /// Engine failure, including its diagnostic output.
        #[source]
        source: EngineError,
    },

    /// `run` failed or returned a malformed identifier.
    #[error("Failed to launch container from '{image}': {source}")]
    Launch {
        /// Image name.
        image: String,
        /// Engine failure, including raw output.
        #[source]
        source: EngineError,
    },

    /// The container's address could not be resolved.
    #[error("Failed to resolve address of container {id}: {source}")]
    AddressLookup {
        /// Container that was rolled back.
        id: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// The container never accepted connections.
    #[error("Container {id} did not become reachable: {source}")]
    Unreachable {
        /// Container that was rolled back.
        id: String,
        /// Probe failure.
        #[source]
        source: ProbeError,
    },

    /// The post-start SQL statement never succeeded.
    #[error("Could not create database '{database}' in container {id}: {source}")]
    StatementRetryExhausted {
        /// Container that was rolled back.
        id: String,
        /// Database that was being created.
        database: String,
        /// Retry failure, including the attempt count.
        #[source]
        source: RetryError,
    },

    /// A database name is not a plain SQL identifier.
    #[error("invalid database name '{name}': expected letters, digits and underscores")]
    InvalidDatabaseName {
        /// Rejected name.
        name: String,
    },
}
