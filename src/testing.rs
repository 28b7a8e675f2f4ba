//! Test doubles for driving the provisioner without a container engine.
//!
//! Provides:
//! - [`ScriptedRunner`]: a [`CommandRunner`] that answers by command-line prefix
//!   and records every invocation
//! - [`FixedNames`] / [`FixedPort`]: deterministic generators
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fixturebox::config::FixtureConfig;
//! use fixturebox::engine::CommandOutput;
//! use fixturebox::provision::Provisioner;
//! use fixturebox::testing::{FixedNames, FixedPort, ScriptedRunner};
//!
//! # async fn example() {
//! let runner = Arc::new(
//!     ScriptedRunner::new().on("docker run", CommandOutput::ok("abc123\n")),
//! );
//! let provisioner = Provisioner::builder(FixtureConfig::default())
//!     .runner(runner.clone())
//!     .names(FixedNames::new("fixture"))
//!     .ports(FixedPort(40000))
//!     .build();
//! # }
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::engine::{CommandOutput, CommandRunner, Invocation};
use crate::error::EngineError;
use crate::provision::{NameGenerator, PortPicker};

/// Scripted response for invocations whose command line starts with a prefix.
enum Reply {
    Output(CommandOutput),
    /// Fail every call with a spawn error.
    SpawnError,
}

/// A [`CommandRunner`] stub that answers from a script.
///
/// Rules are matched in registration order against the rendered command line
/// (`program arg arg ...`); the first rule whose prefix matches wins. Unmatched
/// invocations succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, Reply)>,
    calls: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations starting with `prefix` with `output`.
    pub fn on(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.rules.push((prefix.to_string(), Reply::Output(output)));
        self
    }

    /// Make invocations starting with `prefix` fail to spawn, as if the
    /// executable were missing.
    pub fn missing(mut self, prefix: &str) -> Self {
        self.rules.push((prefix.to_string(), Reply::SpawnError));
        self
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of invocations so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Whether any recorded command line starts with `prefix`.
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, EngineError> {
        let line = invocation.command_line();
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }

        match self.rules.iter().find(|(prefix, _)| line.starts_with(prefix.as_str())) {
            Some((_, Reply::Output(output))) => Ok(output.clone()),
            Some((_, Reply::SpawnError)) => Err(EngineError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted missing binary"),
            }),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

/// Names `<prefix>-0`, `<prefix>-1`, ...
#[derive(Debug, Default)]
pub struct FixedNames {
    prefix: String,
    next: AtomicU32,
}

impl FixedNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU32::new(0),
        }
    }
}

impl NameGenerator for FixedNames {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

/// Always picks the same port.
#[derive(Debug, Clone, Copy)]
pub struct FixedPort(pub u16);

impl PortPicker for FixedPort {
    fn pick(&self) -> u16 {
        self.0
    }
}
