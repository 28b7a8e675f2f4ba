//! Container engine access through its command-line interface.
//!
//! - [`runner`]: the [`CommandRunner`] seam and the tokio process runner
//! - [`detect`]: search-path lookup of the engine executables
//! - [`inspect`]: typed schema for `inspect` output
//! - [`docker`]: the [`ContainerEngine`] adapter

pub mod detect;
pub mod docker;
pub mod inspect;
pub mod runner;

pub use docker::ContainerEngine;
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
