//! Executable detection on the search path.
//!
//! Uses the platform's own lookup tool (`which` on Unix, `where` on Windows)
//! so detection matches what a shell would resolve.

use std::time::Duration;

use crate::engine::runner::{CommandRunner, Invocation};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Platform lookup tool.
pub fn lookup_tool() -> &'static str {
    if cfg!(windows) { "where" } else { "which" }
}

/// Invocation that resolves `program` on the search path.
pub fn lookup_invocation(program: &str) -> Invocation {
    Invocation::new(lookup_tool(), [program], LOOKUP_TIMEOUT)
}

/// Check if `program` exists on the search path.
pub async fn binary_exists(runner: &dyn CommandRunner, program: &str) -> bool {
    match runner.run(&lookup_invocation(program)).await {
        Ok(output) => output.success(),
        Err(e) => {
            tracing::debug!("Lookup of {} failed: {}", program, e);
            false
        }
    }
}
