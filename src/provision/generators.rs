//! Container name and host port generation.

use std::ops::Range;

use rand::Rng;
use uuid::Uuid;

/// Host ports handed out for forwarding.
pub const PORT_RANGE: Range<u16> = 1024..49150;

/// Produces unique container names.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Picks the external (host-side) port to forward.
pub trait PortPicker: Send + Sync {
    fn pick(&self) -> u16;
}

/// `fixturebox-<uuid>` names.
#[derive(Debug, Clone)]
pub struct UuidNames {
    prefix: String,
}

impl Default for UuidNames {
    fn default() -> Self {
        Self {
            prefix: "fixturebox".to_string(),
        }
    }
}

impl UuidNames {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl NameGenerator for UuidNames {
    fn generate(&self) -> String {
        format!("{}-{}", self.prefix, Uuid::new_v4().simple())
    }
}

/// Uniformly random port in [`PORT_RANGE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPorts;

impl PortPicker for RandomPorts {
    fn pick(&self) -> u16 {
        rand::thread_rng().gen_range(PORT_RANGE)
    }
}
