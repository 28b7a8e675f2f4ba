//! Schema for the subset of `inspect` output that is consumed.

use serde::Deserialize;

use crate::error::EngineError;

/// One element of the JSON array printed by `inspect`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectedContainer {
    pub network_settings: NetworkSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
}

/// Extract the IP address of the first inspected container.
pub fn parse_ip_address(id: &str, raw: &str) -> Result<String, EngineError> {
    let containers: Vec<InspectedContainer> = serde_json::from_str(raw)?;
    let first = containers.first().ok_or_else(|| EngineError::NoInspectOutput {
        id: id.to_string(),
    })?;

    let ip = first.network_settings.ip_address.trim();
    if ip.is_empty() {
        return Err(EngineError::NotRunning { id: id.to_string() });
    }
    Ok(ip.to_string())
}
