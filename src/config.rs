use serde::Deserialize;

use crate::state::SwingAxis;

/// Platform-level configuration supplied by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Which swing axis the single SwingMode control drives. Default: both.
    #[serde(default)]
    pub oscillate_direction: SwingAxis,
    /// Statically configured devices, used without discovery.
    #[serde(default)]
    pub devices: Vec<StaticDevice>,
}

/// Single-device configuration for hosts without a discovery source.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticDevice {
    pub host: String,
    pub port: u16,
    pub name: String,
}
