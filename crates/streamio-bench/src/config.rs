//! Bench configuration file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use streamio_core::{BurstInPortConfig, InPortConfig, OutPortConfig, PortError, Result};

/// Workload sizes and port settings for one bench run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of concurrent streams.
    pub streams: usize,
    /// Bursts pushed per stream.
    pub bursts_per_stream: usize,
    /// Elements in each burst.
    pub burst_len: usize,
    /// Packets pushed per stream through the bulk port.
    pub packets_per_stream: usize,
    /// Elements in each bulk packet.
    pub packet_len: usize,
    /// Whether bulk streams ask for back-pressure.
    pub blocking: bool,
    /// Burst output port settings.
    pub out_port: OutPortConfig,
    /// Burst input port settings.
    pub burst_in: BurstInPortConfig,
    /// Bulk input port settings.
    pub bulk_in: InPortConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            streams: 4,
            bursts_per_stream: 10_000,
            burst_len: 256,
            packets_per_stream: 10_000,
            packet_len: 1024,
            blocking: true,
            out_port: OutPortConfig::default(),
            burst_in: BurstInPortConfig::default(),
            bulk_in: InPortConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PortError::Config(e.to_string()))
    }

    /// Loads a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config = match ext.to_lowercase().as_str() {
            "toml" => Self::from_toml_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the workload and every port section.
    pub fn validate(&self) -> Result<()> {
        if self.streams == 0 {
            return Err(PortError::InvalidConfig {
                reason: "streams must be at least 1".to_string(),
            });
        }
        self.out_port.validate()?;
        self.burst_in.validate()?;
        self.bulk_in.validate()
    }
}
