//! Port configuration

use serde::{Deserialize, Serialize};

use crate::error::{PortError, Result};

/// Default maximum depth of a bulk input queue, in packets.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 100;
/// Default burst input queue threshold, in bursts.
pub const DEFAULT_QUEUE_THRESHOLD: usize = 100;
/// Default number of bursts batched before an output flush.
pub const DEFAULT_MAX_BURSTS: usize = 100;
/// Default maximum message size of the downstream transport, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 2 * 1024 * 1024;
/// Default output byte threshold: 90% of the maximum message size.
pub const DEFAULT_BYTE_THRESHOLD: usize = DEFAULT_MAX_MESSAGE_BYTES / 10 * 9;
/// Default output latency threshold in microseconds (10 ms).
pub const DEFAULT_LATENCY_THRESHOLD_US: u64 = 10_000;

/// Which downstream connections receive which streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// One shared buffer for every stream, delivered to every connection.
    #[default]
    AllInterleaved,
    /// Per-stream buffers, delivered to every connection.
    AllStreams,
    /// Per-stream buffers, delivered only to subscribed connections.
    ConnectionStreams,
}

impl RoutingMode {
    /// Returns true when every stream shares the default queue.
    pub fn is_interleaved(self) -> bool {
        self == RoutingMode::AllInterleaved
    }
}

/// Subscribes one connection to one stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionFilter {
    /// Port the route applies to; empty matches any port.
    #[serde(default)]
    pub port_name: String,
    /// Stream being routed.
    pub stream_id: String,
    /// Connection receiving the stream.
    pub connection_id: String,
}

impl ConnectionFilter {
    /// Creates a filter that applies to any port.
    pub fn new(stream_id: &str, connection_id: &str) -> Self {
        Self {
            port_name: String::new(),
            stream_id: stream_id.to_string(),
            connection_id: connection_id.to_string(),
        }
    }

    /// Returns true when the filter applies to `port_name`.
    pub fn applies_to(&self, port_name: &str) -> bool {
        self.port_name.is_empty() || self.port_name == port_name
    }
}

/// Configuration for single-packet input ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InPortConfig {
    /// Maximum queued packets; 0 drops all incoming data.
    pub max_queue_depth: usize,
    /// Whether statistics are recorded.
    pub enable_stats: bool,
}

impl Default for InPortConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            enable_stats: true,
        }
    }
}

impl InPortConfig {
    /// Every depth, including 0, is valid.
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Configuration for burst input ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstInPortConfig {
    /// Queued bursts at which producers block.
    pub queue_threshold: usize,
}

impl Default for BurstInPortConfig {
    fn default() -> Self {
        Self {
            queue_threshold: DEFAULT_QUEUE_THRESHOLD,
        }
    }
}

impl BurstInPortConfig {
    /// Rejects a zero threshold.
    pub fn validate(&self) -> Result<()> {
        if self.queue_threshold == 0 {
            return Err(PortError::InvalidQueueThreshold { requested: 0 });
        }
        Ok(())
    }
}

/// Configuration for burst output ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutPortConfig {
    /// Bursts queued before a flush.
    pub max_bursts: usize,
    /// Bytes queued before a flush.
    pub byte_threshold: usize,
    /// Maximum time a burst may wait in the queue, in microseconds.
    pub latency_threshold_us: u64,
    /// Stream routing mode.
    pub routing_mode: RoutingMode,
    /// Initial stream-to-connection routes.
    pub routes: Vec<ConnectionFilter>,
}

impl Default for OutPortConfig {
    fn default() -> Self {
        Self {
            max_bursts: DEFAULT_MAX_BURSTS,
            byte_threshold: DEFAULT_BYTE_THRESHOLD,
            latency_threshold_us: DEFAULT_LATENCY_THRESHOLD_US,
            routing_mode: RoutingMode::AllInterleaved,
            routes: Vec::new(),
        }
    }
}

impl OutPortConfig {
    /// Rejects thresholds that would flush on every push without batching
    /// anything, and routes with empty identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.max_bursts == 0 {
            return Err(PortError::InvalidConfig {
                reason: "max_bursts must be at least 1".to_string(),
            });
        }
        if self.byte_threshold == 0 {
            return Err(PortError::InvalidConfig {
                reason: "byte_threshold must be at least 1".to_string(),
            });
        }
        if let Some(route) = self
            .routes
            .iter()
            .find(|r| r.stream_id.is_empty() || r.connection_id.is_empty())
        {
            return Err(PortError::InvalidConfig {
                reason: format!(
                    "route '{}' -> '{}' has an empty identifier",
                    route.stream_id, route.connection_id
                ),
            });
        }
        Ok(())
    }
}
