#![warn(missing_docs)]

//! streamio burst ports: a batched burst input queue and an output port that
//! buffers bursts under count, byte and latency thresholds before fanning
//! them out to its connections.

pub mod burst;
pub mod connection;
pub mod error;
pub mod in_port;
pub mod out_port;
pub mod policy;
pub mod routing;
pub mod transport;

pub use burst::{Burst, BurstPacket};
pub use connection::{ConnectionInfo, ConnectionStatistics};
pub use error::TransportError;
pub use in_port::BurstInPort;
pub use out_port::BurstOutPort;
pub use policy::{OutputQueue, PolicySettings};
pub use routing::RouteTable;
pub use transport::{BurstTransport, LocalTransport};

/// Burst input port carrying 32-bit float samples.
pub type BurstFloatInPort = BurstInPort<f32>;
/// Burst input port carrying 64-bit float samples.
pub type BurstDoubleInPort = BurstInPort<f64>;
/// Burst input port carrying 16-bit integer samples.
pub type BurstShortInPort = BurstInPort<i16>;
/// Burst input port carrying 8-bit unsigned samples.
pub type BurstOctetInPort = BurstInPort<u8>;

/// Burst output port carrying 32-bit float samples.
pub type BurstFloatOutPort = BurstOutPort<f32>;
/// Burst output port carrying 64-bit float samples.
pub type BurstDoubleOutPort = BurstOutPort<f64>;
/// Burst output port carrying 16-bit integer samples.
pub type BurstShortOutPort = BurstOutPort<i16>;
/// Burst output port carrying 8-bit unsigned samples.
pub type BurstOctetOutPort = BurstOutPort<u8>;
