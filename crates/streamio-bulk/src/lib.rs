#![warn(missing_docs)]

//! streamio bulk ports: single-packet input ports with per-stream
//! back-pressure or overflow-by-flush, and their string/blob variants.

pub mod in_port;
pub mod packet;
pub mod payload;
pub mod queue;
pub mod registry;
pub mod string_port;

pub use in_port::InPort;
pub use packet::DataTransfer;
pub use payload::{PayloadLength, SizeAccounting};
pub use queue::{PacketQueue, PurgeSummary};
pub use registry::{NewStreamListener, PacketSri, SriUpdate, StreamRegistry};
pub use string_port::{InBlobPort, InStringPort};

/// Input port carrying 32-bit float samples.
pub type InFloatPort = InPort<Vec<f32>>;
/// Input port carrying 64-bit float samples.
pub type InDoublePort = InPort<Vec<f64>>;
/// Input port carrying 16-bit integer samples.
pub type InShortPort = InPort<Vec<i16>>;
/// Input port carrying 8-bit unsigned samples.
pub type InOctetPort = InPort<Vec<u8>>;
