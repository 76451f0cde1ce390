#![warn(missing_docs)]

//! streamio core: stream metadata, timestamps, statistics, the deadline
//! executor and port configuration shared by the bulk and burst port crates.

pub mod config;
pub mod error;
pub mod executor;
pub mod semaphore;
pub mod sri;
pub mod stats;
pub mod telemetry;
pub mod time;

pub use config::{
    BurstInPortConfig, ConnectionFilter, InPortConfig, OutPortConfig, RoutingMode, DEFAULT_BYTE_THRESHOLD,
    DEFAULT_LATENCY_THRESHOLD_US, DEFAULT_MAX_BURSTS, DEFAULT_MAX_QUEUE_DEPTH, DEFAULT_QUEUE_THRESHOLD,
};
pub use error::{PortError, Result};
pub use executor::ExecutorService;
pub use semaphore::QueueSemaphore;
pub use sri::{BurstSri, SriComparator, StreamSri, MODE_COMPLEX, MODE_REAL};
pub use stats::{BurstStatistics, LinkStatistics, PortStatistics, PortUsage};
pub use time::PrecisionTime;

/// Timeout value for a non-blocking poll.
pub const NON_BLOCKING: f64 = 0.0;
/// Timeout value for an indefinite wait.
pub const BLOCKING: f64 = -1.0;
