//! Packets handed from an input port to its consumer.

use streamio_core::{PrecisionTime, StreamSri};

/// One queued packet together with the stream state captured at push time.
///
/// Ownership moves to the caller of `get_packet`; the port keeps nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTransfer<P> {
    /// The pushed payload.
    pub data: P,
    /// Timestamp supplied by the producer.
    pub timestamp: PrecisionTime,
    /// End-of-stream marker.
    pub eos: bool,
    /// Stream the packet belongs to.
    pub stream_id: String,
    /// Metadata of the stream when the packet was pushed.
    pub sri: StreamSri,
    /// The stream's metadata changed since the previous packet.
    pub sri_changed: bool,
    /// Earlier packets were discarded to make room for this one.
    pub input_queue_flushed: bool,
}

impl<P> DataTransfer<P> {
    /// Creates a packet with both change flags cleared.
    pub fn new(data: P, timestamp: PrecisionTime, eos: bool, stream_id: impl Into<String>, sri: StreamSri) -> Self {
        Self {
            data,
            timestamp,
            eos,
            stream_id: stream_id.into(),
            sri,
            sri_changed: false,
            input_queue_flushed: false,
        }
    }
}
