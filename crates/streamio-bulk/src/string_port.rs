//! String and blob input ports.
//!
//! File ports carry URLs and count payload bytes. XML ports carry whole
//! documents and count every payload as a single element, so their element
//! rate is a document rate.

use bytes::Bytes;
use streamio_core::sri::default_comparator;
use streamio_core::{InPortConfig, PrecisionTime};

use crate::in_port::InPort;
use crate::payload::SizeAccounting;

/// Input port carrying string payloads.
pub type InStringPort = InPort<String>;

/// Input port carrying opaque byte payloads.
pub type InBlobPort = InPort<Bytes>;

impl InPort<String> {
    /// Creates a file port: payloads are URLs measured in bytes.
    pub fn file(name: impl Into<String>, config: InPortConfig) -> Self {
        Self::build(name.into(), config, default_comparator(), SizeAccounting::PayloadLength)
    }

    /// Creates an XML port: every payload counts as one element.
    pub fn xml(name: impl Into<String>, config: InPortConfig) -> Self {
        Self::build(name.into(), config, default_comparator(), SizeAccounting::Unit)
    }

    /// Queues a payload that carries no timestamp of its own.
    pub fn push_untimed(&self, data: impl Into<String>, eos: bool, stream_id: &str) {
        self.push_packet(data.into(), PrecisionTime::not_set(), eos, stream_id);
    }
}
