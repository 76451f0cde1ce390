//! Stream metadata (SRI) describing a named data stream.
//!
//! Every packet travelling through a port belongs to a stream identified by
//! its `stream_id`. The metadata record carries sampling parameters and the
//! `blocking` flag, which selects producer back-pressure instead of lossy
//! overflow handling on input ports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Real-valued sample data.
pub const MODE_REAL: i16 = 0;
/// Complex (interleaved I/Q) sample data.
pub const MODE_COMPLEX: i16 = 1;

/// Metadata for a bulk data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSri {
    /// Header version.
    pub hversion: i32,
    /// Abscissa start value.
    pub xstart: f64,
    /// Sample interval along the abscissa.
    pub xdelta: f64,
    /// Units code for the abscissa.
    pub xunits: i16,
    /// Frame length for two-dimensional data; 0 for contiguous data.
    pub subsize: i32,
    /// Ordinate start value.
    pub ystart: f64,
    /// Frame interval along the ordinate.
    pub ydelta: f64,
    /// Units code for the ordinate.
    pub yunits: i16,
    /// Sample mode: [`MODE_REAL`] or [`MODE_COMPLEX`].
    pub mode: i16,
    /// Stream identifier.
    pub stream_id: String,
    /// Producer requests flow-controlled delivery for this stream.
    pub blocking: bool,
    /// Free-form keywords.
    pub keywords: BTreeMap<String, String>,
}

impl StreamSri {
    /// Creates a default single-element real-valued record for `stream_id`.
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            hversion: 1,
            xstart: 0.0,
            xdelta: 1.0,
            xunits: 1,
            subsize: 0,
            ystart: 0.0,
            ydelta: 0.0,
            yunits: 0,
            mode: MODE_REAL,
            stream_id: stream_id.into(),
            blocking: false,
            keywords: BTreeMap::new(),
        }
    }

    /// Sets the blocking flag.
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Sets the sample interval.
    pub fn with_xdelta(mut self, xdelta: f64) -> Self {
        self.xdelta = xdelta;
        self
    }

    /// Adds a keyword.
    pub fn with_keyword(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.keywords.insert(id.into(), value.into());
        self
    }

    /// Returns true for complex sample data.
    pub fn is_complex(&self) -> bool {
        self.mode != MODE_REAL
    }
}

impl Default for StreamSri {
    fn default() -> Self {
        Self::new("")
    }
}

/// Metadata for a burst stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstSri {
    /// Header version.
    pub hversion: i32,
    /// Stream identifier.
    pub stream_id: String,
    /// Burst identifier within the stream.
    pub id: String,
    /// Sample interval.
    pub xdelta: f64,
    /// Sample mode: [`MODE_REAL`] or [`MODE_COMPLEX`].
    pub mode: i16,
    /// Producer-defined flags.
    pub flags: i32,
    /// Time-of-arrival offset.
    pub tau: f64,
    /// Phase offset.
    pub theta: f64,
    /// Gain applied to the burst.
    pub gain: f64,
    /// Nominal burst length in elements.
    pub burst_length: u32,
    /// RF center frequency of the channel.
    pub chan_rf: f64,
    /// Free-form keywords.
    pub keywords: BTreeMap<String, String>,
}

impl BurstSri {
    /// Creates a default real-valued record for `stream_id`.
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            hversion: 1,
            stream_id: stream_id.into(),
            id: String::new(),
            xdelta: 1.0,
            mode: MODE_REAL,
            flags: 0,
            tau: 0.0,
            theta: 0.0,
            gain: 0.0,
            burst_length: 0,
            chan_rf: 0.0,
            keywords: BTreeMap::new(),
        }
    }

    /// Returns true for complex sample data.
    pub fn is_complex(&self) -> bool {
        self.mode != MODE_REAL
    }
}

impl Default for BurstSri {
    fn default() -> Self {
        Self::new("")
    }
}

/// Decides whether two metadata records are the same.
///
/// Returns `true` when the records match; a `false` result causes the stored
/// record to be replaced and the stream's changed flag to be set.
pub type SriComparator = Arc<dyn Fn(&StreamSri, &StreamSri) -> bool + Send + Sync>;

/// Structural equality over every field, keywords included.
pub fn default_compare(a: &StreamSri, b: &StreamSri) -> bool {
    a == b
}

/// Compares every field except keywords.
pub fn compare_ignoring_keywords(a: &StreamSri, b: &StreamSri) -> bool {
    a.hversion == b.hversion
        && a.xstart == b.xstart
        && a.xdelta == b.xdelta
        && a.xunits == b.xunits
        && a.subsize == b.subsize
        && a.ystart == b.ystart
        && a.ydelta == b.ydelta
        && a.yunits == b.yunits
        && a.mode == b.mode
        && a.stream_id == b.stream_id
        && a.blocking == b.blocking
}

/// Returns the default comparator as a shareable closure.
pub fn default_comparator() -> SriComparator {
    Arc::new(default_compare)
}
