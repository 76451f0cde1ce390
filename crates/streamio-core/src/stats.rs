//! Port statistics collection.
//!
//! Both collectors keep a short history window of recent calls and derive
//! rates from it on demand. They are plain structs; the owning port guards
//! them with whichever lock already protects its queue.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

/// Number of recent calls retained for rate calculations.
pub const HISTORY_WINDOW: usize = 10;

/// Coarse occupancy state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortUsage {
    /// Nothing queued (input) or nothing connected (output).
    Idle,
    /// Data is flowing.
    Active,
    /// Queue is at capacity.
    Busy,
}

/// Snapshot of a port's recent activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortStatistics {
    /// Name of the port the snapshot was taken from.
    pub port_name: String,
    /// Elements transferred per second over the history window.
    pub elements_per_second: f64,
    /// Bits transferred per second over the history window.
    pub bits_per_second: f64,
    /// Calls per second over the history window.
    pub calls_per_second: f64,
    /// Streams currently active on the port.
    pub stream_ids: Vec<String>,
    /// Mean queue-depth ratio over the history window.
    pub average_queue_depth: f64,
    /// Seconds since the most recent call.
    pub time_since_last_call: f64,
    /// Additional named measurements.
    pub keywords: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy)]
struct StatPoint {
    elements: usize,
    queue_depth: f64,
    at: Instant,
}

fn window_rates(points: &VecDeque<StatPoint>) -> (f64, f64) {
    let (first, last) = match (points.front(), points.back()) {
        (Some(first), Some(last)) => (first, last),
        _ => return (0.0, 0.0),
    };
    let span = last.at.duration_since(first.at).as_secs_f64();
    if span <= 0.0 {
        return (0.0, 0.0);
    }
    // The first sample opens the window, so its elements are not counted.
    let elements: usize = points.iter().skip(1).map(|p| p.elements).sum();
    let calls = (points.len() - 1) as f64;
    (elements as f64 / span, calls / span)
}

/// Statistics for single-packet input ports.
#[derive(Debug, Clone)]
pub struct LinkStatistics {
    port_name: String,
    enabled: bool,
    bit_size: f64,
    history: VecDeque<StatPoint>,
    active_streams: Vec<String>,
    last_flush: Option<Instant>,
    flush_count: u64,
}

impl LinkStatistics {
    /// Creates a collector; `bits_per_element` scales the bit rate.
    pub fn new(port_name: impl Into<String>, bits_per_element: usize) -> Self {
        Self {
            port_name: port_name.into(),
            enabled: true,
            bit_size: bits_per_element as f64,
            history: VecDeque::with_capacity(HISTORY_WINDOW),
            active_streams: Vec::new(),
            last_flush: None,
            flush_count: 0,
        }
    }

    /// Enables or disables recording.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns whether recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records one pushed packet.
    pub fn update(&mut self, elements: usize, queue_depth: f64, eos: bool, stream_id: &str, flushed: bool) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        if self.history.len() == HISTORY_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(StatPoint {
            elements,
            queue_depth,
            at: now,
        });

        if eos {
            self.active_streams.retain(|id| id != stream_id);
        } else if !self.active_streams.iter().any(|id| id == stream_id) {
            self.active_streams.push(stream_id.to_string());
        }

        if flushed {
            self.last_flush = Some(now);
            self.flush_count += 1;
        }
    }

    /// Streams that have pushed data without an end-of-stream yet.
    pub fn active_stream_ids(&self) -> &[String] {
        &self.active_streams
    }

    /// Computes a snapshot from the history window.
    pub fn retrieve(&self) -> PortStatistics {
        let now = Instant::now();
        let (elements_per_second, calls_per_second) = window_rates(&self.history);
        let average_queue_depth = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().map(|p| p.queue_depth).sum::<f64>() / self.history.len() as f64
        };
        let time_since_last_call = self
            .history
            .back()
            .map(|p| now.duration_since(p.at).as_secs_f64())
            .unwrap_or(0.0);

        let mut keywords = BTreeMap::new();
        if let Some(flush) = self.last_flush {
            keywords.insert("timeSinceLastFlush".to_string(), now.duration_since(flush).as_secs_f64());
            keywords.insert("flushCount".to_string(), self.flush_count as f64);
        }

        PortStatistics {
            port_name: self.port_name.clone(),
            elements_per_second,
            bits_per_second: elements_per_second * self.bit_size,
            calls_per_second,
            stream_ids: self.active_streams.clone(),
            average_queue_depth,
            time_since_last_call,
            keywords,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BurstPoint {
    bursts: usize,
    latency: f64,
    base: StatPoint,
}

/// Statistics for burst ports, used on both the receiving side and per
/// outgoing connection.
#[derive(Debug, Clone)]
pub struct BurstStatistics {
    port_name: String,
    bit_size: f64,
    history: VecDeque<BurstPoint>,
    flush_count: u64,
    bursts_dropped: u64,
}

impl BurstStatistics {
    /// Creates a collector; `bits_per_element` scales the bit rate.
    pub fn new(port_name: impl Into<String>, bits_per_element: usize) -> Self {
        Self {
            port_name: port_name.into(),
            bit_size: bits_per_element as f64,
            history: VecDeque::with_capacity(HISTORY_WINDOW),
            flush_count: 0,
            bursts_dropped: 0,
        }
    }

    /// Records one delivery of `bursts` bursts holding `elements` elements.
    ///
    /// `latency` is in seconds: time spent inside the push on the receiving
    /// side, or queueing delay before delivery on the sending side.
    pub fn record(&mut self, bursts: usize, elements: usize, queue_depth: f64, latency: f64) {
        if self.history.len() == HISTORY_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(BurstPoint {
            bursts,
            latency,
            base: StatPoint {
                elements,
                queue_depth,
                at: Instant::now(),
            },
        });
    }

    /// Records an explicit queue flush that discarded `bursts` bursts.
    pub fn flush_occurred(&mut self, bursts: usize) {
        self.flush_count += 1;
        self.bursts_dropped += bursts as u64;
    }

    /// Computes a snapshot from the history window.
    pub fn retrieve(&self) -> PortStatistics {
        let now = Instant::now();
        let base: VecDeque<StatPoint> = self.history.iter().map(|p| p.base).collect();
        let (elements_per_second, calls_per_second) = window_rates(&base);

        let count = self.history.len() as f64;
        let mut keywords = BTreeMap::new();
        let average_queue_depth = if self.history.is_empty() {
            0.0
        } else {
            let bursts: usize = self.history.iter().map(|p| p.bursts).sum();
            let elements: usize = self.history.iter().map(|p| p.base.elements).sum();
            let latency: f64 = self.history.iter().map(|p| p.latency).sum();
            keywords.insert("AVG_BURSTS".to_string(), bursts as f64 / count);
            keywords.insert("AVG_ELEMENTS".to_string(), elements as f64 / count);
            keywords.insert("AVG_LATENCY".to_string(), latency / count);
            self.history.iter().map(|p| p.base.queue_depth).sum::<f64>() / count
        };
        if self.flush_count > 0 {
            keywords.insert("FLUSH_COUNT".to_string(), self.flush_count as f64);
            keywords.insert("BURSTS_DROPPED".to_string(), self.bursts_dropped as f64);
        }

        PortStatistics {
            port_name: self.port_name.clone(),
            elements_per_second,
            bits_per_second: elements_per_second * self.bit_size,
            calls_per_second,
            stream_ids: Vec::new(),
            average_queue_depth,
            time_since_last_call: self
                .history
                .back()
                .map(|p| now.duration_since(p.base.at).as_secs_f64())
                .unwrap_or(0.0),
            keywords,
        }
    }
}
