//! Output batching policy.
//!
//! An [`OutputQueue`] accumulates bursts for one stream (or for every stream
//! in interleaved mode) and sends them as one batch once the burst count,
//! the byte count or the age of the oldest burst reaches its threshold.
//! The first burst into an empty queue schedules a latency check on the
//! port's executor so sparse streams still go out on time.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use streamio_core::{ExecutorService, OutPortConfig};
use tracing::{debug, trace};

use crate::burst::Burst;
use crate::connection::Dispatcher;

/// Flush thresholds of one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySettings {
    /// Bursts queued before a flush.
    pub max_bursts: usize,
    /// Bytes queued before a flush.
    pub byte_threshold: usize,
    /// Maximum age of the oldest queued burst.
    pub latency_threshold: Duration,
}

impl From<&OutPortConfig> for PolicySettings {
    fn from(config: &OutPortConfig) -> Self {
        Self {
            max_bursts: config.max_bursts,
            byte_threshold: config.byte_threshold,
            latency_threshold: Duration::from_micros(config.latency_threshold_us),
        }
    }
}

struct PolicyState<T> {
    bursts: Vec<Burst<T>>,
    bytes: usize,
    start_time: Option<Instant>,
    settings: PolicySettings,
}

impl<T> PolicyState<T> {
    fn deadline(&self) -> Option<Instant> {
        self.start_time
            .and_then(|start| start.checked_add(self.settings.latency_threshold))
    }

    fn should_flush(&self) -> bool {
        if self.bursts.len() >= self.settings.max_bursts {
            return true;
        }
        if self.bytes >= self.settings.byte_threshold {
            return true;
        }
        self.deadline().map(|d| Instant::now() >= d).unwrap_or(false)
    }
}

/// Batching queue for one output stream.
pub struct OutputQueue<T> {
    stream_id: String,
    state: Mutex<PolicyState<T>>,
    dispatcher: Arc<Dispatcher<T>>,
    executor: Arc<ExecutorService>,
    me: Weak<OutputQueue<T>>,
}

impl<T> std::fmt::Debug for OutputQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OutputQueue")
            .field("stream_id", &self.stream_id)
            .field("queued", &state.bursts.len())
            .field("bytes", &state.bytes)
            .field("settings", &state.settings)
            .finish()
    }
}

impl<T: Send + 'static> OutputQueue<T> {
    pub(crate) fn new(
        stream_id: impl Into<String>,
        settings: PolicySettings,
        dispatcher: Arc<Dispatcher<T>>,
        executor: Arc<ExecutorService>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            stream_id: stream_id.into(),
            state: Mutex::new(PolicyState {
                bursts: Vec::new(),
                bytes: 0,
                start_time: None,
                settings,
            }),
            dispatcher,
            executor,
            me: me.clone(),
        })
    }

    /// Stream served by this queue.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Current thresholds.
    pub fn settings(&self) -> PolicySettings {
        self.state.lock().settings
    }

    /// Bursts queued before a flush.
    pub fn max_bursts(&self) -> usize {
        self.state.lock().settings.max_bursts
    }

    /// Changes the burst count threshold, flushing on the executor if the
    /// queue already holds that many.
    pub fn set_max_bursts(&self, count: usize) {
        let mut state = self.state.lock();
        state.settings.max_bursts = count;
        if state.bursts.len() >= count {
            debug!(stream_id = %self.stream_id, max_bursts = count, "new max bursts triggering push");
            self.execute_threaded_flush();
        }
    }

    /// Bytes queued before a flush.
    pub fn byte_threshold(&self) -> usize {
        self.state.lock().settings.byte_threshold
    }

    /// Changes the byte threshold, flushing on the executor if the queue
    /// already holds that many bytes.
    pub fn set_byte_threshold(&self, bytes: usize) {
        let mut state = self.state.lock();
        state.settings.byte_threshold = bytes;
        if state.bytes >= bytes {
            debug!(stream_id = %self.stream_id, byte_threshold = bytes, "new byte threshold triggering push");
            self.execute_threaded_flush();
        }
    }

    /// Maximum age of the oldest queued burst, in microseconds.
    pub fn latency_threshold_us(&self) -> u64 {
        self.state.lock().settings.latency_threshold.as_micros() as u64
    }

    /// Changes the latency threshold and reschedules the pending check.
    pub fn set_latency_threshold_us(&self, usec: u64) {
        let mut state = self.state.lock();
        state.settings.latency_threshold = Duration::from_micros(usec);
        if !state.bursts.is_empty() {
            if let Some(deadline) = state.deadline() {
                self.schedule_check(deadline);
            }
        }
    }

    /// Number of bursts waiting to be sent.
    pub fn queued_bursts(&self) -> usize {
        self.state.lock().bursts.len()
    }

    /// Bytes waiting to be sent.
    pub fn queued_bytes(&self) -> usize {
        self.state.lock().bytes
    }

    pub(crate) fn queue_burst(&self, burst: Burst<T>) {
        let mut state = self.state.lock();
        if state.bursts.is_empty() {
            let now = Instant::now();
            state.start_time = Some(now);
            trace!(
                stream_id = %self.stream_id,
                latency_us = state.settings.latency_threshold.as_micros() as u64,
                "scheduling latency check"
            );
            if let Some(deadline) = state.deadline() {
                self.schedule_check(deadline);
            }
        }

        state.bytes += burst.byte_size();
        state.bursts.push(burst);
        trace!(
            stream_id = %self.stream_id,
            bursts = state.bursts.len(),
            bytes = state.bytes,
            "burst queued"
        );

        if state.should_flush() {
            debug!(stream_id = %self.stream_id, "queued burst exceeded threshold, flushing queue");
            self.send_locked(&mut state);
        }
    }

    /// Sends everything queued, regardless of thresholds.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        self.send_locked(&mut state);
    }

    pub(crate) fn check_flush(&self) {
        let mut state = self.state.lock();
        if state.should_flush() {
            trace!(stream_id = %self.stream_id, "latency check flushing queue");
            self.send_locked(&mut state);
        }
    }

    fn send_locked(&self, state: &mut PolicyState<T>) {
        if state.bursts.is_empty() {
            return;
        }
        let capacity = state.settings.max_bursts;
        let bursts = std::mem::replace(&mut state.bursts, Vec::with_capacity(capacity));
        let start = state.start_time.take().unwrap_or_else(Instant::now);
        let queue_depth = bursts.len() as f64 / capacity.max(1) as f64;
        state.bytes = 0;
        self.dispatcher
            .send_bursts(&bursts, start, queue_depth, &self.stream_id);
    }

    fn schedule_check(&self, when: Instant) {
        let queue = self.me.clone();
        self.executor.schedule(when, move || {
            if let Some(queue) = queue.upgrade() {
                queue.check_flush();
            }
        });
    }

    fn execute_threaded_flush(&self) {
        let queue = self.me.clone();
        self.executor.execute(move || {
            if let Some(queue) = queue.upgrade() {
                queue.flush();
            }
        });
    }
}
