//! Burst input port.
//!
//! Incoming batches are queued whole. Producers block while the number of
//! queued bursts is at or above the queue threshold; there is no lossy
//! policy. A stopped port discards pushed batches and makes every wait
//! return immediately. Ports are created stopped.

use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use streamio_core::time::timeout_duration;
use streamio_core::{BurstInPortConfig, BurstStatistics, PortError, PortStatistics, PortUsage, Result};
use tracing::{debug, trace};

use crate::burst::{element_count, Burst, BurstPacket};

struct QueueState<T> {
    batches: VecDeque<Vec<Burst<T>>>,
    // Index of the next unread burst in the front batch.
    offset: usize,
    queued: usize,
    threshold: usize,
    started: bool,
    block_occurred: bool,
    stream_ids: BTreeSet<String>,
    stats: BurstStatistics,
}

/// Input port receiving batches of bursts.
pub struct BurstInPort<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> std::fmt::Debug for BurstInPort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BurstInPort")
            .field("name", &self.name)
            .field("queued", &state.queued)
            .field("threshold", &state.threshold)
            .field("started", &state.started)
            .finish()
    }
}

impl<T> BurstInPort<T> {
    /// Creates a stopped port with the default queue threshold.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), BurstInPortConfig::default())
    }

    /// Creates a stopped port from `config`.
    pub fn with_config(name: impl Into<String>, config: BurstInPortConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(name.into(), config))
    }

    fn build(name: String, config: BurstInPortConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                batches: VecDeque::new(),
                offset: 0,
                queued: 0,
                threshold: config.queue_threshold,
                started: false,
                block_occurred: false,
                stream_ids: BTreeSet::new(),
                stats: BurstStatistics::new(name.clone(), std::mem::size_of::<T>() * 8),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            name,
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of queued bursts at which producers block.
    pub fn queue_threshold(&self) -> usize {
        self.state.lock().threshold
    }

    /// Changes the queue threshold. Raising it wakes blocked producers.
    pub fn set_queue_threshold(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(PortError::InvalidQueueThreshold { requested: count });
        }
        let mut state = self.state.lock();
        if count > state.threshold {
            self.not_full.notify_all();
        }
        state.threshold = count;
        Ok(())
    }

    /// Number of bursts waiting to be read.
    pub fn queue_depth(&self) -> usize {
        self.state.lock().queued
    }

    /// Accepts data.
    pub fn start(&self) {
        trace!(port = %self.name, "port started");
        self.state.lock().started = true;
    }

    /// Stops accepting data and releases every waiting thread.
    pub fn stop(&self) {
        trace!(port = %self.name, "port stopped");
        let mut state = self.state.lock();
        state.started = false;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Lifecycle alias for [`BurstInPort::start`].
    pub fn start_port(&self) {
        self.start();
    }

    /// Lifecycle alias for [`BurstInPort::stop`].
    pub fn stop_port(&self) {
        self.stop();
    }

    /// Returns true while the port accepts data.
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Queues a batch of bursts as a single entry.
    ///
    /// Blocks while the queue is at its threshold. If the port is stopped
    /// before room appears, the whole batch is discarded.
    pub fn push_bursts(&self, bursts: Vec<Burst<T>>) {
        let begin = Instant::now();
        let mut state = self.state.lock();

        // Depth as seen on arrival, before any wait.
        let queue_depth = state.queued as f64 / state.threshold as f64;

        let mut block_reported = false;
        while state.started && state.queued >= state.threshold {
            if !block_reported {
                block_reported = true;
                state.block_occurred = true;
                debug!(port = %self.name, queued = state.queued, "queue full, producer blocked");
            }
            self.not_full.wait(&mut state);
        }

        if !state.started {
            trace!(port = %self.name, bursts = bursts.len(), "port stopped, discarding bursts");
            return;
        }

        let total_bursts = bursts.len();
        let total_elements = element_count(&bursts);
        for burst in bursts.iter().filter(|b| !b.eos) {
            if !state.stream_ids.contains(burst.stream_id()) {
                state.stream_ids.insert(burst.stream_id().to_string());
            }
        }

        if total_bursts > 0 {
            trace!(port = %self.name, bursts = total_bursts, "queueing bursts");
            state.batches.push_back(bursts);
            state.queued += total_bursts;
            self.not_empty.notify_all();
        } else {
            debug!(port = %self.name, "push contained no bursts");
        }

        let elapsed = begin.elapsed().as_secs_f64();
        state.stats.record(total_bursts, total_elements, queue_depth, elapsed);
    }

    fn wait_burst(&self, timeout: f64, state: &mut MutexGuard<'_, QueueState<T>>) -> bool {
        if timeout > 0.0 {
            let deadline = timeout_duration(timeout).and_then(|wait| Instant::now().checked_add(wait));
            while state.started && state.queued == 0 {
                match deadline {
                    Some(deadline) => {
                        if self.not_empty.wait_until(state, deadline).timed_out() {
                            return false;
                        }
                    }
                    None => self.not_empty.wait(state),
                }
            }
        } else if timeout < 0.0 {
            while state.started && state.queued == 0 {
                self.not_empty.wait(state);
            }
        }
        state.started && state.queued > 0
    }

    /// Takes one burst.
    ///
    /// `timeout` is in seconds: 0 polls, a positive value waits at most that
    /// long, a negative value waits until data arrives or the port is
    /// stopped.
    pub fn get_burst(&self, timeout: f64) -> Option<BurstPacket<T>> {
        let mut state = self.state.lock();
        if !self.wait_burst(timeout, &mut state) {
            return None;
        }

        let offset = state.offset;
        let (burst, exhausted) = {
            let front = state.batches.front_mut()?;
            let slot = front.get_mut(offset)?;
            let burst = Burst {
                sri: std::mem::take(&mut slot.sri),
                data: std::mem::take(&mut slot.data),
                eos: slot.eos,
                timestamp: slot.timestamp,
            };
            (burst, offset + 1 == front.len())
        };

        let block_occurred = std::mem::replace(&mut state.block_occurred, false);
        if burst.eos {
            trace!(port = %self.name, stream_id = %burst.stream_id(), "received EOS");
            state.stream_ids.remove(burst.stream_id());
        }

        if exhausted {
            state.batches.pop_front();
            state.offset = 0;
        } else {
            state.offset += 1;
        }
        state.queued -= 1;
        self.not_full.notify_all();

        Some(BurstPacket { burst, block_occurred })
    }

    /// Takes every remaining burst of the oldest queued batch.
    ///
    /// Returns an empty batch on timeout or when the port is stopped.
    pub fn get_bursts(&self, timeout: f64) -> Vec<Burst<T>> {
        let mut state = self.state.lock();
        if !self.wait_burst(timeout, &mut state) {
            return Vec::new();
        }

        let offset = std::mem::replace(&mut state.offset, 0);
        let mut bursts = match state.batches.pop_front() {
            Some(batch) => batch,
            None => return Vec::new(),
        };
        if offset > 0 {
            trace!(port = %self.name, offset, "returning remainder of partially read batch");
            bursts.drain(..offset);
        }

        for burst in bursts.iter().filter(|b| b.eos) {
            state.stream_ids.remove(burst.stream_id());
        }
        state.queued -= bursts.len();
        self.not_full.notify_all();
        bursts
    }

    /// Reports whether a producer blocked since the last call, then clears
    /// the flag.
    pub fn block_occurred(&self) -> bool {
        std::mem::replace(&mut self.state.lock().block_occurred, false)
    }

    /// Discards every queued burst and wakes blocked producers.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        if state.batches.is_empty() {
            return;
        }
        debug!(port = %self.name, dropped = state.queued, "flushing queue");
        let dropped = state.queued;
        state.stats.flush_occurred(dropped);
        state.batches.clear();
        state.offset = 0;
        state.queued = 0;
        self.not_full.notify_all();
    }

    /// Occupancy of the queue against its threshold.
    pub fn state(&self) -> PortUsage {
        let state = self.state.lock();
        if state.queued == 0 {
            PortUsage::Idle
        } else if state.queued >= state.threshold {
            PortUsage::Busy
        } else {
            PortUsage::Active
        }
    }

    /// Snapshot of recent activity, including streams not yet ended.
    pub fn statistics(&self) -> PortStatistics {
        let state = self.state.lock();
        let mut stats = state.stats.retrieve();
        stats.stream_ids = state.stream_ids.iter().cloned().collect();
        stats
    }
}
