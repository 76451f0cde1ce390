//! Single-packet input port.
//!
//! Producers call [`InPort::push_sri`] and [`InPort::push_packet`];
//! consumers call [`InPort::get_packet`]. The packet queue and the stream
//! registry are guarded by two separate locks which are never held at the
//! same time.
//!
//! Congestion is handled per stream according to the producer's metadata:
//! while any live stream is blocking, producers wait on a counting semaphore
//! for the consumer to drain; otherwise a push into a full queue purges the
//! queued data and marks the new packet as having followed a flush.
//! End-of-stream packets survive the purge with their payload emptied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use streamio_core::sri::default_comparator;
use streamio_core::time::timeout_duration;
use streamio_core::{
    InPortConfig, LinkStatistics, PortStatistics, PortUsage, PrecisionTime, QueueSemaphore, SriComparator,
    StreamSri,
};
use tracing::{debug, trace, warn};

use crate::packet::DataTransfer;
use crate::payload::{PayloadLength, SizeAccounting};
use crate::queue::PacketQueue;
use crate::registry::{NewStreamListener, SriUpdate, StreamRegistry};

struct DataState<P> {
    queue: PacketQueue<P>,
    blocking: bool,
    stats: LinkStatistics,
}

/// Bounded input port generic over its payload type.
pub struct InPort<P> {
    name: String,
    size_accounting: SizeAccounting,
    data: Mutex<DataState<P>>,
    data_available: Condvar,
    registry: Mutex<StreamRegistry>,
    semaphore: QueueSemaphore,
    break_block: AtomicBool,
}

impl<P> std::fmt::Debug for InPort<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InPort")
            .field("name", &self.name)
            .field("size_accounting", &self.size_accounting)
            .field("blocked", &self.break_block.load(Ordering::Relaxed))
            .finish()
    }
}

impl<P: PayloadLength> InPort<P> {
    /// Creates a port with the default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, InPortConfig::default())
    }

    /// Creates a port from `config`.
    pub fn with_config(name: impl Into<String>, config: InPortConfig) -> Self {
        Self::with_comparator(name, config, default_comparator())
    }

    /// Creates a port that uses `comparator` to decide whether pushed
    /// metadata differs from the stored record.
    pub fn with_comparator(name: impl Into<String>, config: InPortConfig, comparator: SriComparator) -> Self {
        Self::build(name.into(), config, comparator, SizeAccounting::PayloadLength)
    }

    pub(crate) fn build(
        name: String,
        config: InPortConfig,
        comparator: SriComparator,
        size_accounting: SizeAccounting,
    ) -> Self {
        let mut stats = LinkStatistics::new(name.clone(), P::BITS_PER_ELEMENT);
        stats.set_enabled(config.enable_stats);
        Self {
            size_accounting,
            data: Mutex::new(DataState {
                queue: PacketQueue::new(config.max_queue_depth),
                blocking: false,
                stats,
            }),
            data_available: Condvar::new(),
            registry: Mutex::new(StreamRegistry::new(comparator)),
            semaphore: QueueSemaphore::new(config.max_queue_depth),
            break_block: AtomicBool::new(false),
            name,
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size accounting strategy used for statistics.
    pub fn size_accounting(&self) -> SizeAccounting {
        self.size_accounting
    }

    /// Registers a callback run the first time each stream ID is seen.
    pub fn set_new_stream_listener<F>(&self, listener: F)
    where
        F: Fn(&StreamSri) + Send + Sync + 'static,
    {
        let listener: NewStreamListener = Arc::new(listener);
        self.registry.lock().set_listener(Some(listener));
    }

    /// Removes the new-stream callback.
    pub fn clear_new_stream_listener(&self) {
        self.registry.lock().set_listener(None);
    }

    /// Records stream metadata from the producer.
    pub fn push_sri(&self, sri: StreamSri) {
        trace!(port = %self.name, stream_id = %sri.stream_id, "push_sri");
        if sri.blocking {
            let mut data = self.data.lock();
            if !data.blocking {
                debug!(port = %self.name, stream_id = %sri.stream_id, "back-pressure engaged");
            }
            data.blocking = true;
            self.semaphore.set_curr_value(data.queue.len());
        }

        let update = self.registry.lock().update(sri);
        if update == SriUpdate::Changed {
            trace!(port = %self.name, "stream metadata replaced");
        }
    }

    /// Queues one packet.
    ///
    /// Blocks while back-pressure is engaged and the queue is at capacity.
    /// With back-pressure disengaged, a push into a full queue first discards
    /// every queued payload; end-of-stream packets stay queued, emptied. Does nothing when the maximum depth is 0.
    pub fn push_packet(&self, data: P, timestamp: PrecisionTime, eos: bool, stream_id: &str) {
        if self.data.lock().queue.max_depth() == 0 {
            return;
        }

        let snapshot = self.registry.lock().take_for_packet(stream_id);
        if snapshot.synthesized {
            warn!(port = %self.name, stream_id, "received data for stream without SRI, using defaults");
        }

        let port_blocking = self.data.lock().blocking;
        if port_blocking {
            self.semaphore.incr();
        }

        let elements = self.size_accounting.measure(&data);
        let mut packet = DataTransfer::new(data, timestamp, eos, stream_id, snapshot.sri);
        packet.sri_changed = snapshot.changed;

        let mut lost_changes = Vec::new();
        {
            let mut state = self.data.lock();
            if !port_blocking && state.queue.is_full() {
                let purged = state.queue.purge();
                debug!(
                    port = %self.name,
                    stream_id,
                    dropped = purged.dropped,
                    kept_eos = purged.kept_eos,
                    "queue full, flushing"
                );
                packet.input_queue_flushed = true;
                packet.sri_changed |= purged.sri_changed;
                lost_changes = purged
                    .changed_streams
                    .into_iter()
                    .filter(|id| id != stream_id)
                    .collect();
            }

            let flushed = packet.input_queue_flushed;
            let eos = packet.eos;
            state.queue.push(packet);
            let depth = state.queue.depth_ratio();
            state.stats.update(elements, depth, eos, stream_id, flushed);
            self.data_available.notify_all();
        }

        // Changes discarded for other streams are reported on their next packet.
        if !lost_changes.is_empty() {
            let mut registry = self.registry.lock();
            for id in &lost_changes {
                registry.mark_changed(id);
            }
        }
    }

    /// Takes the oldest packet.
    ///
    /// `timeout` is in seconds: 0 polls, a positive value waits at most that
    /// long, a negative value waits until data arrives or the port is
    /// stopped.
    pub fn get_packet(&self, timeout: f64) -> Option<DataTransfer<P>> {
        self.next_packet(timeout, None)
    }

    /// Takes the oldest packet belonging to `stream_id`.
    pub fn get_stream_packet(&self, timeout: f64, stream_id: &str) -> Option<DataTransfer<P>> {
        self.next_packet(timeout, Some(stream_id))
    }

    fn next_packet(&self, timeout: f64, stream_id: Option<&str>) -> Option<DataTransfer<P>> {
        if self.blocked() {
            return None;
        }

        let deadline = timeout_duration(timeout).and_then(|wait| Instant::now().checked_add(wait));
        let packet = {
            let mut data = self.data.lock();
            loop {
                if let Some(packet) = data.queue.pop(stream_id) {
                    break packet;
                }
                if timeout == 0.0 || self.blocked() {
                    return None;
                }
                match deadline {
                    Some(deadline) => {
                        if self.data_available.wait_until(&mut data, deadline).timed_out() {
                            return None;
                        }
                    }
                    None => self.data_available.wait(&mut data),
                }
                if self.blocked() {
                    return None;
                }
            }
        };

        let mut release = false;
        if packet.eos {
            let mut registry = self.registry.lock();
            if let Some(sri) = registry.remove(&packet.stream_id) {
                release = sri.blocking && !registry.any_blocking();
            }
        }

        let mut data = self.data.lock();
        if release {
            debug!(port = %self.name, stream_id = %packet.stream_id, "back-pressure released");
            data.blocking = false;
            self.semaphore.set_curr_value(0);
        }
        if data.blocking {
            self.semaphore.decr();
        }
        Some(packet)
    }

    /// Makes every current and future wait return immediately.
    pub fn block(&self) {
        self.break_block.store(true, Ordering::Release);
        self.semaphore.release();
        let _data = self.data.lock();
        self.data_available.notify_all();
    }

    /// Re-enables waiting after [`InPort::block`].
    pub fn unblock(&self) {
        self.break_block.store(false, Ordering::Release);
    }

    /// Lifecycle alias for [`InPort::unblock`].
    pub fn start_port(&self) {
        self.unblock();
    }

    /// Lifecycle alias for [`InPort::block`].
    pub fn stop_port(&self) {
        self.block();
    }

    /// Returns true while the port is blocked.
    pub fn blocked(&self) -> bool {
        self.break_block.load(Ordering::Acquire)
    }

    /// Returns true while some live stream has requested back-pressure.
    pub fn is_backpressured(&self) -> bool {
        self.data.lock().blocking
    }

    /// Metadata of every live stream, ordered by stream ID.
    pub fn active_sris(&self) -> Vec<StreamSri> {
        self.registry.lock().active_sris()
    }

    /// Maximum number of queued packets.
    pub fn max_queue_depth(&self) -> usize {
        self.data.lock().queue.max_depth()
    }

    /// Changes the maximum number of queued packets.
    pub fn set_max_queue_depth(&self, depth: usize) {
        self.data.lock().queue.set_max_depth(depth);
        self.semaphore.set_max_value(depth);
    }

    /// Number of packets currently queued.
    pub fn current_queue_depth(&self) -> usize {
        self.data.lock().queue.len()
    }

    /// Enables or disables statistics recording.
    pub fn enable_stats(&self, enable: bool) {
        self.data.lock().stats.set_enabled(enable);
    }

    /// Returns whether statistics are being recorded.
    pub fn stats_enabled(&self) -> bool {
        self.data.lock().stats.is_enabled()
    }

    /// Occupancy of the queue.
    pub fn state(&self) -> PortUsage {
        let data = self.data.lock();
        if data.queue.is_full() {
            PortUsage::Busy
        } else if data.queue.is_empty() {
            PortUsage::Idle
        } else {
            PortUsage::Active
        }
    }

    /// Snapshot of recent ingest activity.
    pub fn statistics(&self) -> PortStatistics {
        self.data.lock().stats.retrieve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn port(depth: usize) -> InPort<Vec<f32>> {
        InPort::with_config(
            "dataFloat_in",
            InPortConfig {
                max_queue_depth: depth,
                enable_stats: true,
            },
        )
    }

    fn push(port: &InPort<Vec<f32>>, stream_id: &str, value: f32, eos: bool) {
        port.push_packet(vec![value], PrecisionTime::now(), eos, stream_id);
    }

    #[test]
    fn test_poll_empty_returns_none() {
        let port = port(10);
        let start = Instant::now();
        assert!(port.get_packet(0.0).is_none());
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_timed_wait_expires() {
        let port = port(10);
        let start = Instant::now();
        assert!(port.get_packet(0.05).is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn test_push_then_get() {
        let port = port(10);
        port.push_sri(StreamSri::new("a"));
        push(&port, "a", 1.5, false);
        let packet = port.get_packet(0.0).unwrap();
        assert_eq!(packet.data, vec![1.5]);
        assert_eq!(packet.stream_id, "a");
        assert!(packet.sri_changed);
        assert!(!packet.input_queue_flushed);
    }

    #[test]
    fn test_sri_changed_reported_once() {
        let port = port(10);
        port.push_sri(StreamSri::new("a"));
        push(&port, "a", 1.0, false);
        push(&port, "a", 2.0, false);
        assert!(port.get_packet(0.0).unwrap().sri_changed);
        assert!(!port.get_packet(0.0).unwrap().sri_changed);

        port.push_sri(StreamSri::new("a").with_xdelta(0.25));
        push(&port, "a", 3.0, false);
        let packet = port.get_packet(0.0).unwrap();
        assert!(packet.sri_changed);
        assert_eq!(packet.sri.xdelta, 0.25);
    }

    #[test]
    fn test_zero_depth_drops_everything() {
        let port = port(0);
        port.push_sri(StreamSri::new("a"));
        push(&port, "a", 1.0, false);
        assert_eq!(port.current_queue_depth(), 0);
        assert!(port.get_packet(0.0).is_none());
    }

    #[test]
    fn test_overflow_flushes_queue() {
        let port = port(3);
        port.push_sri(StreamSri::new("a"));
        for i in 0..3 {
            push(&port, "a", i as f32, false);
        }
        push(&port, "a", 99.0, false);
        assert_eq!(port.current_queue_depth(), 1);
        let packet = port.get_packet(0.0).unwrap();
        assert_eq!(packet.data, vec![99.0]);
        assert!(packet.input_queue_flushed);
        assert!(packet.sri_changed);
        assert!(port.statistics().keywords.contains_key("timeSinceLastFlush"));
    }

    #[test]
    fn test_overflow_keeps_purged_eos() {
        let port = port(2);
        port.push_sri(StreamSri::new("a"));
        push(&port, "a", 1.0, false);
        push(&port, "a", 2.0, true);
        push(&port, "a", 3.0, false);
        assert_eq!(port.current_queue_depth(), 2);

        let end = port.get_packet(0.0).unwrap();
        assert!(end.eos);
        assert!(end.data.is_empty());
        assert!(port.active_sris().is_empty());
        let next = port.get_packet(0.0).unwrap();
        assert_eq!(next.data, vec![3.0]);
        assert!(!next.eos);
        assert!(next.input_queue_flushed);
    }

    #[test]
    fn test_overflow_eos_of_other_stream_ends_only_that_stream() {
        let port = port(2);
        port.push_sri(StreamSri::new("a").with_xdelta(0.5));
        port.push_sri(StreamSri::new("b"));
        push(&port, "b", 1.0, true);
        push(&port, "a", 2.0, false);
        push(&port, "a", 3.0, false);

        let end = port.get_packet(0.0).unwrap();
        assert_eq!(end.stream_id, "b");
        assert!(end.eos);
        let ids: Vec<String> = port.active_sris().into_iter().map(|s| s.stream_id).collect();
        assert_eq!(ids, vec!["a"]);

        let survivor = port.get_packet(0.0).unwrap();
        assert_eq!(survivor.stream_id, "a");
        assert!(!survivor.eos);
        assert_eq!(survivor.data, vec![3.0]);
        push(&port, "a", 4.0, false);
        assert_eq!(port.get_packet(0.0).unwrap().sri.xdelta, 0.5);
        assert!(port.get_packet(0.0).is_none());
    }

    #[test]
    fn test_overflow_reports_lost_change_on_other_stream() {
        let port = port(1);
        port.push_sri(StreamSri::new("b").with_xdelta(0.25));
        push(&port, "b", 1.0, false);
        port.push_sri(StreamSri::new("a"));
        push(&port, "a", 2.0, false);
        assert!(port.get_packet(0.0).unwrap().input_queue_flushed);

        push(&port, "b", 3.0, false);
        let packet = port.get_packet(0.0).unwrap();
        assert_eq!(packet.stream_id, "b");
        assert!(packet.sri_changed);
    }

    #[test]
    fn test_eos_removes_stream() {
        let port = port(10);
        port.push_sri(StreamSri::new("a"));
        port.push_sri(StreamSri::new("b"));
        push(&port, "a", 1.0, true);
        assert_eq!(port.active_sris().len(), 2);
        assert!(port.get_packet(0.0).unwrap().eos);
        let ids: Vec<String> = port.active_sris().into_iter().map(|s| s.stream_id).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_unknown_stream_gets_default_sri() {
        let port = port(10);
        push(&port, "ghost", 1.0, false);
        let packet = port.get_packet(0.0).unwrap();
        assert!(!packet.sri_changed);
        assert_eq!(packet.sri.stream_id, "ghost");
        assert!(!packet.sri.blocking);
        assert_eq!(port.active_sris().len(), 1);
    }

    #[test]
    fn test_blocking_sri_engages_and_eos_releases() {
        let port = port(10);
        port.push_sri(StreamSri::new("a").with_blocking(true));
        assert!(port.is_backpressured());
        push(&port, "a", 1.0, false);
        push(&port, "a", 2.0, true);
        assert_eq!(port.semaphore.curr_value(), 2);
        port.get_packet(0.0).unwrap();
        assert_eq!(port.semaphore.curr_value(), 1);
        port.get_packet(0.0).unwrap();
        assert!(!port.is_backpressured());
        assert_eq!(port.semaphore.curr_value(), 0);
    }

    #[test]
    fn test_blocking_kept_while_other_blocking_stream_live() {
        let port = port(10);
        port.push_sri(StreamSri::new("a").with_blocking(true));
        port.push_sri(StreamSri::new("b").with_blocking(true));
        push(&port, "a", 1.0, true);
        port.get_packet(0.0).unwrap();
        assert!(port.is_backpressured());
    }

    #[test]
    fn test_filtered_get() {
        let port = port(10);
        push(&port, "a", 1.0, false);
        push(&port, "b", 2.0, false);
        let packet = port.get_stream_packet(0.0, "b").unwrap();
        assert_eq!(packet.data, vec![2.0]);
        assert!(port.get_stream_packet(0.0, "b").is_none());
        assert_eq!(port.get_packet(0.0).unwrap().stream_id, "a");
    }

    #[test]
    fn test_filtered_get_waits_for_match() {
        let port = Arc::new(port(10));
        push(&port, "a", 1.0, false);
        let producer = {
            let port = Arc::clone(&port);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                port.push_packet(vec![2.0], PrecisionTime::now(), false, "b");
            })
        };
        let packet = port.get_stream_packet(1.0, "b").unwrap();
        assert_eq!(packet.stream_id, "b");
        producer.join().unwrap();
    }

    #[test]
    fn test_block_releases_waiter() {
        let port = Arc::new(port(10));
        let consumer = {
            let port = Arc::clone(&port);
            thread::spawn(move || port.get_packet(-1.0))
        };
        thread::sleep(Duration::from_millis(30));
        port.stop_port();
        assert!(consumer.join().unwrap().is_none());
        assert!(port.blocked());

        push(&port, "a", 1.0, false);
        assert!(port.get_packet(0.0).is_none());
        port.start_port();
        assert!(port.get_packet(0.0).is_some());
    }

    #[test]
    fn test_state_transitions() {
        let port = port(2);
        assert_eq!(port.state(), PortUsage::Idle);
        push(&port, "a", 1.0, false);
        assert_eq!(port.state(), PortUsage::Active);
        push(&port, "a", 2.0, false);
        assert_eq!(port.state(), PortUsage::Busy);
    }

    #[test]
    fn test_set_max_queue_depth() {
        let port = port(2);
        port.set_max_queue_depth(5);
        assert_eq!(port.max_queue_depth(), 5);
        assert_eq!(port.semaphore.max_value(), 5);
    }

    #[test]
    fn test_listener_sees_new_streams() {
        let port = port(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        port.set_new_stream_listener(move |sri| sink.lock().push(sri.stream_id.clone()));
        port.push_sri(StreamSri::new("a"));
        port.push_sri(StreamSri::new("a"));
        push(&port, "b", 1.0, false);
        assert_eq!(*seen.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_statistics_stream_ids() {
        let port = port(10);
        push(&port, "a", 1.0, false);
        push(&port, "b", 1.0, false);
        let stats = port.statistics();
        assert_eq!(stats.port_name, "dataFloat_in");
        assert_eq!(stats.stream_ids, vec!["a", "b"]);

        assert!(port.stats_enabled());
        port.enable_stats(false);
        assert!(!port.stats_enabled());
        push(&port, "c", 1.0, false);
        assert_eq!(port.statistics().stream_ids.len(), 2);
    }
}
