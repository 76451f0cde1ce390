//! Burst output port.
//!
//! Pushed bursts are batched per stream (or all together in interleaved
//! mode) by [`OutputQueue`] and sent to every routed connection when a flush
//! threshold is reached. Delivery failures stay inside the port.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use streamio_core::{
    BurstSri, ConnectionFilter, ExecutorService, OutPortConfig, PortError, PortUsage, PrecisionTime, Result,
    RoutingMode, MODE_COMPLEX, MODE_REAL,
};
use tracing::{debug, trace};

use crate::burst::Burst;
use crate::connection::{ConnectionInfo, ConnectionStatistics, Dispatcher};
use crate::policy::{OutputQueue, PolicySettings};
use crate::routing::RouteTable;
use crate::transport::BurstTransport;

const DEFAULT_QUEUE_ID: &str = "(default)";

struct QueueTable<T> {
    default: Arc<OutputQueue<T>>,
    // In interleaved mode every entry points at the default queue.
    streams: HashMap<String, Arc<OutputQueue<T>>>,
    mode: RoutingMode,
}

/// Output port batching bursts for its connections.
pub struct BurstOutPort<T> {
    name: String,
    queues: Mutex<QueueTable<T>>,
    dispatcher: Arc<Dispatcher<T>>,
    executor: Arc<ExecutorService>,
}

impl<T> std::fmt::Debug for BurstOutPort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.queues.lock();
        f.debug_struct("BurstOutPort")
            .field("name", &self.name)
            .field("mode", &table.mode)
            .field("streams", &table.streams.len())
            .finish()
    }
}

impl<T: Send + 'static> BurstOutPort<T> {
    /// Creates a port with the default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), &OutPortConfig::default())
    }

    /// Creates a port from `config`.
    pub fn with_config(name: impl Into<String>, config: OutPortConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(name.into(), &config))
    }

    fn build(name: String, config: &OutPortConfig) -> Self {
        let mut routes = RouteTable::new();
        routes.replace(&name, &config.routes);
        let dispatcher = Arc::new(Dispatcher::new(name.clone(), config.routing_mode, routes));
        let executor = Arc::new(ExecutorService::new(format!("{name}-monitor")));
        let default = OutputQueue::new(
            DEFAULT_QUEUE_ID,
            PolicySettings::from(config),
            Arc::clone(&dispatcher),
            Arc::clone(&executor),
        );
        Self {
            queues: Mutex::new(QueueTable {
                default,
                streams: HashMap::new(),
                mode: config.routing_mode,
            }),
            dispatcher,
            executor,
            name,
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts the latency monitor.
    pub fn start(&self) {
        self.executor.start();
    }

    /// Stops the latency monitor, drops pending checks and sends everything
    /// still queued.
    pub fn stop(&self) {
        self.executor.stop();
        self.executor.clear();
        self.flush();
    }

    /// Lifecycle alias for [`BurstOutPort::start`].
    pub fn start_port(&self) {
        self.start();
    }

    /// Lifecycle alias for [`BurstOutPort::stop`].
    pub fn stop_port(&self) {
        self.stop();
    }

    /// Returns true while the latency monitor is running.
    pub fn is_started(&self) -> bool {
        self.executor.is_running()
    }

    /// Policy used by the interleaved queue and copied into new stream
    /// queues.
    pub fn default_policy(&self) -> Arc<OutputQueue<T>> {
        Arc::clone(&self.queues.lock().default)
    }

    /// Policy of the queue currently serving `stream_id`.
    pub fn stream_policy(&self, stream_id: &str) -> Result<Arc<OutputQueue<T>>> {
        let table = self.queues.lock();
        if table.mode.is_interleaved() {
            return Ok(Arc::clone(&table.default));
        }
        table
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| PortError::UnknownStream {
                stream_id: stream_id.to_string(),
            })
    }

    /// Default burst count threshold.
    pub fn max_bursts(&self) -> usize {
        self.default_policy().max_bursts()
    }

    /// Sets the default burst count threshold.
    pub fn set_max_bursts(&self, count: usize) {
        self.default_policy().set_max_bursts(count);
    }

    /// Default byte threshold.
    pub fn byte_threshold(&self) -> usize {
        self.default_policy().byte_threshold()
    }

    /// Sets the default byte threshold.
    pub fn set_byte_threshold(&self, bytes: usize) {
        self.default_policy().set_byte_threshold(bytes);
    }

    /// Default latency threshold in microseconds.
    pub fn latency_threshold_us(&self) -> u64 {
        self.default_policy().latency_threshold_us()
    }

    /// Sets the default latency threshold in microseconds.
    pub fn set_latency_threshold_us(&self, usec: u64) {
        self.default_policy().set_latency_threshold_us(usec);
    }

    /// Current routing mode.
    pub fn routing_mode(&self) -> RoutingMode {
        self.queues.lock().mode
    }

    /// Changes the routing mode. Everything queued under the old mode is
    /// sent first.
    pub fn set_routing_mode(&self, mode: RoutingMode) {
        let mut table = self.queues.lock();
        if table.mode == mode {
            return;
        }
        debug!(port = %self.name, ?mode, "changing routing mode");
        Self::flush_table(&table);
        table.streams.clear();
        table.mode = mode;
        self.dispatcher.set_mode(mode);
    }

    /// Adds a downstream connection. New connections start alive.
    pub fn add_connection(&self, connection_id: &str, transport: Arc<dyn BurstTransport<T>>) -> Result<()> {
        self.dispatcher.add_connection(connection_id, transport)
    }

    /// Removes a downstream connection and its routes.
    pub fn remove_connection(&self, connection_id: &str) -> Result<()> {
        self.dispatcher.remove_connection(connection_id)
    }

    /// Every connection with its liveness.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.dispatcher.connections()
    }

    /// Routes `stream_id` to `connection_id`.
    pub fn add_connection_filter(&self, stream_id: &str, connection_id: &str) {
        debug!(port = %self.name, stream_id, connection_id, "routing stream to connection");
        self.dispatcher.with_routes(|routes| routes.add(stream_id, connection_id));
    }

    /// Removes the route from `stream_id` to `connection_id`.
    pub fn remove_connection_filter(&self, stream_id: &str, connection_id: &str) {
        debug!(port = %self.name, stream_id, connection_id, "unrouting stream from connection");
        self.dispatcher
            .with_routes(|routes| routes.remove(stream_id, connection_id));
    }

    /// Replaces every route with the filters addressed to this port.
    pub fn update_connection_filter(&self, filters: &[ConnectionFilter]) {
        let name = self.name.as_str();
        self.dispatcher.with_routes(|routes| routes.replace(name, filters));
    }

    /// Queues a burst, marking it complex if its metadata says so.
    pub fn push_burst(&self, data: Vec<T>, sri: BurstSri, timestamp: PrecisionTime, eos: bool) {
        let is_complex = sri.is_complex();
        self.queue_burst(data, sri, timestamp, eos, is_complex);
    }

    /// Queues a burst stamped with the current time.
    pub fn push_burst_now(&self, data: Vec<T>, sri: BurstSri, eos: bool) {
        self.push_burst(data, sri, PrecisionTime::now(), eos);
    }

    /// Queues a prepared burst.
    pub fn push_burst_item(&self, burst: Burst<T>) {
        let is_complex = burst.sri.is_complex();
        self.queue_burst(burst.data, burst.sri, burst.timestamp, burst.eos, is_complex);
    }

    /// Queues a burst for its stream, flushing if a threshold is reached.
    ///
    /// An end-of-stream burst in per-stream modes flushes and retires the
    /// stream's queue.
    pub fn queue_burst(&self, data: Vec<T>, mut sri: BurstSri, timestamp: PrecisionTime, eos: bool, is_complex: bool) {
        sri.mode = if is_complex { MODE_COMPLEX } else { MODE_REAL };
        let stream_id = sri.stream_id.clone();
        let burst = Burst::new(sri, data, timestamp, eos);

        let mut table = self.queues.lock();
        let queue = self.queue_for_stream(&mut table, &stream_id);
        queue.queue_burst(burst);
        if eos {
            if !table.mode.is_interleaved() {
                debug!(port = %self.name, stream_id = %stream_id, "flushing on EOS");
                queue.flush();
            }
            table.streams.remove(&stream_id);
        }
    }

    fn queue_for_stream(&self, table: &mut QueueTable<T>, stream_id: &str) -> Arc<OutputQueue<T>> {
        if let Some(queue) = table.streams.get(stream_id) {
            return Arc::clone(queue);
        }
        let queue = if table.mode.is_interleaved() {
            Arc::clone(&table.default)
        } else {
            trace!(port = %self.name, stream_id, "creating queue for stream");
            OutputQueue::new(
                stream_id,
                table.default.settings(),
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.executor),
            )
        };
        table.streams.insert(stream_id.to_string(), Arc::clone(&queue));
        queue
    }

    /// Sends a batch immediately to every connection, bypassing batching.
    pub fn push_bursts(&self, bursts: &[Burst<T>]) {
        self.dispatcher.send_bursts(bursts, Instant::now(), 0.0, "");
    }

    /// Sends everything queued.
    pub fn flush(&self) {
        let table = self.queues.lock();
        Self::flush_table(&table);
    }

    fn flush_table(table: &QueueTable<T>) {
        if table.mode.is_interleaved() {
            table.default.flush();
        } else {
            for queue in table.streams.values() {
                queue.flush();
            }
        }
    }

    /// Idle without connections, active otherwise.
    pub fn state(&self) -> PortUsage {
        if self.dispatcher.is_empty() {
            PortUsage::Idle
        } else {
            PortUsage::Active
        }
    }

    /// Per-connection delivery statistics, each listing the live streams
    /// routed to it.
    pub fn statistics(&self) -> Vec<ConnectionStatistics> {
        let mut stream_ids: Vec<String> = self.queues.lock().streams.keys().cloned().collect();
        stream_ids.sort();
        self.dispatcher.statistics(&stream_ids)
    }
}
