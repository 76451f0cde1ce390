//! Downstream connections of an output port.
//!
//! Every connection tracks its own liveness and delivery statistics. A
//! failed delivery never propagates to the pushing application: oversized
//! batches are split in half until single bursts remain, and any other
//! failure marks the connection dead until its next successful delivery.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use streamio_core::{BurstStatistics, PortError, PortStatistics, Result, RoutingMode};
use tracing::{debug, error, trace};

use crate::burst::{element_count, Burst};
use crate::error::TransportError;
use crate::routing::RouteTable;
use crate::transport::BurstTransport;

/// Liveness summary of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Connection identifier.
    pub connection_id: String,
    /// Description of the receiving end.
    pub endpoint: String,
    /// False after an unrecoverable delivery failure.
    pub alive: bool,
}

/// Delivery statistics of one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatistics {
    /// Connection identifier.
    pub connection_id: String,
    /// Recent deliveries, with the streams routed to this connection.
    pub statistics: PortStatistics,
}

struct Connection<T> {
    id: String,
    transport: Arc<dyn BurstTransport<T>>,
    alive: bool,
    stats: BurstStatistics,
}

impl<T> Connection<T> {
    fn deliver(&mut self, port_name: &str, bursts: &[Burst<T>], start: Instant, queue_depth: f64) {
        let delay = start.elapsed().as_secs_f64();
        match self.transport.push_bursts(bursts) {
            Ok(()) => {
                if !self.alive {
                    debug!(port = %port_name, connection_id = %self.id, "connection recovered");
                }
                self.alive = true;
                self.stats.record(bursts.len(), element_count(bursts), queue_depth, delay);
            }
            Err(TransportError::MessageTooLarge { .. }) if bursts.len() > 1 => {
                let middle = bursts.len() / 2;
                trace!(
                    port = %port_name,
                    connection_id = %self.id,
                    bursts = bursts.len(),
                    "batch too large, splitting"
                );
                self.deliver(port_name, &bursts[..middle], start, queue_depth);
                self.deliver(port_name, &bursts[middle..], start, queue_depth);
            }
            Err(err) => {
                if self.alive {
                    error!(port = %port_name, connection_id = %self.id, error = %err, "push_bursts failed");
                }
                self.alive = false;
            }
        }
    }
}

struct DispatchState<T> {
    connections: Vec<Connection<T>>,
    routes: RouteTable,
    mode: RoutingMode,
}

/// Connection list and routing table, guarded by one lock.
pub(crate) struct Dispatcher<T> {
    port_name: String,
    state: Mutex<DispatchState<T>>,
}

impl<T> Dispatcher<T> {
    pub(crate) fn new(port_name: String, mode: RoutingMode, routes: RouteTable) -> Self {
        Self {
            port_name,
            state: Mutex::new(DispatchState {
                connections: Vec::new(),
                routes,
                mode,
            }),
        }
    }

    /// Delivers `bursts` to every connection routed for `stream_id`.
    pub(crate) fn send_bursts(&self, bursts: &[Burst<T>], start: Instant, queue_depth: f64, stream_id: &str) {
        trace!(port = %self.port_name, bursts = bursts.len(), stream_id, "sending bursts");
        let mut state = self.state.lock();
        let DispatchState {
            connections,
            routes,
            mode,
        } = &mut *state;
        for connection in connections.iter_mut() {
            if !routes.is_routed(*mode, stream_id, &connection.id) {
                continue;
            }
            connection.deliver(&self.port_name, bursts, start, queue_depth);
        }
    }

    pub(crate) fn add_connection(&self, connection_id: &str, transport: Arc<dyn BurstTransport<T>>) -> Result<()> {
        let mut state = self.state.lock();
        if state.connections.iter().any(|c| c.id == connection_id) {
            return Err(PortError::DuplicateConnection {
                connection_id: connection_id.to_string(),
            });
        }
        debug!(
            port = %self.port_name,
            connection_id,
            endpoint = %transport.describe(),
            "connection added"
        );
        state.connections.push(Connection {
            id: connection_id.to_string(),
            transport,
            alive: true,
            stats: BurstStatistics::new(self.port_name.clone(), std::mem::size_of::<T>() * 8),
        });
        Ok(())
    }

    pub(crate) fn remove_connection(&self, connection_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let index = state
            .connections
            .iter()
            .position(|c| c.id == connection_id)
            .ok_or_else(|| PortError::UnknownConnection {
                connection_id: connection_id.to_string(),
            })?;
        state.connections.remove(index);
        state.routes.remove_connection(connection_id);
        debug!(port = %self.port_name, connection_id, "connection removed");
        Ok(())
    }

    pub(crate) fn connections(&self) -> Vec<ConnectionInfo> {
        self.state
            .lock()
            .connections
            .iter()
            .map(|c| ConnectionInfo {
                connection_id: c.id.clone(),
                endpoint: c.transport.describe(),
                alive: c.alive,
            })
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().connections.is_empty()
    }

    pub(crate) fn set_mode(&self, mode: RoutingMode) {
        self.state.lock().mode = mode;
    }

    pub(crate) fn with_routes<R>(&self, f: impl FnOnce(&mut RouteTable) -> R) -> R {
        f(&mut self.state.lock().routes)
    }

    /// Per-connection statistics; `stream_ids` are the port's live streams.
    pub(crate) fn statistics(&self, stream_ids: &[String]) -> Vec<ConnectionStatistics> {
        let state = self.state.lock();
        state
            .connections
            .iter()
            .map(|c| {
                let mut statistics = c.stats.retrieve();
                statistics.stream_ids = stream_ids
                    .iter()
                    .filter(|id| state.routes.is_routed(state.mode, id, &c.id))
                    .cloned()
                    .collect();
                ConnectionStatistics {
                    connection_id: c.id.clone(),
                    statistics,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamio_core::{BurstSri, PrecisionTime};

    struct Recorder {
        limit: usize,
        calls: Mutex<Vec<usize>>,
        fail: Mutex<Option<TransportError>>,
    }

    impl Recorder {
        fn new(limit: usize) -> Arc<Self> {
            Arc::new(Self {
                limit,
                calls: Mutex::new(Vec::new()),
                fail: Mutex::new(None),
            })
        }
    }

    impl BurstTransport<u8> for Recorder {
        fn push_bursts(&self, bursts: &[Burst<u8>]) -> crate::error::Result<()> {
            self.calls.lock().push(bursts.len());
            if let Some(err) = self.fail.lock().clone() {
                return Err(err);
            }
            if bursts.len() > self.limit {
                return Err(TransportError::MessageTooLarge { bursts: bursts.len() });
            }
            Ok(())
        }
    }

    fn bursts(n: usize) -> Vec<Burst<u8>> {
        (0..n)
            .map(|i| Burst::new(BurstSri::new("s"), vec![i as u8], PrecisionTime::now(), false))
            .collect()
    }

    fn dispatcher(mode: RoutingMode) -> Dispatcher<u8> {
        Dispatcher::new("burstOctet_out".to_string(), mode, RouteTable::new())
    }

    #[test]
    fn test_bisection_to_single_bursts() {
        let dispatcher = dispatcher(RoutingMode::AllInterleaved);
        let recorder = Recorder::new(1);
        dispatcher.add_connection("c1", recorder.clone()).unwrap();
        dispatcher.send_bursts(&bursts(4), Instant::now(), 0.0, "s");
        assert_eq!(*recorder.calls.lock(), vec![4, 2, 1, 1, 2, 1, 1]);
        assert!(dispatcher.connections()[0].alive);
    }

    #[test]
    fn test_single_oversized_burst_marks_dead() {
        let dispatcher = dispatcher(RoutingMode::AllInterleaved);
        let recorder = Recorder::new(0);
        dispatcher.add_connection("c1", recorder.clone()).unwrap();
        dispatcher.send_bursts(&bursts(1), Instant::now(), 0.0, "s");
        assert_eq!(*recorder.calls.lock(), vec![1]);
        assert!(!dispatcher.connections()[0].alive);
    }

    #[test]
    fn test_failure_then_recovery() {
        let dispatcher = dispatcher(RoutingMode::AllInterleaved);
        let recorder = Recorder::new(usize::MAX);
        dispatcher.add_connection("c1", recorder.clone()).unwrap();
        *recorder.fail.lock() = Some(TransportError::Unreachable {
            reason: "peer gone".to_string(),
        });
        dispatcher.send_bursts(&bursts(3), Instant::now(), 0.0, "s");
        dispatcher.send_bursts(&bursts(3), Instant::now(), 0.0, "s");
        assert!(!dispatcher.connections()[0].alive);
        assert_eq!(recorder.calls.lock().len(), 2);

        *recorder.fail.lock() = None;
        dispatcher.send_bursts(&bursts(3), Instant::now(), 0.0, "s");
        assert!(dispatcher.connections()[0].alive);
    }

    #[test]
    fn test_duplicate_and_unknown_connection() {
        let dispatcher = dispatcher(RoutingMode::AllInterleaved);
        dispatcher.add_connection("c1", Recorder::new(1)).unwrap();
        assert!(matches!(
            dispatcher.add_connection("c1", Recorder::new(1)),
            Err(PortError::DuplicateConnection { .. })
        ));
        assert!(matches!(
            dispatcher.remove_connection("c9"),
            Err(PortError::UnknownConnection { .. })
        ));
        dispatcher.remove_connection("c1").unwrap();
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_connection_streams_routing() {
        let dispatcher = dispatcher(RoutingMode::ConnectionStreams);
        let r1 = Recorder::new(usize::MAX);
        let r2 = Recorder::new(usize::MAX);
        dispatcher.add_connection("c1", r1.clone()).unwrap();
        dispatcher.add_connection("c2", r2.clone()).unwrap();
        dispatcher.with_routes(|routes| routes.add("s", "c2"));
        dispatcher.send_bursts(&bursts(2), Instant::now(), 0.0, "s");
        assert!(r1.calls.lock().is_empty());
        assert_eq!(*r2.calls.lock(), vec![2]);

        let stats = dispatcher.statistics(&["s".to_string(), "t".to_string()]);
        assert!(stats[0].statistics.stream_ids.is_empty());
        assert_eq!(stats[1].statistics.stream_ids, vec!["s"]);
    }
}
