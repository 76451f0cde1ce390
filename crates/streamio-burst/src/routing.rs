//! Stream-to-connection routing table.

use std::collections::{BTreeSet, HashMap};

use streamio_core::{ConnectionFilter, RoutingMode};

/// Maps each stream ID to the connections subscribed to it.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, BTreeSet<String>>,
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `connection_id` to `stream_id`.
    pub fn add(&mut self, stream_id: &str, connection_id: &str) {
        self.routes
            .entry(stream_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Unsubscribes `connection_id` from `stream_id`.
    pub fn remove(&mut self, stream_id: &str, connection_id: &str) {
        if let Some(connections) = self.routes.get_mut(stream_id) {
            connections.remove(connection_id);
            if connections.is_empty() {
                self.routes.remove(stream_id);
            }
        }
    }

    /// Drops every route to `connection_id`.
    pub fn remove_connection(&mut self, connection_id: &str) {
        self.routes.retain(|_, connections| {
            connections.remove(connection_id);
            !connections.is_empty()
        });
    }

    /// Replaces the table with the filters that apply to `port_name`.
    pub fn replace(&mut self, port_name: &str, filters: &[ConnectionFilter]) {
        self.routes.clear();
        for filter in filters.iter().filter(|f| f.applies_to(port_name)) {
            self.add(&filter.stream_id, &filter.connection_id);
        }
    }

    /// Returns true when data for `stream_id` goes to `connection_id` under
    /// `mode`. Only [`RoutingMode::ConnectionStreams`] consults the table.
    pub fn is_routed(&self, mode: RoutingMode, stream_id: &str, connection_id: &str) -> bool {
        if mode != RoutingMode::ConnectionStreams {
            return true;
        }
        self.routes
            .get(stream_id)
            .map(|connections| connections.contains(connection_id))
            .unwrap_or(false)
    }

    /// Number of streams with at least one route.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true when no routes exist.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
