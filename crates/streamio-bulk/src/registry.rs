//! Live stream metadata keyed by stream ID.

use std::collections::HashMap;
use std::sync::Arc;

use streamio_core::sri::default_comparator;
use streamio_core::{SriComparator, StreamSri};
use tracing::{debug, trace};

/// Callback invoked the first time a stream ID is seen.
///
/// Runs while the registry lock is held and must not call back into the port.
pub type NewStreamListener = Arc<dyn Fn(&StreamSri) + Send + Sync>;

/// Outcome of [`StreamRegistry::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SriUpdate {
    /// The stream was unknown and has been added.
    New,
    /// The stored record differed and was replaced.
    Changed,
    /// The stored record matched; nothing was modified.
    Unchanged,
}

#[derive(Debug, Clone)]
struct SriEntry {
    sri: StreamSri,
    changed: bool,
}

/// Snapshot returned to a producer about to queue a packet.
#[derive(Debug, Clone)]
pub struct PacketSri {
    /// Metadata the packet will carry.
    pub sri: StreamSri,
    /// Pending change flag, now consumed.
    pub changed: bool,
    /// The stream had no metadata and a default record was registered.
    pub synthesized: bool,
}

/// Stream ID to `(metadata, changed)` map.
pub struct StreamRegistry {
    entries: HashMap<String, SriEntry>,
    comparator: SriComparator,
    listener: Option<NewStreamListener>,
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.entries.len())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new(default_comparator())
    }
}

impl StreamRegistry {
    /// Creates an empty registry using `comparator` to detect changes.
    pub fn new(comparator: SriComparator) -> Self {
        Self {
            entries: HashMap::new(),
            comparator,
            listener: None,
        }
    }

    /// Installs or removes the new-stream listener.
    pub fn set_listener(&mut self, listener: Option<NewStreamListener>) {
        self.listener = listener;
    }

    fn notify_new(&self, sri: &StreamSri) {
        if let Some(listener) = &self.listener {
            listener(sri);
        }
    }

    /// Records metadata pushed by a producer.
    pub fn update(&mut self, sri: StreamSri) -> SriUpdate {
        match self.entries.get_mut(&sri.stream_id) {
            None => {
                debug!(stream_id = %sri.stream_id, blocking = sri.blocking, "new stream");
                self.notify_new(&sri);
                self.entries.insert(sri.stream_id.clone(), SriEntry { sri, changed: true });
                SriUpdate::New
            }
            Some(entry) => {
                if (self.comparator)(&entry.sri, &sri) {
                    return SriUpdate::Unchanged;
                }
                trace!(stream_id = %sri.stream_id, "stream metadata changed");
                entry.sri = sri;
                entry.changed = true;
                SriUpdate::Changed
            }
        }
    }

    /// Snapshots the metadata for a packet and clears the change flag.
    ///
    /// An unknown stream gets a default real-valued, non-blocking record with
    /// the change flag cleared.
    pub fn take_for_packet(&mut self, stream_id: &str) -> PacketSri {
        if let Some(entry) = self.entries.get_mut(stream_id) {
            let changed = std::mem::replace(&mut entry.changed, false);
            return PacketSri {
                sri: entry.sri.clone(),
                changed,
                synthesized: false,
            };
        }

        let sri = StreamSri::new(stream_id);
        self.notify_new(&sri);
        self.entries.insert(
            stream_id.to_string(),
            SriEntry {
                sri: sri.clone(),
                changed: false,
            },
        );
        PacketSri {
            sri,
            changed: false,
            synthesized: true,
        }
    }

    /// Removes a stream, returning its last metadata.
    pub fn remove(&mut self, stream_id: &str) -> Option<StreamSri> {
        self.entries.remove(stream_id).map(|entry| entry.sri)
    }

    /// Flags a live stream's metadata as changed again, e.g. after the
    /// packet reporting the change was discarded. Unknown streams are
    /// ignored.
    pub fn mark_changed(&mut self, stream_id: &str) -> bool {
        match self.entries.get_mut(stream_id) {
            Some(entry) => {
                entry.changed = true;
                true
            }
            None => false,
        }
    }

    /// Returns true when any live stream requested blocking delivery.
    pub fn any_blocking(&self) -> bool {
        self.entries.values().any(|entry| entry.sri.blocking)
    }

    /// Returns the metadata for one stream.
    pub fn get(&self, stream_id: &str) -> Option<&StreamSri> {
        self.entries.get(stream_id).map(|entry| &entry.sri)
    }

    /// Returns true when a metadata change is waiting to be delivered.
    pub fn is_changed(&self, stream_id: &str) -> bool {
        self.entries.get(stream_id).map(|entry| entry.changed).unwrap_or(false)
    }

    /// Every live record, ordered by stream ID.
    pub fn active_sris(&self) -> Vec<StreamSri> {
        let mut sris: Vec<StreamSri> = self.entries.values().map(|entry| entry.sri.clone()).collect();
        sris.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        sris
    }

    /// Number of live streams.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no stream is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
