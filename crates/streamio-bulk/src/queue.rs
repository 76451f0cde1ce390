//! Bounded FIFO of pushed packets.
//!
//! The queue itself never blocks. Waiting for data or room is done by the
//! owning port, which holds the queue under its data lock.

use std::collections::{BTreeSet, VecDeque};

use crate::packet::DataTransfer;

/// Flags collected from packets discarded by [`PacketQueue::purge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    /// Number of packets discarded, including end-of-stream packets kept
    /// with their payload emptied.
    pub dropped: usize,
    /// At least one discarded packet carried a metadata change.
    pub sri_changed: bool,
    /// End-of-stream packets kept in the queue.
    pub kept_eos: usize,
    /// Streams whose metadata change was discarded without a later
    /// end-of-stream packet to carry it.
    pub changed_streams: BTreeSet<String>,
}

/// FIFO of packets with a configurable capacity.
#[derive(Debug)]
pub struct PacketQueue<P> {
    packets: VecDeque<DataTransfer<P>>,
    max_depth: usize,
    // Stream and queue length of the last filtered scan that found nothing.
    last_miss: Option<(String, usize)>,
}

impl<P> PacketQueue<P> {
    /// Creates an empty queue holding at most `max_depth` packets.
    pub fn new(max_depth: usize) -> Self {
        Self {
            packets: VecDeque::new(),
            max_depth,
            last_miss: None,
        }
    }

    /// Number of queued packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Configured capacity.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Changes the capacity. Packets already queued are kept.
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Returns true when the queue holds `max_depth` packets or more.
    pub fn is_full(&self) -> bool {
        self.packets.len() >= self.max_depth
    }

    /// Occupancy ratio in `[0, 1]` (above 1 while a blocking producer is
    /// being admitted past the capacity).
    pub fn depth_ratio(&self) -> f64 {
        if self.max_depth == 0 {
            return 0.0;
        }
        self.packets.len() as f64 / self.max_depth as f64
    }

    /// Appends a packet at the tail.
    pub fn push(&mut self, packet: DataTransfer<P>) {
        self.packets.push_back(packet);
    }

    /// Removes the head packet, or with `stream_id` the first packet of that
    /// stream.
    ///
    /// A filtered lookup that finds nothing remembers the queue length and
    /// skips the scan for that stream until the length changes.
    pub fn pop(&mut self, stream_id: Option<&str>) -> Option<DataTransfer<P>> {
        let packet = match stream_id {
            None => self.packets.pop_front(),
            Some(id) => {
                if self.packets.is_empty() || self.scanned_without_match(id) {
                    return None;
                }
                match self.packets.iter().position(|p| p.stream_id == id) {
                    Some(index) => self.packets.remove(index),
                    None => {
                        self.last_miss = Some((id.to_string(), self.packets.len()));
                        return None;
                    }
                }
            }
        };
        if packet.is_some() {
            self.last_miss = None;
        }
        packet
    }

    fn scanned_without_match(&self, stream_id: &str) -> bool {
        matches!(&self.last_miss, Some((id, size)) if id == stream_id && *size == self.packets.len())
    }

    /// Stream IDs of the queued packets, head first.
    pub fn stream_ids(&self) -> impl Iterator<Item = &str> {
        self.packets.iter().map(|p| p.stream_id.as_str())
    }
}

impl<P: Default> PacketQueue<P> {
    /// Discards every queued payload.
    ///
    /// End-of-stream packets stay queued with an empty payload so each
    /// stream still ends in order. A metadata change discarded ahead of its
    /// stream's end-of-stream packet moves onto that packet.
    pub fn purge(&mut self) -> PurgeSummary {
        let mut summary = PurgeSummary {
            dropped: self.packets.len(),
            ..PurgeSummary::default()
        };
        let mut kept = VecDeque::new();
        for mut packet in self.packets.drain(..) {
            summary.sri_changed |= packet.sri_changed;
            if packet.eos {
                packet.sri_changed |= summary.changed_streams.remove(&packet.stream_id);
                packet.data = P::default();
                kept.push_back(packet);
            } else if packet.sri_changed {
                summary.changed_streams.insert(packet.stream_id.clone());
            }
        }
        summary.kept_eos = kept.len();
        self.packets = kept;
        self.last_miss = None;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamio_core::{PrecisionTime, StreamSri};

    fn packet(stream_id: &str, value: u32) -> DataTransfer<Vec<u32>> {
        DataTransfer::new(
            vec![value],
            PrecisionTime::now(),
            false,
            stream_id,
            StreamSri::new(stream_id),
        )
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PacketQueue::new(10);
        for i in 0..5 {
            queue.push(packet("a", i));
        }
        let values: Vec<u32> = std::iter::from_fn(|| queue.pop(None)).map(|p| p.data[0]).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_and_ratio() {
        let mut queue = PacketQueue::new(2);
        assert!(!queue.is_full());
        queue.push(packet("a", 0));
        assert_eq!(queue.depth_ratio(), 0.5);
        queue.push(packet("a", 1));
        assert!(queue.is_full());
        assert_eq!(queue.depth_ratio(), 1.0);
    }

    #[test]
    fn test_zero_depth_is_always_full() {
        let queue: PacketQueue<Vec<u32>> = PacketQueue::new(0);
        assert!(queue.is_full());
        assert_eq!(queue.depth_ratio(), 0.0);
    }

    #[test]
    fn test_filtered_pop_finds_first_match() {
        let mut queue = PacketQueue::new(10);
        queue.push(packet("a", 0));
        queue.push(packet("b", 1));
        queue.push(packet("b", 2));
        let hit = queue.pop(Some("b")).unwrap();
        assert_eq!(hit.data, vec![1]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.stream_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_filtered_miss_skips_rescan_until_growth() {
        let mut queue = PacketQueue::new(10);
        queue.push(packet("a", 0));
        assert!(queue.pop(Some("b")).is_none());
        assert!(queue.scanned_without_match("b"));
        assert!(queue.pop(Some("b")).is_none());
        assert!(!queue.scanned_without_match("a"));

        queue.push(packet("b", 1));
        assert!(!queue.scanned_without_match("b"));
        let hit = queue.pop(Some("b")).unwrap();
        assert_eq!(hit.data, vec![1]);
        assert!(queue.last_miss.is_none());
    }

    #[test]
    fn test_miss_on_one_stream_does_not_hide_another() {
        let mut queue = PacketQueue::new(10);
        queue.push(packet("a", 0));
        assert!(queue.pop(Some("c")).is_none());
        assert_eq!(queue.pop(Some("a")).unwrap().data, vec![0]);
    }

    #[test]
    fn test_purge_collects_flags() {
        let mut queue = PacketQueue::new(3);
        let mut changed = packet("a", 0);
        changed.sri_changed = true;
        queue.push(changed);
        let mut end = packet("b", 1);
        end.eos = true;
        queue.push(end);
        queue.push(packet("a", 2));

        let summary = queue.purge();
        assert_eq!(summary.dropped, 3);
        assert!(summary.sri_changed);
        assert_eq!(summary.kept_eos, 1);
        assert_eq!(summary.changed_streams.into_iter().collect::<Vec<_>>(), vec!["a"]);
        let end = queue.pop(None).unwrap();
        assert_eq!(end.stream_id, "b");
        assert!(end.eos);
        assert!(end.data.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_purge_moves_change_onto_eos_of_same_stream() {
        let mut queue = PacketQueue::new(4);
        let mut changed = packet("a", 0);
        changed.sri_changed = true;
        queue.push(changed);
        queue.push(packet("b", 1));
        let mut end = packet("a", 2);
        end.eos = true;
        queue.push(end);

        let summary = queue.purge();
        assert!(summary.changed_streams.is_empty());
        let end = queue.pop(None).unwrap();
        assert!(end.sri_changed);
        assert_eq!(end.stream_id, "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_purge_empty_queue() {
        let mut queue: PacketQueue<Vec<u32>> = PacketQueue::new(3);
        assert_eq!(queue.purge(), PurgeSummary::default());
    }
}
