//! Burst data types.

use streamio_core::{BurstSri, PrecisionTime};

/// A pre-batched array of samples with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Burst<T> {
    /// Burst metadata.
    pub sri: BurstSri,
    /// Sample data; complex data is interleaved real/imaginary.
    pub data: Vec<T>,
    /// End-of-stream marker.
    pub eos: bool,
    /// Time of the first sample.
    pub timestamp: PrecisionTime,
}

impl<T> Burst<T> {
    /// Creates a burst.
    pub fn new(sri: BurstSri, data: Vec<T>, timestamp: PrecisionTime, eos: bool) -> Self {
        Self {
            sri,
            data,
            eos,
            timestamp,
        }
    }

    /// Stream this burst belongs to.
    pub fn stream_id(&self) -> &str {
        &self.sri.stream_id
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true when the burst carries no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the sample data in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }
}

/// A burst taken from an input port.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstPacket<T> {
    /// The burst.
    pub burst: Burst<T>,
    /// A producer blocked on the queue since the previous burst was taken.
    pub block_occurred: bool,
}

impl<T> BurstPacket<T> {
    /// Stream this burst belongs to.
    pub fn stream_id(&self) -> &str {
        self.burst.stream_id()
    }

    /// Sample data.
    pub fn data(&self) -> &[T] {
        &self.burst.data
    }

    /// End-of-stream marker.
    pub fn eos(&self) -> bool {
        self.burst.eos
    }

    /// Returns true for complex sample data.
    pub fn is_complex(&self) -> bool {
        self.burst.sri.is_complex()
    }

    /// Unwraps the burst.
    pub fn into_burst(self) -> Burst<T> {
        self.burst
    }
}

/// Total elements across `bursts`.
pub fn element_count<T>(bursts: &[Burst<T>]) -> usize {
    bursts.iter().map(Burst::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_scales_with_element_width() {
        let sri = BurstSri::new("s");
        let floats = Burst::new(sri.clone(), vec![0f32; 10], PrecisionTime::now(), false);
        let doubles = Burst::new(sri, vec![0f64; 10], PrecisionTime::now(), false);
        assert_eq!(floats.byte_size(), 40);
        assert_eq!(doubles.byte_size(), 80);
    }

    #[test]
    fn test_element_count() {
        let sri = BurstSri::new("s");
        let bursts = vec![
            Burst::new(sri.clone(), vec![1u8; 3], PrecisionTime::now(), false),
            Burst::new(sri, vec![1u8; 5], PrecisionTime::now(), true),
        ];
        assert_eq!(element_count(&bursts), 8);
        assert_eq!(bursts[0].stream_id(), "s");
    }
}
