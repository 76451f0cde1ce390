//! Payload size accounting for input port statistics.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A payload that can report its length in elements.
///
/// `Default` is the empty payload left on end-of-stream packets that
/// survive an overflow flush.
pub trait PayloadLength: Default {
    /// Width of one element in bits, used for bit-rate statistics.
    const BITS_PER_ELEMENT: usize;

    /// Number of elements carried by the payload.
    fn payload_len(&self) -> usize;
}

impl<T> PayloadLength for Vec<T> {
    const BITS_PER_ELEMENT: usize = std::mem::size_of::<T>() * 8;

    fn payload_len(&self) -> usize {
        self.len()
    }
}

impl PayloadLength for String {
    const BITS_PER_ELEMENT: usize = 8;

    fn payload_len(&self) -> usize {
        self.len()
    }
}

impl PayloadLength for Bytes {
    const BITS_PER_ELEMENT: usize = 8;

    fn payload_len(&self) -> usize {
        self.len()
    }
}

/// How a port measures the size of each pushed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeAccounting {
    /// Element count (byte length for string and blob payloads).
    #[default]
    PayloadLength,
    /// Every payload counts as a single unit regardless of content.
    Unit,
}

impl SizeAccounting {
    /// Measures `payload` according to this strategy.
    pub fn measure<P: PayloadLength>(self, payload: &P) -> usize {
        match self {
            SizeAccounting::PayloadLength => payload.payload_len(),
            SizeAccounting::Unit => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_length_and_width() {
        let data: Vec<f32> = vec![0.0; 12];
        assert_eq!(data.payload_len(), 12);
        assert_eq!(<Vec<f32> as PayloadLength>::BITS_PER_ELEMENT, 32);
        assert_eq!(<Vec<i16> as PayloadLength>::BITS_PER_ELEMENT, 16);
    }

    #[test]
    fn test_string_measures_bytes() {
        let url = String::from("file:///tmp/capture.dat");
        assert_eq!(SizeAccounting::PayloadLength.measure(&url), url.len());
    }

    #[test]
    fn test_unit_accounting_ignores_content() {
        let xml = String::from("<doc><a/><b/></doc>");
        assert_eq!(SizeAccounting::Unit.measure(&xml), 1);
        assert_eq!(SizeAccounting::Unit.measure(&String::new()), 1);
    }

    #[test]
    fn test_bytes_length() {
        let blob = Bytes::from_static(b"\x00\x01\x02");
        assert_eq!(blob.payload_len(), 3);
    }
}
