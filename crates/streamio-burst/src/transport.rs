//! Delivery boundary between an output port and its receivers.

use std::sync::Arc;

use crate::burst::Burst;
use crate::error::Result;
use crate::in_port::BurstInPort;

/// A receiver of burst batches.
///
/// Implementations report oversized batches with
/// [`crate::error::TransportError::MessageTooLarge`] so the output port can
/// split them; every other error marks the connection dead.
pub trait BurstTransport<T>: Send + Sync {
    /// Delivers one batch.
    fn push_bursts(&self, bursts: &[Burst<T>]) -> Result<()>;

    /// Human-readable description of the receiving end.
    fn describe(&self) -> String {
        "remote".to_string()
    }
}

/// In-process delivery straight into a [`BurstInPort`].
///
/// Each delivery copies the batch, so one output port can feed several
/// local receivers.
pub struct LocalTransport<T> {
    port: Arc<BurstInPort<T>>,
}

impl<T> LocalTransport<T> {
    /// Wraps a local input port.
    pub fn new(port: Arc<BurstInPort<T>>) -> Self {
        Self { port }
    }

    /// The wrapped input port.
    pub fn port(&self) -> &Arc<BurstInPort<T>> {
        &self.port
    }
}

impl<T: Clone + Send + Sync> BurstTransport<T> for LocalTransport<T> {
    fn push_bursts(&self, bursts: &[Burst<T>]) -> Result<()> {
        self.port.push_bursts(bursts.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("local:{}", self.port.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamio_core::{BurstSri, PrecisionTime};

    #[test]
    fn test_local_transport_delivers_copy() {
        let port = Arc::new(BurstInPort::<f32>::new("burstFloat_in"));
        port.start();
        let transport = LocalTransport::new(Arc::clone(&port));
        let bursts = vec![Burst::new(BurstSri::new("s"), vec![1.0, 2.0], PrecisionTime::now(), false)];
        transport.push_bursts(&bursts).unwrap();
        assert_eq!(bursts.len(), 1);
        assert_eq!(port.queue_depth(), 1);
        assert_eq!(transport.describe(), "local:burstFloat_in");
    }
}
