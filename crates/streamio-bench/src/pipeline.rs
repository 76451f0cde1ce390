//! Producer/consumer workloads driven through the ports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use serde::Serialize;
use streamio_bulk::InFloatPort;
use streamio_burst::{BurstFloatInPort, BurstFloatOutPort, ConnectionStatistics, LocalTransport};
use streamio_core::{BurstSri, PortStatistics, StreamSri, BLOCKING};
use tracing::{debug, info};

use crate::config::BenchConfig;

// Poll interval for the bulk consumer once the producer may have finished.
const BULK_POLL_SECS: f64 = 0.05;

/// Outcome of the burst pipeline run.
#[derive(Debug, Serialize)]
pub struct BurstReport {
    pub bursts_sent: usize,
    pub bursts_received: usize,
    pub elements_received: usize,
    pub elapsed_secs: f64,
    pub bursts_per_second: f64,
    pub receiver: PortStatistics,
    pub connections: Vec<ConnectionStatistics>,
}

/// Outcome of the bulk producer/consumer run.
#[derive(Debug, Serialize)]
pub struct BulkReport {
    pub packets_sent: usize,
    pub packets_received: usize,
    pub elements_received: usize,
    pub flushes_observed: usize,
    pub elapsed_secs: f64,
    pub port: PortStatistics,
}

fn stream_name(index: usize) -> String {
    format!("stream-{index}")
}

fn rate(count: usize, secs: f64) -> f64 {
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Producer -> output port -> local transport -> burst input port -> consumer.
pub fn run_bursts(config: &BenchConfig) -> Result<BurstReport> {
    let receiver = Arc::new(BurstFloatInPort::with_config("burstFloat_in", config.burst_in.clone())?);
    let sender = BurstFloatOutPort::with_config("burstFloat_out", config.out_port.clone())?;
    sender.add_connection("local", Arc::new(LocalTransport::new(Arc::clone(&receiver))))?;
    receiver.start();
    sender.start();

    let streams = config.streams;
    let consumer = {
        let receiver = Arc::clone(&receiver);
        thread::spawn(move || {
            let (mut bursts, mut elements, mut ended) = (0usize, 0usize, 0usize);
            while ended < streams {
                let batch = receiver.get_bursts(BLOCKING);
                if batch.is_empty() {
                    break;
                }
                bursts += batch.len();
                elements += batch.iter().map(|b| b.len()).sum::<usize>();
                ended += batch.iter().filter(|b| b.eos).count();
            }
            (bursts, elements)
        })
    };

    let begin = Instant::now();
    let sris: Vec<BurstSri> = (0..streams).map(|i| BurstSri::new(stream_name(i))).collect();
    for seq in 0..config.bursts_per_stream {
        let eos = seq + 1 == config.bursts_per_stream;
        for sri in &sris {
            sender.push_burst_now(vec![seq as f32; config.burst_len], sri.clone(), eos);
        }
    }
    if config.bursts_per_stream == 0 {
        for sri in &sris {
            sender.push_burst_now(Vec::new(), sri.clone(), true);
        }
    }
    sender.flush();
    debug!(streams, "burst producer finished");

    let joined = consumer.join();
    let elapsed_secs = begin.elapsed().as_secs_f64();
    sender.stop();
    receiver.stop();
    let (bursts_received, elements_received) = joined.map_err(|_| anyhow!("burst consumer panicked"))?;

    let bursts_sent = streams * config.bursts_per_stream.max(1);
    info!(bursts_sent, bursts_received, elapsed_secs, "burst pipeline complete");
    Ok(BurstReport {
        bursts_sent,
        bursts_received,
        elements_received,
        elapsed_secs,
        bursts_per_second: rate(bursts_received, elapsed_secs),
        receiver: receiver.statistics(),
        connections: sender.statistics(),
    })
}

/// Producer thread pushing packets into a bulk input port drained by this
/// thread.
pub fn run_bulk(config: &BenchConfig) -> Result<BulkReport> {
    let port = Arc::new(InFloatPort::with_config("dataFloat_in", config.bulk_in.clone()));
    for i in 0..config.streams {
        port.push_sri(StreamSri::new(stream_name(i)).with_blocking(config.blocking));
    }

    let done = Arc::new(AtomicBool::new(false));
    let producer = {
        let port = Arc::clone(&port);
        let done = Arc::clone(&done);
        let (streams, packets, len) = (config.streams, config.packets_per_stream, config.packet_len);
        thread::spawn(move || {
            let names: Vec<String> = (0..streams).map(stream_name).collect();
            for seq in 0..packets {
                let eos = seq + 1 == packets;
                for name in &names {
                    port.push_packet(vec![seq as f32; len], streamio_core::PrecisionTime::now(), eos, name);
                }
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let begin = Instant::now();
    let (mut packets_received, mut elements_received, mut flushes_observed, mut ended) = (0, 0, 0, 0);
    while ended < config.streams {
        match port.get_packet(BULK_POLL_SECS) {
            Some(packet) => {
                packets_received += 1;
                elements_received += packet.data.len();
                if packet.input_queue_flushed {
                    flushes_observed += 1;
                }
                if packet.eos {
                    ended += 1;
                }
            }
            None if done.load(Ordering::SeqCst) && port.current_queue_depth() == 0 => break,
            None => {}
        }
    }
    let elapsed_secs = begin.elapsed().as_secs_f64();
    port.stop_port();
    producer.join().map_err(|_| anyhow!("bulk producer panicked"))?;

    let packets_sent = config.streams * config.packets_per_stream;
    info!(packets_sent, packets_received, flushes_observed, "bulk run complete");
    Ok(BulkReport {
        packets_sent,
        packets_received,
        elements_received,
        flushes_observed,
        elapsed_secs,
        port: port.statistics(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> BenchConfig {
        BenchConfig {
            streams: 2,
            bursts_per_stream: 50,
            burst_len: 8,
            packets_per_stream: 50,
            packet_len: 4,
            ..BenchConfig::default()
        }
    }

    #[test]
    fn test_burst_run_delivers_everything() {
        let mut config = small();
        config.out_port.max_bursts = 7;
        config.burst_in.queue_threshold = 5;
        let report = run_bursts(&config).unwrap();
        assert_eq!(report.bursts_sent, 100);
        assert_eq!(report.bursts_received, 100);
        assert_eq!(report.elements_received, 800);
        assert_eq!(report.connections.len(), 1);
    }

    #[test]
    fn test_blocking_bulk_run_is_lossless() {
        let mut config = small();
        config.bulk_in.max_queue_depth = 3;
        let report = run_bulk(&config).unwrap();
        assert_eq!(report.packets_received, 100);
        assert_eq!(report.flushes_observed, 0);
    }

    #[test]
    fn test_zero_depth_bulk_run_terminates() {
        let mut config = small();
        config.blocking = false;
        config.bulk_in.max_queue_depth = 0;
        let report = run_bulk(&config).unwrap();
        assert_eq!(report.packets_received, 0);
    }

    #[test]
    fn test_report_serializes() {
        let report = run_bursts(&BenchConfig {
            streams: 1,
            bursts_per_stream: 3,
            ..BenchConfig::default()
        })
        .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["bursts_received"], 3);
    }
}
