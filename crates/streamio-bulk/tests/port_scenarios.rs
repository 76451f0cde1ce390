//! Producer/consumer scenarios for the bulk input port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use streamio_bulk::InFloatPort;
use streamio_core::{InPortConfig, PrecisionTime, StreamSri, BLOCKING, NON_BLOCKING};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_blocking_stream_stalls_producer_at_depth() {
    let port = Arc::new(InFloatPort::new("dataFloat_in"));
    port.push_sri(StreamSri::new("A").with_blocking(true));

    let pushed = Arc::new(AtomicUsize::new(0));
    let producer = {
        let port = Arc::clone(&port);
        let pushed = Arc::clone(&pushed);
        thread::spawn(move || {
            for i in 0..101 {
                port.push_packet(vec![i as f32], PrecisionTime::now(), false, "A");
                pushed.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    assert!(wait_for(|| pushed.load(Ordering::SeqCst) == 100));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(pushed.load(Ordering::SeqCst), 100);
    assert_eq!(port.current_queue_depth(), 100);

    let first = port.get_packet(BLOCKING).unwrap();
    assert_eq!(first.data, vec![0.0]);
    assert!(wait_for(|| pushed.load(Ordering::SeqCst) == 101));
    producer.join().unwrap();

    let mut rest = Vec::new();
    while let Some(packet) = port.get_packet(NON_BLOCKING) {
        rest.push(packet.data[0]);
    }
    assert_eq!(rest.len(), 100);
    assert_eq!(&rest[98..], &[99.0, 100.0]);
}

#[test]
fn test_draining_one_admits_exactly_one() {
    let port = Arc::new(InFloatPort::with_config(
        "dataFloat_in",
        InPortConfig {
            max_queue_depth: 4,
            enable_stats: true,
        },
    ));
    port.push_sri(StreamSri::new("A").with_blocking(true));

    let pushed = Arc::new(AtomicUsize::new(0));
    let producer = {
        let port = Arc::clone(&port);
        let pushed = Arc::clone(&pushed);
        thread::spawn(move || {
            for i in 0..6 {
                port.push_packet(vec![i as f32], PrecisionTime::now(), false, "A");
                pushed.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    assert!(wait_for(|| pushed.load(Ordering::SeqCst) == 4));
    port.get_packet(NON_BLOCKING).unwrap();
    assert!(wait_for(|| pushed.load(Ordering::SeqCst) == 5));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(pushed.load(Ordering::SeqCst), 5);

    port.get_packet(NON_BLOCKING).unwrap();
    producer.join().unwrap();
    assert_eq!(port.current_queue_depth(), 4);
}

#[test]
fn test_stop_releases_blocked_producer() {
    let port = Arc::new(InFloatPort::with_config(
        "dataFloat_in",
        InPortConfig {
            max_queue_depth: 1,
            enable_stats: true,
        },
    ));
    port.push_sri(StreamSri::new("A").with_blocking(true));
    port.push_packet(vec![0.0], PrecisionTime::now(), false, "A");

    let producer = {
        let port = Arc::clone(&port);
        thread::spawn(move || port.push_packet(vec![1.0], PrecisionTime::now(), false, "A"))
    };
    thread::sleep(Duration::from_millis(30));
    port.stop_port();
    producer.join().unwrap();
    assert_eq!(port.current_queue_depth(), 2);
}

#[test]
fn test_non_blocking_overflow_delivers_only_newest() {
    let port = InFloatPort::with_config(
        "dataFloat_in",
        InPortConfig {
            max_queue_depth: 5,
            enable_stats: true,
        },
    );
    port.push_sri(StreamSri::new("live"));
    for i in 0..6 {
        port.push_packet(vec![i as f32], PrecisionTime::now(), false, "live");
    }
    let packet = port.get_packet(NON_BLOCKING).unwrap();
    assert_eq!(packet.data, vec![5.0]);
    assert!(packet.input_queue_flushed);
    assert!(packet.sri_changed);
    assert!(port.get_packet(NON_BLOCKING).is_none());
}

#[test]
fn test_eos_clears_active_sris() {
    let port = InFloatPort::new("dataFloat_in");
    port.push_sri(StreamSri::new("S"));
    port.push_packet(vec![1.0], PrecisionTime::now(), true, "S");
    assert_eq!(port.active_sris().len(), 1);
    let packet = port.get_packet(NON_BLOCKING).unwrap();
    assert!(packet.eos);
    assert!(port.active_sris().iter().all(|sri| sri.stream_id != "S"));
}

#[test]
fn test_indefinite_wait_returns_on_stop() {
    let port = Arc::new(InFloatPort::new("dataFloat_in"));
    let consumer = {
        let port = Arc::clone(&port);
        thread::spawn(move || {
            let start = Instant::now();
            (port.get_packet(BLOCKING), start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(50));
    port.stop_port();
    let (packet, elapsed) = consumer.join().unwrap();
    assert!(packet.is_none());
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(1));
}

#[test]
fn test_timed_wait_receives_late_packet() {
    let port = Arc::new(InFloatPort::new("dataFloat_in"));
    let producer = {
        let port = Arc::clone(&port);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            port.push_packet(vec![7.0], PrecisionTime::now(), false, "A");
        })
    };
    let packet = port.get_packet(1.0).unwrap();
    assert_eq!(packet.data, vec![7.0]);
    producer.join().unwrap();
}

#[test]
fn test_competing_consumers_receive_distinct_packets() {
    let port = Arc::new(InFloatPort::with_config(
        "dataFloat_in",
        InPortConfig {
            max_queue_depth: 1000,
            enable_stats: false,
        },
    ));
    for i in 0..400 {
        port.push_packet(vec![i as f32], PrecisionTime::now(), false, "A");
    }

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let port = Arc::clone(&port);
            thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(packet) = port.get_packet(0.05) {
                    got.push(packet.data[0] as u32);
                }
                got
            })
        })
        .collect();

    let mut all: Vec<u32> = consumers.into_iter().flat_map(|c| c.join().unwrap()).collect();
    all.sort_unstable();
    assert_eq!(all, (0..400).collect::<Vec<u32>>());
}
