//! Performance benchmarks for the hot paths of the relay

use server::connection_manager::ConnectionManager;
use server::spam::SpamPolicy;
use shared::{encode, FrameBuffer};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn unlimited_manager() -> ConnectionManager {
    ConnectionManager::new(
        SpamPolicy {
            window: Duration::from_secs(4),
            ceiling: u32::MAX,
        },
        1000,
    )
}

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Benchmarks frame encoding
#[test]
fn benchmark_encode() {
    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let _ = encode(&format!("Alice: message number {}", i));
    }

    let duration = start.elapsed();
    println!(
        "Encode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks reassembly of frames delivered in small, misaligned chunks
#[test]
fn benchmark_frame_reassembly() {
    let frames = 10_000;
    let stream: Vec<u8> = (0..frames)
        .flat_map(|i| encode(&format!("Bob: chunked message {}", i)))
        .collect();

    let start = Instant::now();
    let mut buffer = FrameBuffer::new();
    let mut decoded = 0;
    for chunk in stream.chunks(7) {
        decoded += buffer.push(chunk).len();
    }
    let duration = start.elapsed();

    println!(
        "Reassembly: {} frames from {} bytes in {:?}",
        decoded,
        stream.len(),
        duration
    );

    assert_eq!(decoded, frames);
    assert!(!buffer.has_partial_frame());
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks one long frame arriving over many reads
#[test]
fn benchmark_long_frame_reassembly() {
    let body = vec![b'a'; 1024 * 1024];

    let start = Instant::now();
    let mut buffer = FrameBuffer::new();
    for chunk in body.chunks(4096) {
        assert!(buffer.push(chunk).is_empty());
    }
    let frames = buffer.push(b"::EOMsg::");
    let duration = start.elapsed();

    println!(
        "Long frame reassembly: {} bytes in {} reads in {:?}",
        body.len(),
        body.len() / 4096,
        duration
    );

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), body.len());
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks fan-out of chat frames to many participants
#[test]
fn benchmark_relay_fan_out() {
    let mut manager = unlimited_manager();
    let now = Instant::now();

    let ids: Vec<_> = (0..100).map(|i| manager.accept(peer(40_000 + i))).collect();
    for (i, id) in ids.iter().enumerate() {
        manager.ingest(*id, vec![format!("user{}", i)], now);
    }

    let messages = 1_000;
    let start = Instant::now();
    for i in 0..messages {
        let sender = ids[i % ids.len()];
        manager.ingest(sender, vec![format!("user{}: hello {}", i % ids.len(), i)], now);
    }
    let duration = start.elapsed();

    println!(
        "Relay fan-out: {} messages to {} connections in {:?} ({:.2} μs/message)",
        messages,
        ids.len(),
        duration,
        duration.as_micros() as f64 / messages as f64
    );

    assert_eq!(manager.len(), ids.len());
    assert_eq!(manager.history().len(), ids.len() + messages);
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks history replay and flushing for a late joiner
#[test]
fn benchmark_history_replay() {
    let mut manager = unlimited_manager();
    let now = Instant::now();
    let author = manager.accept(peer(41_000));
    manager.ingest(author, vec!["Alice".into()], now);
    for i in 0..5_000 {
        manager.ingest(author, vec![format!("Alice: line {}", i)], now);
    }

    let start = Instant::now();
    let newcomer = manager.accept(peer(41_001));
    let mut wire = Vec::new();
    manager
        .get_mut(newcomer)
        .unwrap()
        .flush_into(&mut wire)
        .unwrap();
    let duration = start.elapsed();

    println!(
        "History replay: {} messages ({} bytes) in {:?}",
        manager.history().len(),
        wire.len(),
        duration
    );

    assert!(!manager.get(newcomer).unwrap().has_pending_output());
    assert!(duration.as_millis() < 2000);
}
