//! Fan-out stress test - one producer, many concurrent tailing cursors
//!
//! Every cursor must observe exactly the producer's byte sequence from its
//! start offset, whatever the interleaving of writes, reads and close.
//!
//! Usage:
//!   cargo test --release --test fanout_stress_test -- --nocapture

use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rstest::rstest;
use tailbuf::{CancelCause, CancelToken, Chunk, Error, SharedBuffer};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Deterministic payload for write number `seq`: varying lengths, content
/// that makes reordering or duplication visible.
fn payload(seq: u64) -> Vec<u8> {
    let mut hash = seq;
    for _ in 0..4 {
        hash = hash.wrapping_mul(6364136223846793005).wrapping_add(1);
    }
    let len = 1 + (hash % 97) as usize;
    format!("[{seq}:{}]", "x".repeat(len)).into_bytes()
}

fn expected_history(writes: u64) -> Vec<u8> {
    (0..writes).flat_map(payload).collect()
}

/// Reads with `chunk_size` until end-of-stream, checking every chunk.
fn drain(buffer: &SharedBuffer, token: CancelToken, start: usize, chunk_size: usize) -> Vec<u8> {
    let mut cursor = buffer.new_reader(token, start);
    let mut out = vec![0u8; chunk_size];
    let mut collected = Vec::new();

    loop {
        let Chunk { len, end_of_stream } = cursor.read_chunk(&mut out).unwrap();
        assert!(len <= chunk_size);
        collected.extend_from_slice(&out[..len]);
        if end_of_stream {
            assert_eq!(cursor.position(), start.max(buffer.len()));
            return collected;
        }
        assert!(len > 0, "a read that is not the end always returns bytes");
    }
}

#[rstest]
#[case::single_bytes(16, 1)]
#[case::small_chunks(16, 7)]
#[case::large_chunks(64, 4096)]
fn test_many_readers_see_exact_history(#[case] readers: usize, #[case] chunk_size: usize) {
    const WRITES: u64 = 500;

    let buffer = SharedBuffer::new();
    let token = CancelToken::new();
    let start = Arc::new(Barrier::new(readers + 1));
    let (tx, rx) = mpsc::channel();

    for reader in 0..readers {
        let buffer = buffer.clone();
        let token = token.clone();
        let start = Arc::clone(&start);
        let tx = tx.clone();
        thread::spawn(move || {
            start.wait();
            let collected = drain(&buffer, token, 0, chunk_size);
            tx.send((reader, collected)).unwrap();
        });
    }
    drop(tx);

    start.wait();
    let producer_start = Instant::now();
    for seq in 0..WRITES {
        let bytes = payload(seq);
        assert_eq!(buffer.write(&bytes).unwrap(), bytes.len());
        if seq % 50 == 0 {
            thread::yield_now();
        }
    }
    buffer.close().unwrap();
    let produced_in = producer_start.elapsed();

    let expected = expected_history(WRITES);
    let deadline = Instant::now() + TIMEOUT;
    let mut finished = 0;
    while finished < readers {
        let (reader, collected) = rx
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .expect("reader timed out");
        assert_eq!(collected.len(), expected.len(), "reader {reader} length");
        assert!(collected == expected, "reader {reader} content");
        finished += 1;
    }

    println!(
        "{readers} readers x {} bytes, chunk {chunk_size}: producer took {:?}",
        expected.len(),
        produced_in
    );
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(333)]
fn test_readers_joining_mid_stream(#[case] offset: usize) {
    const WRITES: u64 = 200;

    let buffer = SharedBuffer::new();
    let (tx, rx) = mpsc::channel();

    for seq in 0..WRITES {
        buffer.write(&payload(seq)).unwrap();

        // A new reader joins every 40 writes, all starting from `offset`
        if seq % 40 == 0 {
            let buffer = buffer.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                tx.send(drain(&buffer, CancelToken::new(), offset, 13)).unwrap();
            });
        }
    }
    drop(tx);
    buffer.close().unwrap();

    let expected = expected_history(WRITES);
    let expected = &expected[offset.min(expected.len())..];
    for _ in 0..WRITES / 40 {
        let collected = rx.recv_timeout(TIMEOUT).expect("reader timed out");
        assert!(collected == expected);
    }
}

#[test]
fn test_cancelling_one_reader_leaves_others() {
    let buffer = SharedBuffer::new();
    let parent = CancelToken::new();
    let doomed = parent.child_token();

    let (tx, rx) = mpsc::channel();
    for (name, token) in [("doomed", doomed.clone()), ("survivor", parent.child_token())] {
        let buffer = buffer.clone();
        let tx = tx.clone();
        thread::spawn(move || {
            let mut cursor = buffer.new_reader(token, 0);
            let mut out = [0u8; 64];
            tx.send((name, cursor.read_chunk(&mut out), out)).unwrap();
        });
    }
    drop(tx);

    thread::sleep(Duration::from_millis(20));
    doomed.cancel();

    let (name, result, _) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(name, "doomed");
    assert_eq!(result, Err(Error::Cancelled(CancelCause::Cancelled)));
    assert!(rx.try_recv().is_err(), "survivor must still be blocked");

    buffer.write(b"still here").unwrap();
    let (name, result, out) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(name, "survivor");
    let chunk = result.unwrap();
    assert_eq!(&out[..chunk.len], b"still here");
    assert!(!parent.is_cancelled());
}

#[test]
fn test_parent_cancel_releases_all_blocked_readers() {
    const READERS: usize = 32;

    let buffer = SharedBuffer::new();
    let parent = CancelToken::new();
    let (tx, rx) = mpsc::channel();

    for _ in 0..READERS {
        let mut cursor = buffer.new_reader(parent.child_token(), 0);
        let tx = tx.clone();
        thread::spawn(move || {
            let mut out = [0u8; 8];
            tx.send(cursor.read_chunk(&mut out)).unwrap();
        });
    }
    drop(tx);

    thread::sleep(Duration::from_millis(20));
    let cancelled_at = Instant::now();
    parent.cancel();

    for _ in 0..READERS {
        let result = rx.recv_timeout(TIMEOUT).expect("reader stayed blocked");
        assert_eq!(result, Err(Error::Cancelled(CancelCause::Cancelled)));
    }
    println!("released {READERS} readers in {:?}", cancelled_at.elapsed());

    // The buffer itself is untouched
    assert!(!buffer.is_closed());
    assert_eq!(buffer.write(b"ok").unwrap(), 2);
}

#[test]
fn test_close_releases_all_blocked_readers() {
    const READERS: usize = 32;

    let buffer = SharedBuffer::new();
    buffer.write(b"history").unwrap();
    let (tx, rx) = mpsc::channel();

    for _ in 0..READERS {
        let mut cursor = buffer.new_reader(CancelToken::new(), 7);
        let tx = tx.clone();
        thread::spawn(move || {
            let mut out = [0u8; 8];
            tx.send(cursor.read_chunk(&mut out)).unwrap();
        });
    }
    drop(tx);

    thread::sleep(Duration::from_millis(20));
    buffer.close().unwrap();

    for _ in 0..READERS {
        let result = rx.recv_timeout(TIMEOUT).expect("reader stayed blocked");
        assert_eq!(
            result,
            Ok(Chunk {
                len: 0,
                end_of_stream: true
            })
        );
    }
}
