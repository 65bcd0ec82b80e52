//! Criterion benchmark for SharedBuffer
//!
//! Run with: cargo bench

use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tailbuf::{CancelToken, SharedBuffer};

const LINE: &[u8] = b"2024-01-01T00:00:00Z INFO job step finished in 12ms\n";

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_buffer");
    group.throughput(Throughput::Bytes(LINE.len() as u64));

    group.bench_function("write", |b| {
        let buffer = SharedBuffer::new();
        b.iter(|| buffer.write(black_box(LINE)).unwrap());
    });

    // Reading history that is already buffered never blocks
    group.bench_function("replay_read", |b| {
        let buffer = SharedBuffer::new();
        for _ in 0..10_000 {
            buffer.write(LINE).unwrap();
        }
        buffer.close().unwrap();

        let mut out = vec![0u8; LINE.len()];
        let mut cursor = buffer.new_reader(CancelToken::new(), 0);
        b.iter(|| {
            let chunk = cursor.read_chunk(black_box(&mut out)).unwrap();
            if chunk.end_of_stream {
                cursor = buffer.new_reader(CancelToken::new(), 0);
            }
        });
    });

    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    const WRITES: usize = 1000;

    for readers in [1usize, 4, 16].iter() {
        group.throughput(Throughput::Bytes((WRITES * LINE.len() * readers) as u64));
        group.bench_function(format!("readers_{}", readers), |b| {
            b.iter(|| {
                let buffer = SharedBuffer::new();
                let handles: Vec<_> = (0..*readers)
                    .map(|_| {
                        let mut cursor = buffer.new_reader(CancelToken::new(), 0);
                        thread::spawn(move || {
                            let mut out = [0u8; 4096];
                            let mut total = 0usize;
                            loop {
                                let chunk = cursor.read_chunk(&mut out).unwrap();
                                total += chunk.len;
                                if chunk.end_of_stream {
                                    return total;
                                }
                            }
                        })
                    })
                    .collect();

                for _ in 0..WRITES {
                    buffer.write(LINE).unwrap();
                }
                buffer.close().unwrap();

                for handle in handles {
                    black_box(handle.join().unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_fanout);
criterion_main!(benches);
