// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use chanmux_core::{copy_ring_to_ring, RingBuf};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_ring_push_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_push_drain");
    for &size in &[64usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}_bytes"), |b| {
            let payload = vec![0xabu8; size];
            let mut rb = RingBuf::with_capacity(size * 2);
            let mut out = vec![0u8; size];
            b.iter(|| {
                rb.push_segments(&[&payload]).unwrap();
                rb.copy_out(&mut out).unwrap();
                rb.note_removed(size);
                black_box(&out);
            });
        });
    }
    group.finish();
}

fn bench_copy_ring_to_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_ring_to_ring");
    for &size in &[64usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}_bytes"), |b| {
            let payload = vec![0xcdu8; size];
            let mut src = RingBuf::with_capacity(size * 2);
            let mut dst = RingBuf::with_capacity(size * 2);
            let mut out = vec![0u8; size];
            b.iter(|| {
                src.push_segments(&[&payload]).unwrap();
                copy_ring_to_ring(&mut src, &mut dst, size).unwrap();
                dst.copy_out(&mut out).unwrap();
                dst.note_removed(size);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ring_push_drain, bench_copy_ring_to_ring);
criterion_main!(benches);
