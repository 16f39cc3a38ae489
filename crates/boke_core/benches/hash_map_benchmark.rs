//! # String-Hash Map Benchmark
//!
//! Measures insert (including rebuilds), hit lookups, and erase with
//! backward shifting against `std::collections::HashMap`.

#![allow(missing_docs)]

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use boke_core::{Arena, StrHash, StrHashMap};

const BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Deterministic pseudo-random 64-bit keys.
fn generate_keys(count: usize, seed: u64) -> Vec<StrHash> {
    let mut keys = Vec::with_capacity(count);
    let mut state = seed;

    for _ in 0..count {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        keys.push(StrHash::new(state));
    }

    keys
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("str_hash_map_insert");

    for count in [1_000usize, 10_000] {
        let keys = generate_keys(count, 0xDEAD_BEEF);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let arena = Arena::new(&mut buffer).expect("arena");

        group.bench_with_input(BenchmarkId::new("presized", count), &keys, |b, keys| {
            b.iter(|| {
                let mut map = StrHashMap::with_capacity(&arena, keys.len() as u32 * 2).expect("map");
                for (i, &key) in keys.iter().enumerate() {
                    map.insert(key, i as u32).expect("insert");
                }
                black_box(map.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("std_hash_map", count), &keys, |b, keys| {
            b.iter(|| {
                let mut map = HashMap::with_capacity(keys.len());
                for (i, &key) in keys.iter().enumerate() {
                    map.insert(key, i as u32);
                }
                black_box(map.len())
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let keys = generate_keys(10_000, 0x1234_5678);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let arena = Arena::new(&mut buffer).expect("arena");
    let mut map = StrHashMap::with_capacity(&arena, 20_000).expect("map");
    for (i, &key) in keys.iter().enumerate() {
        map.insert(key, i as u32).expect("insert");
    }

    c.bench_function("str_hash_map_get_hit_10k", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &key in &keys {
                if let Some(&value) = map.get(black_box(key)) {
                    sum += u64::from(value);
                }
            }
            black_box(sum)
        });
    });
}

fn bench_erase(c: &mut Criterion) {
    let keys = generate_keys(10_000, 0xCAFE_F00D);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let arena = Arena::new(&mut buffer).expect("arena");

    c.bench_function("str_hash_map_fill_then_erase_10k", |b| {
        b.iter(|| {
            let mut map = StrHashMap::with_capacity(&arena, 20_000).expect("map");
            for &key in &keys {
                map.insert(key, ()).expect("insert");
            }
            for &key in &keys {
                black_box(map.erase(key));
            }
            black_box(map.len())
        });
    });
}

criterion_group!(benches, bench_insert, bench_lookup, bench_erase);
criterion_main!(benches);
