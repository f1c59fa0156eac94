//! Health gate and key derivation benchmarks.
//!
//! Measures the RCT/AP gate and HKDF conditioning across input sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qrng_gate::analysis::{adaptive_proportion_test, repetition_count_test, HealthCutoffs};
use qrng_gate::capture::{BitSource, SeededBitSource};
use qrng_gate::conditioning::{derive_key, INFO_DEFAULT};
use qrng_gate::{BitString, HealthGate};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

fn sample(num_bits: usize) -> BitString {
    SeededBitSource::new(7)
        .sample(num_bits, num_bits * 2)
        .map(|s| s.bits)
        .unwrap_or_default()
}

/// Benchmark the individual health tests.
fn bench_health_tests(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate/tests");
    let cutoffs = HealthCutoffs::from_min_entropy(0.8);

    for num_bits in [1024usize, 8192, 65536] {
        let bits = sample(num_bits);
        group.throughput(Throughput::Elements(num_bits as u64));

        group.bench_with_input(BenchmarkId::new("rct", num_bits), &bits, |b, bits| {
            b.iter(|| repetition_count_test(black_box(bits), cutoffs.rct_cutoff));
        });
        group.bench_with_input(BenchmarkId::new("ap", num_bits), &bits, |b, bits| {
            b.iter(|| adaptive_proportion_test(black_box(bits), cutoffs.ap_window, cutoffs.ap_cutoff));
        });
    }

    group.finish();
}

/// Benchmark gate admission followed by key derivation.
fn bench_admit_and_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate/derive");
    let mut rng = ChaCha20Rng::seed_from_u64(1);

    for out_len in [32usize, 256, 4096] {
        let bits = sample(4096);
        let mut gate = HealthGate::new();

        group.bench_with_input(BenchmarkId::from_parameter(out_len), &out_len, |b, &out_len| {
            b.iter(|| {
                let vetted = gate.admit(&bits, 0.8).ok()?;
                derive_key(vetted, out_len, None, INFO_DEFAULT, &mut rng).ok()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_health_tests, bench_admit_and_derive);
criterion_main!(benches);
