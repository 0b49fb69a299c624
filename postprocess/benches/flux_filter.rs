use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use postprocess::pool::WorkerPool;
use postprocess::{filter_curve, CurvePair, FluxFilterConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_curves(count: usize, epochs: usize) -> Vec<CurvePair> {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    (0..count)
        .map(|_| {
            let phi: Vec<f64> = (0..epochs).map(|_| rng.random_range(0.5..1.5)).collect();
            let mut psi: Vec<f64> = phi.iter().map(|p| p * rng.random_range(2.0..8.0)).collect();
            if rng.random_bool(0.2) {
                let spike = rng.random_range(0..epochs);
                psi[spike] *= 30.0;
            }
            CurvePair::new(psi, phi)
        })
        .collect()
}

fn bench_single_curve(c: &mut Criterion) {
    let config = FluxFilterConfig::default();
    let mut group = c.benchmark_group("filter_curve");
    for epochs in [20, 100, 500] {
        let curve = random_curves(1, epochs).remove(0);
        group.bench_with_input(BenchmarkId::from_parameter(epochs), &curve, |b, curve| {
            b.iter(|| filter_curve(0, black_box(curve), &config))
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let config = FluxFilterConfig::default();
    let curves = random_curves(20_000, 40);
    let mut group = c.benchmark_group("fan_out");
    group.sample_size(20);
    for threads in [1, 4, num_cpus::get()] {
        let pool = WorkerPool::new(Some(threads)).expect("worker pool");
        group.bench_with_input(BenchmarkId::from_parameter(threads), &curves, |b, curves| {
            b.iter(|| pool.map_by_ordinal(curves, |ordinal, curve| filter_curve(ordinal, curve, &config)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_curve, bench_fan_out);
criterion_main!(benches);
