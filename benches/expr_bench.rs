use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use matexpr::{
    add, evaluate_with_config, mult, schur, BlockShape, DenseMatrix, EvalConfig, MatExpr,
};

fn random_matrix(rng: &mut StdRng, n: usize) -> DenseMatrix<f64> {
    DenseMatrix::from_fn(n, n, |_, _| rng.sample(StandardNormal))
}

fn serial_cfg() -> EvalConfig {
    EvalConfig {
        worker_pool_size: 0,
        parallel_threshold: 1 << 15,
        block_shape: BlockShape::default(),
    }
}

fn parallel_cfg() -> EvalConfig {
    EvalConfig {
        worker_pool_size: 8,
        parallel_threshold: 1 << 12,
        block_shape: BlockShape::default(),
    }
}

fn bench_fused_elementwise_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("fused_elementwise_chain");
    let mut rng = StdRng::seed_from_u64(1);

    for &n in &[128usize, 512, 1024] {
        let a = random_matrix(&mut rng, n);
        let b = random_matrix(&mut rng, n);
        let d = random_matrix(&mut rng, n);
        let mut out = DenseMatrix::zeros(n, n);

        group.bench_with_input(BenchmarkId::new("serial", n), &n, |bencher, _| {
            let cfg = serial_cfg();
            bencher.iter(|| {
                // (A + B) ⊙ D in one pass.
                let e = schur(
                    add(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap(),
                    MatExpr::dense(&d),
                )
                .unwrap();
                evaluate_with_config(&e, &mut out, &cfg).unwrap();
                black_box(out.get(0, 0));
            });
        });

        group.bench_with_input(BenchmarkId::new("parallel", n), &n, |bencher, _| {
            let cfg = parallel_cfg();
            bencher.iter(|| {
                let e = schur(
                    add(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap(),
                    MatExpr::dense(&d),
                )
                .unwrap();
                evaluate_with_config(&e, &mut out, &cfg).unwrap();
                black_box(out.get(0, 0));
            });
        });
    }
    group.finish();
}

fn bench_blocked_multiply(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocked_multiply");
    group.sample_size(10);
    let mut rng = StdRng::seed_from_u64(2);

    for &n in &[128usize, 384] {
        let a = random_matrix(&mut rng, n);
        let b = random_matrix(&mut rng, n);
        let mut out = DenseMatrix::zeros(n, n);

        group.bench_with_input(BenchmarkId::new("serial", n), &n, |bencher, _| {
            let cfg = serial_cfg();
            bencher.iter(|| {
                let e = mult(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap();
                evaluate_with_config(&e, &mut out, &cfg).unwrap();
                black_box(out.get(0, 0));
            });
        });

        group.bench_with_input(BenchmarkId::new("parallel", n), &n, |bencher, _| {
            let cfg = parallel_cfg();
            bencher.iter(|| {
                let e = mult(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap();
                evaluate_with_config(&e, &mut out, &cfg).unwrap();
                black_box(out.get(0, 0));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fused_elementwise_chain, bench_blocked_multiply);
criterion_main!(benches);
