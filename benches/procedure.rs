use criterion::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use odegen::prelude::*;

fn exchange(sites: i64) -> EquationSet {
    let i = Index::new("i", 1, sites);
    let j = Index::new("j", 1, sites);
    let n_i = Expr::indexed("n", [i.clone()]);
    let n_j = Expr::indexed("n", [j.clone()]);
    EquationSet::from_pairs([(
        n_i.clone(),
        Expr::sum_distinct(j, [i], Expr::sym("J") * (n_j - n_i)),
    )])
    .unwrap()
}

fn build_exchange() {
    let eqs = exchange(64);
    black_box(build_procedure(&eqs, &[Expr::sym("J")], &Options::default()).unwrap());
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("build_exchange_64", |b| b.iter(|| build_exchange()));

    let checked =
        generate_procedure::<f64>(&exchange(64), &[Expr::sym("J")], &Options::default()).unwrap();
    let unchecked = generate_procedure::<f64>(
        &exchange(64),
        &[Expr::sym("J")],
        &Options::default().with_bounds_check(false),
    )
    .unwrap();
    let u: Vec<f64> = (0..64).map(|k| k as f64 / 64.0).collect();
    let mut du = vec![0.0; 64];

    c.bench_function("call_exchange_64", |b| {
        b.iter(|| checked.call(black_box(&mut du), black_box(&u), &[0.1], 0.0))
    });
    c.bench_function("call_exchange_64_unchecked", |b| {
        b.iter(|| unchecked.call(black_box(&mut du), black_box(&u), &[0.1], 0.0))
    });

    let batch = Array2::from_shape_fn((256, 64), |(r, k)| ((r + k) % 7) as f64);
    let mut out = Array2::zeros((256, 64));
    c.bench_function("call_batch_256x64", |b| {
        b.iter(|| checked.call_batch(black_box(&mut out), black_box(&batch), &[0.1], 0.0))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
