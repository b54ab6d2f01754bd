use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{Array, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use pca_projection::{fit, DataTable, ProjectionSession, SessionConfig};

fn generate_data(n_samples: usize, n_features: usize) -> Array2<f64> {
    Array::random((n_samples, n_features), Uniform::new(0., 10.))
}

// Covariance path (tall) and SVD path (wide)
fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");

    for &(n_samples, n_features) in [(100, 10), (1000, 50), (50, 400)].iter() {
        let data = generate_data(n_samples, n_features);
        group.throughput(Throughput::Elements((n_samples * n_features) as u64));
        group.bench_with_input(
            BenchmarkId::new("fit", format!("{}x{}", n_samples, n_features)),
            &data,
            |b, data_matrix| b.iter(|| fit(data_matrix.view(), Some(3)).unwrap()),
        );
    }
    group.finish();
}

fn bench_run_pca(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_pca");

    for &(n_samples, n_features) in [(500, 8), (5000, 20)].iter() {
        let data = generate_data(n_samples, n_features);
        let names: Vec<String> = (0..n_features).map(|j| format!("col{}", j)).collect();
        let table = DataTable::from_matrix(names.clone(), &data).unwrap();

        group.throughput(Throughput::Elements((n_samples * n_features) as u64));
        group.bench_with_input(
            BenchmarkId::new("run_pca", format!("{}x{}", n_samples, n_features)),
            &table,
            |b, table| {
                b.iter_with_setup(
                    || {
                        let mut session = ProjectionSession::with_source(table.clone(), SessionConfig::default());
                        session.load_data(names.clone(), None).unwrap();
                        session
                    },
                    |mut session| session.run_pca(2).unwrap(),
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_fit, bench_run_pca);
criterion_main!(benches);
