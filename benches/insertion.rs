use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tessera::{IncrementalTin, Vertex};

fn gen_points(n: usize, rng: &mut SmallRng) -> Vec<Vertex> {
  (0..n)
    .map(|i| Vertex::with_id(rng.gen::<f64>() * 100.0, rng.gen::<f64>() * 100.0, 0.0, i))
    .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
  let mut rng = SmallRng::seed_from_u64(1848);
  for &n in [1_000usize, 10_000].iter() {
    let points = gen_points(n, &mut rng);
    c.bench_function(&format!("insert({})", n), |b| {
      b.iter_batched(
        || points.clone(),
        |points| {
          let mut tin = IncrementalTin::new(100.0 / (n as f64).sqrt());
          tin.add_all(points, None).unwrap();
          tin
        },
        BatchSize::SmallInput,
      )
    });
  }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
