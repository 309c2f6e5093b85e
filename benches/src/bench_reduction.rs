use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use he::traits::HomomorphicEngine;
use he::{SimEngine, SimParams, encode};
use matcher::{KeyMaterial, MatchConfig, MaxReducer, StreamingMax, preflight};
use rand::rngs::{StdRng, SysRng};
use rand::{RngExt, SeedableRng};
use std::hint::black_box;

const SCORES: usize = 256;

fn bench_reduction(c: &mut Criterion) {
    let mut rng = StdRng::try_from_rng(&mut SysRng).unwrap();
    let mut group = c.benchmark_group("Approximate max");

    for batch_size in [16usize, 64, 256] {
        let config = MatchConfig {
            vec_dim: 8,
            batch_size,
            ..Default::default()
        };
        let engine = SimEngine::new(SimParams::new(config.mult_depth, config.slot_count())).unwrap();
        let (server, _) = KeyMaterial::generate(&engine, &mut rng, &config)
            .unwrap()
            .split();

        let scores: Vec<_> = (0..SCORES)
            .map(|_| {
                let score = rng.random_range(-1.0f64..1.0);
                engine
                    .encrypt(&mut rng, &server.public_key, &encode(&[score]))
                    .unwrap()
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::new("Stream 256 scores", batch_size),
            &batch_size,
            |b, _| {
                b.iter(|| {
                    let reducer = MaxReducer::new(&engine, &server.eval_keys, &config);
                    let mut stream = StreamingMax::new(reducer, batch_size);
                    for score in &scores {
                        stream.push(black_box(score.clone())).unwrap();
                    }
                    stream.finish().unwrap()
                })
            },
        );
    }
    group.finish();

    let default_config = MatchConfig::default();
    c.bench_function("Depth preflight over 10k vectors", |b| {
        b.iter(|| preflight(black_box(&default_config), 10_000))
    });
}

criterion_group!(benches, bench_reduction);
criterion_main!(benches);
