use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use feature_vectors::synthesize;
use he::traits::HomomorphicEngine;
use he::{SimEngine, SimParams, encode};
use matcher::{KeyMaterial, MatchConfig, SimilarityEvaluator};
use rand::SeedableRng;
use rand::rngs::{StdRng, SysRng};
use std::hint::black_box;

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("Encrypted similarity");

    for dim in [128usize, 512, 2048] {
        let config = MatchConfig {
            vec_dim: dim,
            batch_size: 16,
            ..Default::default()
        };
        let engine = SimEngine::new(SimParams::new(config.mult_depth, config.slot_count())).unwrap();
        let mut rng = StdRng::try_from_rng(&mut SysRng).unwrap();
        let (server, _) = KeyMaterial::generate(&engine, &mut rng, &config)
            .unwrap()
            .split();

        let vectors = synthesize(2, dim, 42);
        let query = engine
            .encrypt(&mut rng, &server.public_key, &encode(vectors[0].as_slice()))
            .unwrap();
        let entry = engine
            .encrypt(&mut rng, &server.public_key, &encode(vectors[1].as_slice()))
            .unwrap();
        let evaluator = SimilarityEvaluator::new(&engine, &server.eval_keys, dim);

        group.bench_with_input(BenchmarkId::new("Query against one entry", dim), &dim, |b, _| {
            b.iter(|| evaluator.similarity(black_box(&query), black_box(&entry)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_similarity);
criterion_main!(benches);
