use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Result, anyhow};
use enc_store::remove_store;
use feature_vectors::{plaintext_max_similarity, synthesize};
use he::{SimEngine, SimParams};
use log::{info, warn};
use matcher::{KeyMaterial, MatchConfig, Pipeline};
use rand::{
    SeedableRng,
    rngs::{StdRng, SysRng},
};

use crate::report::Report;

/// What the demo runs on, beside the matching configuration.
#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub num_vectors: usize,
    pub seed: u64,
    pub query_seed: u64,
    pub store: PathBuf,
}

/// Enroll synthetic vectors, check a query against them under encryption
/// and compare the result to the plaintext computation.
pub async fn run_demo(config: &MatchConfig, options: &DemoOptions) -> Result<Report> {
    let start = Instant::now();

    let engine = SimEngine::new(SimParams::new(config.mult_depth, config.slot_count()))?;
    let mut rng = StdRng::try_from_rng(&mut SysRng)
        .map_err(|e| anyhow!("Unable to seed the encryption RNG : {}", e))?;

    let (server, decryptor) = KeyMaterial::generate(&engine, &mut rng, config)?.split();
    let pipeline = Pipeline::new(&engine, &server, config)?;

    info!(
        "Synthesizing {} vectors of dimension {}",
        options.num_vectors, config.vec_dim
    );
    let database = synthesize(options.num_vectors, config.vec_dim, options.seed);
    let query = synthesize(1, config.vec_dim, options.query_seed)
        .pop()
        .ok_or_else(|| anyhow!("No query vector was synthesized"))?;
    if options.query_seed == options.seed {
        info!("Querying with enrolled vector 0");
    }

    let baseline = plaintext_max_similarity(&query, &database);
    match &baseline {
        Some(b) => info!(
            "Plaintext max similarity : {:.6} (vector {})",
            b.similarity, b.index
        ),
        None => warn!("The database is empty"),
    }

    // Nothing may fail between writing the store and removing it
    let encrypted_query = pipeline.encrypt_query(&mut rng, &query)?;
    let written = pipeline
        .encrypt_database(&mut rng, &database, &options.store)
        .await?;

    let outcome = pipeline
        .evaluate_store(&options.store, written, &encrypted_query)
        .await;
    remove_store(&options.store).await;
    let outcome = outcome?;

    let decision = pipeline.decide(&decryptor, &outcome.result)?;

    Ok(Report {
        baseline,
        decision,
        processed: outcome.processed,
        batches: outcome.batches,
        stats: outcome.stats,
        truncated: outcome.truncated,
        final_level: outcome.final_level,
        depth_budget: config.mult_depth,
        runtime: start.elapsed(),
    })
}
