use std::path::Path;

use anyhow::{Context, Result};
use enc_store::{StoreReader, write_encrypted};
use feature_vectors::FeatureVector;
use he::encode;
use he::traits::HomomorphicEngine;
use log::{info, warn};
use rand::CryptoRng;

use crate::config::MatchConfig;
use crate::decision::{Decision, ThresholdDecryptor, decide};
use crate::depth::{DepthPlan, preflight};
use crate::error::MatchError;
use crate::keys::ServerKeys;
use crate::reducer::{MaxReducer, ReductionStats, StreamingMax};
use crate::similarity::SimilarityEvaluator;

const PROGRESS_EVERY: u64 = 10;

/// Result of streaming a store through the similarity and max reduction.
#[derive(Debug, Clone)]
pub struct StreamOutcome<C> {
    /// Encrypted approximate maximum similarity
    pub result: C,
    pub processed: u64,
    pub batches: u64,
    pub stats: ReductionStats,
    /// The store ended early, only `processed` entries were used
    pub truncated: bool,
    pub final_level: u32,
    pub plan: DepthPlan,
}

/// Server side of the duplicate check: everything that only needs the
/// public and evaluation keys.
pub struct Pipeline<'a, E: HomomorphicEngine> {
    engine: &'a E,
    keys: &'a ServerKeys<E>,
    config: &'a MatchConfig,
}

impl<'a, E: HomomorphicEngine> Pipeline<'a, E> {
    pub fn new(
        engine: &'a E,
        keys: &'a ServerKeys<E>,
        config: &'a MatchConfig,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        if engine.slot_count() < config.slot_count() {
            return Err(MatchError::InvalidConfig(format!(
                "the engine has {} slots, {} are needed",
                engine.slot_count(),
                config.slot_count()
            )));
        }
        if engine.depth_budget() != config.mult_depth {
            return Err(MatchError::InvalidConfig(format!(
                "the engine supports depth {}, the configuration asks for {}",
                engine.depth_budget(),
                config.mult_depth
            )));
        }
        Ok(Self {
            engine,
            keys,
            config,
        })
    }

    fn check_dim(&self, vector: &FeatureVector) -> Result<(), MatchError> {
        if vector.dim() != self.config.vec_dim {
            return Err(MatchError::DimensionMismatch {
                expected: self.config.vec_dim,
                actual: vector.dim(),
            });
        }
        Ok(())
    }

    /// Encrypt the enrolled vectors into a store at `path` and return how
    /// many were written.
    pub async fn encrypt_database<R: CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        vectors: &[FeatureVector],
        path: impl AsRef<Path>,
    ) -> Result<u64> {
        for vector in vectors {
            self.check_dim(vector)?;
        }
        write_encrypted(self.engine, rng, &self.keys.public_key, vectors, path).await
    }

    pub fn encrypt_query<R: CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        query: &FeatureVector,
    ) -> Result<E::Ciphertext, MatchError> {
        self.check_dim(query)?;
        Ok(self
            .engine
            .encrypt(rng, &self.keys.public_key, &encode(query.as_slice()))?)
    }

    /// Stream the `num_records` entries of the store at `path`, one at a
    /// time, into the encrypted maximum similarity with `query`.
    ///
    /// The depth of the whole reduction is checked before the store is
    /// opened. A store holding fewer entries than announced is reduced over
    /// what could be read.
    pub async fn evaluate_store(
        &self,
        path: impl AsRef<Path>,
        num_records: u64,
        query: &E::Ciphertext,
    ) -> Result<StreamOutcome<E::Ciphertext>> {
        let plan = preflight(self.config, num_records)?;

        let path = path.as_ref();
        let mut reader = StoreReader::open(path)
            .await
            .with_context(|| format!("Failed to open encrypted database {}", path.display()))?;

        let evaluator =
            SimilarityEvaluator::new(self.engine, &self.keys.eval_keys, self.config.vec_dim);
        let reducer = MaxReducer::new(self.engine, &self.keys.eval_keys, self.config);
        let mut stream = StreamingMax::new(reducer, self.config.batch_size);

        info!("Computing similarities over {} entries", num_records);
        while stream.scores() < num_records {
            let entry: E::Ciphertext = match reader.next_record().await {
                Some(entry) => entry,
                None => break,
            };
            stream.push(evaluator.similarity(query, &entry)?)?;

            let done = stream.scores();
            if done % PROGRESS_EVERY == 0 || done == num_records {
                info!("Processed {}/{} vectors", done, num_records);
            }
        }

        let processed = stream.scores();
        let truncated = processed < num_records;
        if truncated {
            warn!(
                "Encrypted database ended after {} of {} entries, using what was read",
                processed, num_records
            );
        }

        let reduced = stream.finish()?;
        let final_level = self.engine.level(&reduced.result);
        info!(
            "Reduction done : {} batches, {} approximate max, {} fallback, final level {}/{}",
            reduced.batches,
            reduced.stats.approx_max,
            reduced.stats.fallback,
            final_level,
            self.config.mult_depth
        );

        Ok(StreamOutcome {
            result: reduced.result,
            processed,
            batches: reduced.batches,
            stats: reduced.stats,
            truncated,
            final_level,
            plan,
        })
    }

    pub fn decide<D: ThresholdDecryptor<E> + ?Sized>(
        &self,
        decryptor: &D,
        result: &E::Ciphertext,
    ) -> Result<Decision, MatchError> {
        decide(self.engine, decryptor, result, self.config.threshold)
    }
}
