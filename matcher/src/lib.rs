#![warn(rust_2018_idioms)]

//! Encrypted duplicate detection: decide whether a query vector is already
//! enrolled in an encrypted database, without decrypting any individual
//! similarity.
//!
//! Every entry is compared to the query with an encrypted inner product,
//! the similarities are combined into an approximate maximum under a fixed
//! multiplicative depth budget, and only that maximum is (threshold)
//! decrypted and compared to the decision threshold.
//!
//! ```rust
//! use feature_vectors::synthesize;
//! use he::{SimEngine, SimParams};
//! use matcher::{KeyMaterial, MatchConfig, Pipeline};
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = MatchConfig {
//!     vec_dim: 64,
//!     batch_size: 16,
//!     ..Default::default()
//! };
//! let engine = SimEngine::new(SimParams::new(config.mult_depth, config.slot_count())).unwrap();
//! let mut rng = StdRng::seed_from_u64(42);
//!
//! // Key ceremony: the server only gets the public and evaluation keys
//! let (server, decryptor) = KeyMaterial::generate(&engine, &mut rng, &config)
//!     .unwrap()
//!     .split();
//! let pipeline = Pipeline::new(&engine, &server, &config).unwrap();
//!
//! let db = synthesize(20, 64, 42);
//! let path = std::env::temp_dir().join("matcher-doc-db.bin");
//! let written = pipeline.encrypt_database(&mut rng, &db, &path).await.unwrap();
//!
//! let query = pipeline.encrypt_query(&mut rng, &db[0]).unwrap();
//! let outcome = pipeline.evaluate_store(&path, written, &query).await.unwrap();
//! let decision = pipeline.decide(&decryptor, &outcome.result).unwrap();
//! println!("{} ({:.4})", decision, decision.value);
//! enc_store::remove_store(&path).await;
//! # });
//! ```

mod config;
mod decision;
mod depth;
mod error;
mod keys;
mod operators;
mod pipeline;
mod reducer;
mod similarity;
mod traits;

pub use config::{ApproxSettings, MatchConfig};
pub use decision::{Decision, SimulatedThresholdDecryptor, ThresholdDecryptor, decide};
pub use depth::{DepthPlan, preflight, worst_case_level};
pub use error::MatchError;
pub use keys::{KeyMaterial, ServerKeys};
pub use operators::{ApproxMax, LinearBlend};
pub use pipeline::{Pipeline, StreamOutcome};
pub use reducer::{BatchAccumulator, Combination, MaxReducer, Reduced, ReductionStats, StreamingMax};
pub use similarity::{SIMILARITY_LEVEL_COST, SimilarityEvaluator, rotation_indices};
pub use traits::CombineOperator;

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    use he::traits::HomomorphicEngine;
    use he::{
        PackedPlaintext, SimCiphertext, SimEngine, SimEvalKeys, SimParams, SimPublicKey,
        SimSecretKey, decode, encode,
    };
    use rand::{SeedableRng, rngs::StdRng};

    use crate::similarity::rotation_indices;

    pub(crate) struct SimContext {
        pub engine: SimEngine,
        pub keys: SimEvalKeys,
        pub pk: SimPublicKey,
        pub sk: SimSecretKey,
        rng: RefCell<StdRng>,
    }

    impl SimContext {
        fn new(mult_depth: u32, slots: usize, rotations: &BTreeSet<i32>) -> Self {
            let engine = SimEngine::new(SimParams::new(mult_depth, slots)).unwrap();
            let mut rng = StdRng::seed_from_u64(1);
            let kp = engine.key_gen(&mut rng);
            let mut keys = SimEvalKeys::default();
            engine.eval_mult_key_gen(&kp.secret_key, &mut keys);
            engine.eval_rotate_key_gen(&kp.secret_key, rotations, &mut keys);
            Self {
                engine,
                keys,
                pk: kp.public_key,
                sk: kp.secret_key,
                rng: RefCell::new(rng),
            }
        }

        pub fn encrypt(&self, pt: &PackedPlaintext) -> SimCiphertext {
            self.engine
                .encrypt(&mut *self.rng.borrow_mut(), &self.pk, pt)
                .unwrap()
        }

        /// Encrypt `score` in slot 0
        pub fn encrypt_score(&self, score: f64) -> SimCiphertext {
            self.encrypt(&encode(&[score]))
        }

        pub fn decrypt_score(&self, ct: &SimCiphertext) -> f64 {
            decode(&self.engine.decrypt(&self.sk, ct).unwrap(), 1)[0]
        }
    }

    pub(crate) fn sim_context(mult_depth: u32, slots: usize) -> SimContext {
        SimContext::new(mult_depth, slots, &rotation_indices(slots))
    }

    pub(crate) fn sim_context_for_dim(mult_depth: u32, dim: usize) -> SimContext {
        SimContext::new(mult_depth, dim.next_power_of_two(), &rotation_indices(dim))
    }
}
