use std::collections::BTreeSet;

use rand::CryptoRng;
use serde::{Deserialize, Serialize};

use crate::encoding::PackedPlaintext;
use crate::error::EngineError;
use crate::traits::{HomomorphicEngine, KeyPair};

/// Backend whose ciphertexts carry nothing but a level.
///
/// Running an algorithm on it gives the exact level of every value it
/// would produce on a real backend, at no cryptographic cost.
#[derive(Debug, Clone)]
pub struct LevelTracker {
    depth_budget: u32,
    slot_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedLevel {
    level: u32,
}

impl TrackedLevel {
    pub fn level(&self) -> u32 {
        self.level
    }
}

impl LevelTracker {
    pub fn new(depth_budget: u32, slot_count: usize) -> Self {
        Self {
            depth_budget,
            slot_count,
        }
    }

    /// A ciphertext stub sitting at `level`
    pub fn at_level(&self, level: u32) -> TrackedLevel {
        TrackedLevel { level }
    }
}

impl HomomorphicEngine for LevelTracker {
    type PublicKey = ();
    type SecretKey = ();
    type EvalKeys = ();
    type Ciphertext = TrackedLevel;

    fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn depth_budget(&self) -> u32 {
        self.depth_budget
    }

    fn key_gen<R: CryptoRng + ?Sized>(&self, _rng: &mut R) -> KeyPair<(), ()> {
        KeyPair {
            public_key: (),
            secret_key: (),
        }
    }

    fn eval_mult_key_gen(&self, _sk: &(), _keys: &mut ()) {}

    fn eval_rotate_key_gen(&self, _sk: &(), _indices: &BTreeSet<i32>, _keys: &mut ()) {}

    fn encrypt<R: CryptoRng + ?Sized>(
        &self,
        _rng: &mut R,
        _pk: &(),
        pt: &PackedPlaintext,
    ) -> Result<TrackedLevel, EngineError> {
        if pt.len() > self.slot_count {
            return Err(EngineError::TooManySlots {
                len: pt.len(),
                slots: self.slot_count,
            });
        }
        Ok(TrackedLevel { level: 0 })
    }

    // Levels only, there is nothing to recover.
    fn decrypt(&self, _sk: &(), _ct: &TrackedLevel) -> Result<PackedPlaintext, EngineError> {
        Ok(PackedPlaintext::from_slots(vec![0.0; self.slot_count]))
    }

    fn add(&self, a: &TrackedLevel, b: &TrackedLevel) -> TrackedLevel {
        TrackedLevel {
            level: a.level.max(b.level),
        }
    }

    fn sub(&self, a: &TrackedLevel, b: &TrackedLevel) -> TrackedLevel {
        self.add(a, b)
    }

    fn mult(
        &self,
        _keys: &(),
        a: &TrackedLevel,
        b: &TrackedLevel,
    ) -> Result<TrackedLevel, EngineError> {
        Ok(TrackedLevel {
            level: a.level.max(b.level) + 1,
        })
    }

    fn mult_scalar(&self, a: &TrackedLevel, _scalar: f64) -> TrackedLevel {
        TrackedLevel { level: a.level + 1 }
    }

    fn rotate(&self, _keys: &(), a: &TrackedLevel, _shift: i32) -> Result<TrackedLevel, EngineError> {
        Ok(*a)
    }

    fn level(&self, ct: &TrackedLevel) -> u32 {
        ct.level
    }
}
