use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;
use rand::{CryptoRng, RngExt};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::encoding::PackedPlaintext;
use crate::error::EngineError;
use crate::traits::{HomomorphicEngine, KeyPair};

/// Parameters of the simulated CKKS backend.
///
/// The simulation keeps slot values in the clear: it reproduces the level
/// accounting, key requirements, rotation layout and approximation error
/// of CKKS, but it provides no confidentiality.
#[derive(Debug, Clone, PartialEq)]
pub struct SimParams {
    /// Multiplicative depth budget `L`
    pub mult_depth: u32,
    /// Number of slots, must be a power of two
    pub slot_count: usize,
    /// Rescaling precision: results of a multiplication are rounded to 2^-bits
    pub scaling_mod_bits: u32,
    /// Standard deviation of the noise added to every slot at encryption
    pub encryption_noise: f64,
}

impl SimParams {
    pub fn new(mult_depth: u32, slot_count: usize) -> Self {
        Self {
            mult_depth,
            slot_count,
            scaling_mod_bits: 50,
            encryption_noise: 2f64.powi(-45),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimPublicKey {
    key_tag: u64,
}

#[derive(Debug, Clone)]
pub struct SimSecretKey {
    key_tag: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SimEvalKeys {
    mult_tag: Option<u64>,
    rotation_tag: Option<u64>,
    rotations: BTreeSet<i32>,
}

impl SimEvalKeys {
    /// Normalized shifts a rotation key exists for
    pub fn rotations(&self) -> &BTreeSet<i32> {
        &self.rotations
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CiphertextData {
    key_tag: u64,
    level: u32,
    slots: Vec<f64>,
}

/// Shared immutable ciphertext handle, cloning only bumps a reference count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimCiphertext {
    inner: Arc<CiphertextData>,
}

#[derive(Debug, Clone)]
pub struct SimEngine {
    params: SimParams,
    scale: f64,
}

impl SimEngine {
    pub fn new(params: SimParams) -> Result<Self, EngineError> {
        if params.slot_count == 0 || !params.slot_count.is_power_of_two() {
            return Err(EngineError::InvalidParameters(format!(
                "slot count {} is not a power of two",
                params.slot_count
            )));
        }
        if params.scaling_mod_bits == 0 || params.scaling_mod_bits > 60 {
            return Err(EngineError::InvalidParameters(format!(
                "scaling modulus of {} bits is out of range",
                params.scaling_mod_bits
            )));
        }
        if !params.encryption_noise.is_finite() || params.encryption_noise < 0.0 {
            return Err(EngineError::InvalidParameters(
                "encryption noise must be a finite, non-negative deviation".into(),
            ));
        }

        debug!(
            "Simulated CKKS engine: {} slots, depth {}, {}-bit scaling",
            params.slot_count, params.mult_depth, params.scaling_mod_bits
        );
        let scale = 2f64.powi(params.scaling_mod_bits as i32);
        Ok(Self { params, scale })
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Drop `levels` levels from `ct` without touching its slots.
    pub fn level_reduce(&self, ct: &SimCiphertext, levels: u32) -> SimCiphertext {
        self.finish(
            ct.inner.key_tag,
            ct.inner.level.saturating_add(levels),
            ct.inner.slots.clone(),
        )
    }

    fn rescale(&self, value: f64) -> f64 {
        (value * self.scale).round() / self.scale
    }

    // Anything past the budget decrypts to garbage.
    fn finish(&self, key_tag: u64, level: u32, mut slots: Vec<f64>) -> SimCiphertext {
        if level > self.params.mult_depth {
            slots.iter_mut().for_each(|s| *s = f64::NAN);
        }
        SimCiphertext {
            inner: Arc::new(CiphertextData {
                key_tag,
                level,
                slots,
            }),
        }
    }

    fn zip_with(
        &self,
        a: &SimCiphertext,
        b: &SimCiphertext,
        op: impl Fn(f64, f64) -> f64,
    ) -> Vec<f64> {
        a.inner
            .slots
            .iter()
            .zip(&b.inner.slots)
            .map(|(x, y)| op(*x, *y))
            .collect()
    }

    fn normalize_shift(&self, shift: i32) -> i32 {
        shift.rem_euclid(self.params.slot_count as i32)
    }
}

impl HomomorphicEngine for SimEngine {
    type PublicKey = SimPublicKey;
    type SecretKey = SimSecretKey;
    type EvalKeys = SimEvalKeys;
    type Ciphertext = SimCiphertext;

    fn slot_count(&self) -> usize {
        self.params.slot_count
    }

    fn depth_budget(&self) -> u32 {
        self.params.mult_depth
    }

    fn key_gen<R: CryptoRng + ?Sized>(&self, rng: &mut R) -> KeyPair<SimPublicKey, SimSecretKey> {
        let key_tag = rng.random::<u64>();
        KeyPair {
            public_key: SimPublicKey { key_tag },
            secret_key: SimSecretKey { key_tag },
        }
    }

    fn eval_mult_key_gen(&self, sk: &SimSecretKey, keys: &mut SimEvalKeys) {
        keys.mult_tag = Some(sk.key_tag);
    }

    fn eval_rotate_key_gen(
        &self,
        sk: &SimSecretKey,
        indices: &BTreeSet<i32>,
        keys: &mut SimEvalKeys,
    ) {
        keys.rotation_tag = Some(sk.key_tag);
        keys.rotations
            .extend(indices.iter().map(|i| self.normalize_shift(*i)));
    }

    fn encrypt<R: CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        pk: &SimPublicKey,
        pt: &PackedPlaintext,
    ) -> Result<SimCiphertext, EngineError> {
        if pt.len() > self.params.slot_count {
            return Err(EngineError::TooManySlots {
                len: pt.len(),
                slots: self.params.slot_count,
            });
        }

        let mut slots = pt.slots().to_vec();
        slots.resize(self.params.slot_count, 0.0);

        if self.params.encryption_noise > 0.0 {
            let noise = Normal::new(0.0, self.params.encryption_noise)
                .map_err(|e| EngineError::InvalidParameters(e.to_string()))?;
            for slot in slots.iter_mut() {
                *slot += noise.sample(&mut *rng);
            }
        }

        Ok(self.finish(pk.key_tag, 0, slots))
    }

    fn decrypt(
        &self,
        sk: &SimSecretKey,
        ct: &SimCiphertext,
    ) -> Result<PackedPlaintext, EngineError> {
        if sk.key_tag != ct.inner.key_tag {
            return Err(EngineError::KeyMismatch);
        }
        Ok(PackedPlaintext::from_slots(ct.inner.slots.clone()))
    }

    fn add(&self, a: &SimCiphertext, b: &SimCiphertext) -> SimCiphertext {
        let slots = self.zip_with(a, b, |x, y| x + y);
        self.finish(a.inner.key_tag, a.inner.level.max(b.inner.level), slots)
    }

    fn sub(&self, a: &SimCiphertext, b: &SimCiphertext) -> SimCiphertext {
        let slots = self.zip_with(a, b, |x, y| x - y);
        self.finish(a.inner.key_tag, a.inner.level.max(b.inner.level), slots)
    }

    fn mult(
        &self,
        keys: &SimEvalKeys,
        a: &SimCiphertext,
        b: &SimCiphertext,
    ) -> Result<SimCiphertext, EngineError> {
        match keys.mult_tag {
            None => return Err(EngineError::MissingMultKey),
            Some(tag) if tag != a.inner.key_tag || tag != b.inner.key_tag => {
                return Err(EngineError::KeyMismatch);
            }
            Some(_) => {}
        }

        let slots = self.zip_with(a, b, |x, y| self.rescale(x * y));
        let level = a.inner.level.max(b.inner.level) + 1;
        Ok(self.finish(a.inner.key_tag, level, slots))
    }

    fn mult_scalar(&self, a: &SimCiphertext, scalar: f64) -> SimCiphertext {
        let slots = a
            .inner
            .slots
            .iter()
            .map(|x| self.rescale(x * scalar))
            .collect();
        self.finish(a.inner.key_tag, a.inner.level + 1, slots)
    }

    fn rotate(
        &self,
        keys: &SimEvalKeys,
        a: &SimCiphertext,
        shift: i32,
    ) -> Result<SimCiphertext, EngineError> {
        let normalized = self.normalize_shift(shift);
        if normalized == 0 {
            return Ok(a.clone());
        }
        if !keys.rotations.contains(&normalized) {
            return Err(EngineError::MissingRotationKey(shift));
        }
        if keys.rotation_tag != Some(a.inner.key_tag) {
            return Err(EngineError::KeyMismatch);
        }

        let mut slots = a.inner.slots.clone();
        slots.rotate_left(normalized as usize);
        Ok(self.finish(a.inner.key_tag, a.inner.level, slots))
    }

    fn level(&self, ct: &SimCiphertext) -> u32 {
        ct.inner.level
    }
}
