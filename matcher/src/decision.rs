use std::fmt;

use he::decode;
use he::error::EngineError;
use he::traits::HomomorphicEngine;
use log::{info, warn};

use crate::error::MatchError;

/// Joint decryption by the key share holders.
pub trait ThresholdDecryptor<E: HomomorphicEngine> {
    /// Decrypt `ct` and return its slots
    fn decrypt(&self, engine: &E, ct: &E::Ciphertext) -> Result<Vec<f64>, EngineError>;
}

/// Stand-in for a `t`-out-of-`n` threshold scheme.
///
/// Every party holds a share, but decryption is done with the aggregate
/// secret key once `t` shares are gathered. A single process holds all of
/// this, so it offers none of the protection of a real threshold scheme.
pub struct SimulatedThresholdDecryptor<E: HomomorphicEngine> {
    shares: Vec<E::SecretKey>,
    threshold_t: usize,
    aggregate_key: E::SecretKey,
}

impl<E: HomomorphicEngine> SimulatedThresholdDecryptor<E> {
    pub fn new(
        shares: Vec<E::SecretKey>,
        threshold_t: usize,
        aggregate_key: E::SecretKey,
    ) -> Result<Self, MatchError> {
        if threshold_t == 0 || threshold_t > shares.len() {
            return Err(MatchError::InvalidConfig(format!(
                "cannot require {} shares out of {}",
                threshold_t,
                shares.len()
            )));
        }
        Ok(Self {
            shares,
            threshold_t,
            aggregate_key,
        })
    }

    pub fn parties(&self) -> usize {
        self.shares.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold_t
    }
}

impl<E: HomomorphicEngine> ThresholdDecryptor<E> for SimulatedThresholdDecryptor<E> {
    fn decrypt(&self, engine: &E, ct: &E::Ciphertext) -> Result<Vec<f64>, EngineError> {
        warn!(
            "Threshold decryption is simulated : {} of {} shares, decrypting with the aggregate key",
            self.threshold_t,
            self.shares.len()
        );
        let pt = engine.decrypt(&self.aggregate_key, ct)?;
        Ok(decode(&pt, pt.len()))
    }
}

/// Outcome of the duplicate check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Decrypted approximate maximum similarity
    pub value: f64,
    pub threshold: f64,
    /// `true` when no enrolled vector is similar enough to the query
    pub unique: bool,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "UNIQUE")
        } else {
            write!(f, "NOT UNIQUE")
        }
    }
}

/// Decrypt the reduced score and compare slot 0 to `threshold`.
///
/// A value equal to the threshold counts as a duplicate.
pub fn decide<E, D>(
    engine: &E,
    decryptor: &D,
    ct: &E::Ciphertext,
    threshold: f64,
) -> Result<Decision, MatchError>
where
    E: HomomorphicEngine,
    D: ThresholdDecryptor<E> + ?Sized,
{
    let slots = decryptor.decrypt(engine, ct)?;
    let value = match slots.first() {
        Some(value) => *value,
        None => {
            warn!("Decrypted plaintext is empty, using 0 as the maximum similarity");
            0.0
        }
    };

    if !value.is_finite() {
        return Err(MatchError::NonFiniteResult(value));
    }

    let decision = Decision {
        value,
        threshold,
        unique: value < threshold,
    };
    info!(
        "Decision : {} (max similarity {:.6}, threshold {})",
        decision, value, threshold
    );
    Ok(decision)
}
