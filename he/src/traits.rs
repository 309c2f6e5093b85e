use crate::encoding::PackedPlaintext;
use crate::error::EngineError;
use rand::CryptoRng;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeSet;
/*
    PublicKey  : encryption key, held by the server
    SecretKey  : decryption key (or one share of it), never held by the server
    EvalKeys   : multiplication/rotation keys, held by the server
    Ciphertext : shared immutable handle on an encrypted packed vector

    Level semantics: fresh ciphertexts are at level 0, add/sub/rotate keep
    max(levels), mult/mult_scalar return max(levels) + 1.
*/

/// Key pair returned by [`HomomorphicEngine::key_gen`].
#[derive(Debug, Clone)]
pub struct KeyPair<P, S> {
    pub public_key: P,
    pub secret_key: S,
}

pub trait HomomorphicEngine {
    type PublicKey: Clone + Serialize + DeserializeOwned;
    type SecretKey: Clone;
    type EvalKeys: Default;
    type Ciphertext: Clone + Serialize + DeserializeOwned;

    /// Number of slots of a packed plaintext
    fn slot_count(&self) -> usize;
    /// Number of multiplicative levels a ciphertext can go through
    fn depth_budget(&self) -> u32;

    /// Return a fresh key pair
    fn key_gen<R: CryptoRng + ?Sized>(&self, rng: &mut R) -> KeyPair<Self::PublicKey, Self::SecretKey>;
    /// Add a relinearization key for `sk` to `keys`
    fn eval_mult_key_gen(&self, sk: &Self::SecretKey, keys: &mut Self::EvalKeys);
    /// Add rotation keys for every shift in `indices` to `keys`
    fn eval_rotate_key_gen(
        &self,
        sk: &Self::SecretKey,
        indices: &BTreeSet<i32>,
        keys: &mut Self::EvalKeys,
    );

    /// Encrypt a packed plaintext, zero padding the unused slots
    fn encrypt<R: CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        pk: &Self::PublicKey,
        pt: &PackedPlaintext,
    ) -> Result<Self::Ciphertext, EngineError>;
    /// Decrypt a ciphertext into all of its slots
    fn decrypt(
        &self,
        sk: &Self::SecretKey,
        ct: &Self::Ciphertext,
    ) -> Result<PackedPlaintext, EngineError>;

    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Self::Ciphertext;
    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Self::Ciphertext;
    fn mult(
        &self,
        keys: &Self::EvalKeys,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EngineError>;
    fn mult_scalar(&self, a: &Self::Ciphertext, scalar: f64) -> Self::Ciphertext;
    /// Cyclic left shift: slot `i` of the result holds slot `i + shift` of `a`
    fn rotate(
        &self,
        keys: &Self::EvalKeys,
        a: &Self::Ciphertext,
        shift: i32,
    ) -> Result<Self::Ciphertext, EngineError>;

    /// Multiplicative levels consumed so far by `ct`
    fn level(&self, ct: &Self::Ciphertext) -> u32;
}
