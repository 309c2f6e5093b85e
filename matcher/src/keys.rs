use he::traits::HomomorphicEngine;
use log::{debug, info};
use rand::CryptoRng;

use crate::config::MatchConfig;
use crate::decision::SimulatedThresholdDecryptor;
use crate::error::MatchError;
use crate::similarity::rotation_indices;

/// What the untrusted server receives: it can encrypt and evaluate, not
/// decrypt.
pub struct ServerKeys<E: HomomorphicEngine> {
    pub public_key: E::PublicKey,
    pub eval_keys: E::EvalKeys,
}

/// Every key of a deployment, as produced by the (simulated) key ceremony.
pub struct KeyMaterial<E: HomomorphicEngine> {
    pub server: ServerKeys<E>,
    pub decryptor: SimulatedThresholdDecryptor<E>,
}

impl<E: HomomorphicEngine> KeyMaterial<E> {
    /// Generate the joint key pair, the multiplication key, the rotation
    /// keys needed to sum `config.vec_dim` slots, and `config.num_parties`
    /// key shares.
    pub fn generate<R: CryptoRng + ?Sized>(
        engine: &E,
        rng: &mut R,
        config: &MatchConfig,
    ) -> Result<Self, MatchError> {
        config.validate()?;

        let joint = engine.key_gen(&mut *rng);
        let mut eval_keys = E::EvalKeys::default();
        engine.eval_mult_key_gen(&joint.secret_key, &mut eval_keys);
        debug!("Multiplication key generated");

        let rotations = rotation_indices(config.vec_dim);
        engine.eval_rotate_key_gen(&joint.secret_key, &rotations, &mut eval_keys);
        debug!("Rotation keys generated for shifts {:?}", rotations);

        let shares = (0..config.num_parties)
            .map(|_| engine.key_gen(&mut *rng).secret_key)
            .collect();
        info!(
            "Keys generated : {} parties, any {} of them can decrypt",
            config.num_parties, config.threshold_t
        );

        Ok(Self {
            server: ServerKeys {
                public_key: joint.public_key,
                eval_keys,
            },
            decryptor: SimulatedThresholdDecryptor::new(
                shares,
                config.threshold_t,
                joint.secret_key,
            )?,
        })
    }

    pub fn split(self) -> (ServerKeys<E>, SimulatedThresholdDecryptor<E>) {
        (self.server, self.decryptor)
    }
}
