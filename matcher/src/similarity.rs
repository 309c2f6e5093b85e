use std::collections::BTreeSet;

use he::error::EngineError;
use he::traits::HomomorphicEngine;

/// Levels consumed by one similarity evaluation (the slot-wise product)
pub const SIMILARITY_LEVEL_COST: u32 = 1;

/// Shifts `1, 2, 4, ...` below `dim`: the rotations needed to sum `dim` slots.
pub fn rotation_indices(dim: usize) -> BTreeSet<i32> {
    let mut indices = BTreeSet::new();
    let mut shift = 1usize;
    while shift < dim {
        indices.insert(shift as i32);
        shift <<= 1;
    }
    indices
}

/// Encrypted cosine similarity between a query and database entries.
pub struct SimilarityEvaluator<'a, E: HomomorphicEngine> {
    engine: &'a E,
    keys: &'a E::EvalKeys,
    rotations: BTreeSet<i32>,
}

impl<'a, E: HomomorphicEngine> SimilarityEvaluator<'a, E> {
    pub fn new(engine: &'a E, keys: &'a E::EvalKeys, dim: usize) -> Self {
        Self {
            engine,
            keys,
            rotations: rotation_indices(dim),
        }
    }

    /// Slot 0 of the result holds `sum(q_i * e_i)`. Both operands must pack
    /// vectors of the dimension given at construction.
    pub fn similarity(
        &self,
        query: &E::Ciphertext,
        entry: &E::Ciphertext,
    ) -> Result<E::Ciphertext, EngineError> {
        let mut sum = self.engine.mult(self.keys, query, entry)?;
        for shift in &self.rotations {
            let rotated = self.engine.rotate(self.keys, &sum, *shift)?;
            sum = self.engine.add(&sum, &rotated);
        }
        Ok(sum)
    }
}
