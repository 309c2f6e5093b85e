use he::error::EngineError;
use he::traits::HomomorphicEngine;

/// Combine two encrypted scores into one encrypted score leaning toward
/// the larger of the two.
pub trait CombineOperator {
    /// Levels consumed on top of the deeper operand
    fn level_cost(&self) -> u32;

    fn combine<E: HomomorphicEngine>(
        &self,
        engine: &E,
        keys: &E::EvalKeys,
        a: &E::Ciphertext,
        b: &E::Ciphertext,
    ) -> Result<E::Ciphertext, EngineError>;
}
