use he::error::EngineError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("the database is empty, there is no maximum to compute")]
    EmptyDatabase,

    #[error("cannot reduce an empty batch")]
    EmptyBatch,

    #[error("reduction needs level {required} but the depth budget is {budget}")]
    DepthBudgetExceeded { required: u32, budget: u32 },

    #[error("decrypted value {0} is not finite, the depth budget was exhausted")]
    NonFiniteResult(f64),

    #[error("vector has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Engine(#[from] EngineError),
}
