use thiserror::Error;

/// Errors reported by an engine backend.
///
/// Running out of depth budget is deliberately absent: a value past the
/// budget is unusable but the backend cannot tell.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("plaintext has {len} values but only {slots} slots are available")]
    TooManySlots { len: usize, slots: usize },

    #[error("no relinearization key was generated")]
    MissingMultKey,

    #[error("no rotation key for shift {0}")]
    MissingRotationKey(i32),

    #[error("key does not match the one used for encryption")]
    KeyMismatch,

    #[error("invalid engine parameters: {0}")]
    InvalidParameters(String),
}
