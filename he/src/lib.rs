//! Capability surface of a leveled homomorphic encryption engine working on
//! packed real vectors (CKKS-like), and the backends implementing it.

mod encoding;
mod levels;
mod sim;

pub mod error;
pub mod traits;

pub use encoding::{PackedPlaintext, decode, encode};
pub use levels::{LevelTracker, TrackedLevel};
pub use sim::{SimCiphertext, SimEngine, SimEvalKeys, SimParams, SimPublicKey, SimSecretKey};
