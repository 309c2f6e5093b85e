use he::LevelTracker;
use log::{info, warn};

use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::operators::ApproxMax;
use crate::reducer::{MaxReducer, ReductionStats, StreamingMax};
use crate::similarity::{SIMILARITY_LEVEL_COST, SimilarityEvaluator};

/// Depth consumption of a whole query, computed before touching any
/// ciphertext.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthPlan {
    pub num_vectors: u64,
    /// Final level if every combination used the approximate max
    pub worst_case_without_fallback: u32,
    /// Exact final level, fallbacks included
    pub final_level: u32,
    pub stats: ReductionStats,
}

fn ceil_log2(n: u64) -> u32 {
    n.max(1).next_power_of_two().trailing_zeros()
}

/// `similarity + ceil(log2(min(B, N))) * c_hi + ceil(log2(ceil(N / B))) * c_hi`
pub fn worst_case_level(num_vectors: u64, batch_size: usize) -> u32 {
    let batch_size = batch_size.max(1) as u64;
    let batch_rounds = ceil_log2(num_vectors.min(batch_size));
    let global_rounds = ceil_log2(num_vectors.div_ceil(batch_size));
    SIMILARITY_LEVEL_COST + (batch_rounds + global_rounds) * ApproxMax::LEVEL_COST
}

/// Check that a query over `num_vectors` entries ends strictly below the
/// depth budget.
///
/// The check replays the similarity and reduction of the real pipeline on
/// level-only ciphertexts, so the fallback rule is accounted for exactly.
pub fn preflight(config: &MatchConfig, num_vectors: u64) -> Result<DepthPlan, MatchError> {
    if num_vectors == 0 {
        return Err(MatchError::EmptyDatabase);
    }

    let tracker = LevelTracker::new(config.mult_depth, config.slot_count());
    let evaluator = SimilarityEvaluator::new(&tracker, &(), config.vec_dim);
    let mut stream = StreamingMax::new(MaxReducer::new(&tracker, &(), config), config.batch_size);

    let fresh = tracker.at_level(0);
    for _ in 0..num_vectors {
        stream.push(evaluator.similarity(&fresh, &fresh)?)?;
    }
    let reduced = stream.finish()?;

    let plan = DepthPlan {
        num_vectors,
        worst_case_without_fallback: worst_case_level(num_vectors, config.batch_size),
        final_level: reduced.result.level(),
        stats: reduced.stats,
    };

    if plan.final_level >= config.mult_depth {
        return Err(MatchError::DepthBudgetExceeded {
            required: plan.final_level,
            budget: config.mult_depth,
        });
    }

    if plan.stats.fallback > 0 {
        warn!(
            "Depth budget {} is short of the {} levels of a full approximate max, {} of {} combinations will fall back to averaging",
            config.mult_depth,
            plan.worst_case_without_fallback,
            plan.stats.fallback,
            plan.stats.fallback + plan.stats.approx_max
        );
    }
    info!(
        "Depth preflight : final level {}/{} for {} vectors",
        plan.final_level, config.mult_depth, num_vectors
    );

    Ok(plan)
}
