use std::mem;

use he::traits::HomomorphicEngine;
use log::{debug, trace};

use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::operators::{ApproxMax, LinearBlend};
use crate::traits::CombineOperator;

/// Operator picked for one combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    ApproxMax,
    Fallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReductionStats {
    /// Combinations done with the approximate max
    pub approx_max: u64,
    /// Combinations done with the linear fallback
    pub fallback: u64,
    /// Deepest operand level seen by a combination
    pub deepest_pair_level: u32,
}

/// Combine encrypted scores into an approximation of their maximum while
/// keeping every level below the depth budget.
///
/// Before each combination the deeper operand's level is compared to
/// `L - margin`: below it the approximate max is used, at or above it the
/// cheaper linear blend is used instead.
pub struct MaxReducer<'a, E: HomomorphicEngine> {
    engine: &'a E,
    keys: &'a E::EvalKeys,
    depth_budget: u32,
    margin: u32,
    approx: ApproxMax,
    fallback: LinearBlend,
    stats: ReductionStats,
}

impl<'a, E: HomomorphicEngine> MaxReducer<'a, E> {
    pub fn new(engine: &'a E, keys: &'a E::EvalKeys, config: &MatchConfig) -> Self {
        Self {
            engine,
            keys,
            depth_budget: config.mult_depth,
            margin: config.depth_margin,
            approx: ApproxMax::from(&config.approx),
            fallback: LinearBlend::new(config.approx.fallback_bias),
            stats: ReductionStats::default(),
        }
    }

    pub fn select(&self, pair_level: u32) -> Combination {
        if pair_level >= self.depth_budget.saturating_sub(self.margin) {
            Combination::Fallback
        } else {
            Combination::ApproxMax
        }
    }

    pub fn combine(
        &mut self,
        a: &E::Ciphertext,
        b: &E::Ciphertext,
    ) -> Result<E::Ciphertext, MatchError> {
        let pair_level = self.engine.level(a).max(self.engine.level(b));
        self.stats.deepest_pair_level = self.stats.deepest_pair_level.max(pair_level);

        let combined = match self.select(pair_level) {
            Combination::ApproxMax => {
                self.stats.approx_max += 1;
                self.approx.combine(self.engine, self.keys, a, b)?
            }
            Combination::Fallback => {
                trace!(
                    "Level {} is within {} of the budget, using the linear fallback",
                    pair_level, self.margin
                );
                self.stats.fallback += 1;
                self.fallback.combine(self.engine, self.keys, a, b)?
            }
        };
        Ok(combined)
    }

    /// Tournament reduction: adjacent pairs are combined until one value is
    /// left, an odd element out goes up a round unchanged.
    pub fn reduce_batch(
        &mut self,
        mut batch: Vec<E::Ciphertext>,
    ) -> Result<E::Ciphertext, MatchError> {
        if batch.is_empty() {
            return Err(MatchError::EmptyBatch);
        }

        while batch.len() > 1 {
            let mut next = Vec::with_capacity(batch.len().div_ceil(2));
            let mut items = batch.into_iter();
            while let Some(a) = items.next() {
                match items.next() {
                    Some(b) => next.push(self.combine(&a, &b)?),
                    None => next.push(a),
                }
            }
            batch = next;
        }

        batch.pop().ok_or(MatchError::EmptyBatch)
    }

    pub fn stats(&self) -> ReductionStats {
        self.stats
    }

    pub fn engine(&self) -> &'a E {
        self.engine
    }
}

/// Running combination of batch results.
///
/// Batch results are folded left to right, the older partial result always
/// on the left. Partial results of equal rank are merged as soon as they
/// meet, like the carries of a binary counter, so after `k` batches the
/// accumulator holds at most `log2(k) + 1` scores and its result sits at
/// most `ceil(log2(k))` combinations above the deepest batch result.
pub struct BatchAccumulator<C> {
    pending: Vec<(u32, C)>,
    batches: u64,
}

impl<C> Default for BatchAccumulator<C> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            batches: 0,
        }
    }
}

impl<C> BatchAccumulator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn push<E>(&mut self, reducer: &mut MaxReducer<'_, E>, batch_result: C) -> Result<(), MatchError>
    where
        E: HomomorphicEngine<Ciphertext = C>,
    {
        self.batches += 1;
        let mut carry = (0u32, batch_result);
        while let Some((rank, _)) = self.pending.last() {
            if *rank != carry.0 {
                break;
            }
            let (rank, older) = match self.pending.pop() {
                Some(top) => top,
                None => break,
            };
            carry = (rank + 1, reducer.combine(&older, &carry.1)?);
        }
        self.pending.push(carry);
        Ok(())
    }

    /// Fold what is left into the global result.
    pub fn finish<E>(mut self, reducer: &mut MaxReducer<'_, E>) -> Result<C, MatchError>
    where
        E: HomomorphicEngine<Ciphertext = C>,
    {
        let (_, mut global) = self.pending.pop().ok_or(MatchError::EmptyDatabase)?;
        while let Some((_, older)) = self.pending.pop() {
            global = reducer.combine(&older, &global)?;
        }
        Ok(global)
    }
}

/// Outcome of a streamed reduction.
#[derive(Debug, Clone)]
pub struct Reduced<C> {
    pub result: C,
    pub scores: u64,
    pub batches: u64,
    pub stats: ReductionStats,
}

/// Scores are pushed one at a time, reduced per batch of `batch_size`, and
/// the batch results combined by a [`BatchAccumulator`]. At most one batch
/// of scores is held at once.
pub struct StreamingMax<'a, E: HomomorphicEngine> {
    reducer: MaxReducer<'a, E>,
    batch: Vec<E::Ciphertext>,
    batch_size: usize,
    accumulator: BatchAccumulator<E::Ciphertext>,
    scores: u64,
}

impl<'a, E: HomomorphicEngine> StreamingMax<'a, E> {
    pub fn new(reducer: MaxReducer<'a, E>, batch_size: usize) -> Self {
        Self {
            reducer,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            accumulator: BatchAccumulator::new(),
            scores: 0,
        }
    }

    pub fn push(&mut self, score: E::Ciphertext) -> Result<(), MatchError> {
        self.batch.push(score);
        self.scores += 1;
        if self.batch.len() >= self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    pub fn scores(&self) -> u64 {
        self.scores
    }

    fn flush_batch(&mut self) -> Result<(), MatchError> {
        // The stream may end right on a batch boundary
        if self.batch.is_empty() {
            return Ok(());
        }

        let batch = mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        let size = batch.len();
        let batch_result = self.reducer.reduce_batch(batch)?;
        debug!(
            "Reduced batch {} of {} scores (level {})",
            self.accumulator.batches() + 1,
            size,
            self.reducer.engine().level(&batch_result)
        );
        self.accumulator.push(&mut self.reducer, batch_result)
    }

    pub fn finish(mut self) -> Result<Reduced<E::Ciphertext>, MatchError> {
        self.flush_batch()?;
        let batches = self.accumulator.batches();
        let result = self.accumulator.finish(&mut self.reducer)?;
        Ok(Reduced {
            result,
            scores: self.scores,
            batches,
            stats: self.reducer.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{SimContext, sim_context};
    use he::{LevelTracker, TrackedLevel};
    use proptest::prelude::*;
    use proptest::test_runner::{TestError, TestRunner};

    fn config(mult_depth: u32, batch_size: usize) -> MatchConfig {
        MatchConfig {
            mult_depth,
            vec_dim: 8,
            batch_size,
            ..Default::default()
        }
    }

    fn reduce_values(ctx: &SimContext, config: &MatchConfig, values: &[f64]) -> Reduced<f64> {
        let reducer = MaxReducer::new(&ctx.engine, &ctx.keys, config);
        let mut stream = StreamingMax::new(reducer, config.batch_size);
        for v in values {
            stream.push(ctx.encrypt_score(*v)).unwrap();
        }
        let reduced = stream.finish().unwrap();
        Reduced {
            result: ctx.decrypt_score(&reduced.result),
            scores: reduced.scores,
            batches: reduced.batches,
            stats: reduced.stats,
        }
    }

    fn reduce_levels(config: &MatchConfig, levels: &[u32]) -> Reduced<TrackedLevel> {
        let tracker = LevelTracker::new(config.mult_depth, 8);
        let reducer = MaxReducer::new(&tracker, &(), config);
        let mut stream = StreamingMax::new(reducer, config.batch_size);
        for level in levels {
            stream.push(tracker.at_level(*level)).unwrap();
        }
        stream.finish().unwrap()
    }

    #[test]
    fn test_strategy_selection() {
        let tracker = LevelTracker::new(30, 8);
        let config = config(30, 8);
        let mut reducer = MaxReducer::new(&tracker, &(), &config);

        assert_eq!(reducer.select(0), Combination::ApproxMax);
        assert_eq!(reducer.select(26), Combination::ApproxMax);
        for level in 27..40 {
            assert_eq!(reducer.select(level), Combination::Fallback);
        }

        // The deeper operand decides
        let out = reducer
            .combine(&tracker.at_level(2), &tracker.at_level(27))
            .unwrap();
        assert_eq!(out.level(), 28);
        let out = reducer
            .combine(&tracker.at_level(26), &tracker.at_level(1))
            .unwrap();
        assert_eq!(out.level(), 29);
        assert_eq!(
            reducer.stats(),
            ReductionStats {
                approx_max: 1,
                fallback: 1,
                deepest_pair_level: 27
            }
        );
    }

    #[test]
    fn test_no_approx_max_past_margin() {
        let tracker = LevelTracker::new(12, 8);
        let config = config(12, 8);

        let mut runner = TestRunner::default();
        let result = runner.run(
            &(0u32..20, 0u32..20),
            |(la, lb)| {
                let mut reducer = MaxReducer::new(&tracker, &(), &config);
                let out = reducer
                    .combine(&tracker.at_level(la), &tracker.at_level(lb))
                    .unwrap();
                let stats = reducer.stats();
                if la.max(lb) >= 12 - 3 {
                    prop_assert_eq!(stats.fallback, 1);
                    prop_assert_eq!(out.level(), la.max(lb) + 1);
                } else {
                    prop_assert_eq!(stats.approx_max, 1);
                    prop_assert!(out.level() < 12);
                }
                Ok(())
            },
        );

        match result {
            Ok(()) => (),
            Err(TestError::Fail(_, value)) => panic!("Found failing case {:?}", value),
            result => panic!("Unexpected result {:?}", result),
        }
    }

    #[test]
    fn test_tournament_shape() {
        // 8 fresh scores at level 1 : three rounds of approximate max
        let reduced = reduce_levels(&config(30, 8), &[1; 8]);
        assert_eq!(reduced.result.level(), 1 + 3 * ApproxMax::LEVEL_COST);
        assert_eq!(reduced.stats.approx_max, 7);
        assert_eq!(reduced.batches, 1);

        // The odd element passes through : [a b c] -> [ab c] -> [abc]
        let reduced = reduce_levels(&config(30, 8), &[1; 3]);
        assert_eq!(reduced.result.level(), 1 + 2 * ApproxMax::LEVEL_COST);
        assert_eq!(reduced.stats.approx_max, 2);
    }

    #[test]
    fn test_falls_back_near_budget() {
        // Levels 1 -> 4 -> 7, then 7 >= 9 - 3 forces the fallback
        let reduced = reduce_levels(&config(9, 8), &[1; 8]);
        assert_eq!(reduced.stats.approx_max, 6);
        assert_eq!(reduced.stats.fallback, 1);
        assert_eq!(reduced.result.level(), 8);
    }

    #[test]
    fn test_partial_final_batch_is_folded() {
        let reduced = reduce_levels(&config(40, 8), &[1; 37]);
        assert_eq!(reduced.scores, 37);
        assert_eq!(reduced.batches, 5);
        // 36 combinations turn 37 scores into one
        assert_eq!(reduced.stats.approx_max + reduced.stats.fallback, 36);
    }

    #[test]
    fn test_exact_batch_boundary() {
        let reduced = reduce_levels(&config(40, 4), &[1; 16]);
        assert_eq!(reduced.batches, 4);
        assert_eq!(reduced.stats.approx_max, 15);
        // 2 rounds per batch, 2 rounds across the 4 batches
        assert_eq!(reduced.result.level(), 1 + 4 * ApproxMax::LEVEL_COST);
    }

    #[test]
    fn test_accumulator_depth_is_logarithmic() {
        let config = config(400, 1);
        for batches in 1u32..=64 {
            let reduced = reduce_levels(&config, &vec![1; batches as usize]);
            let rounds = (batches as u64).next_power_of_two().trailing_zeros();
            assert!(reduced.result.level() <= 1 + rounds * ApproxMax::LEVEL_COST);
            assert_eq!(reduced.stats.approx_max, batches as u64 - 1);
        }
    }

    #[test]
    fn test_empty_inputs() {
        let tracker = LevelTracker::new(30, 8);
        let config = config(30, 8);
        let mut reducer = MaxReducer::new(&tracker, &(), &config);
        assert_eq!(reducer.reduce_batch(vec![]).unwrap_err(), MatchError::EmptyBatch);

        let stream = StreamingMax::new(MaxReducer::new(&tracker, &(), &config), 8);
        assert_eq!(stream.finish().unwrap_err(), MatchError::EmptyDatabase);
    }

    #[test]
    fn test_single_score() {
        let ctx = sim_context(30, 8);
        let reduced = reduce_values(&ctx, &config(30, 8), &[0.42]);
        assert!((reduced.result - 0.42).abs() < 1e-9);
        assert_eq!(reduced.stats.approx_max + reduced.stats.fallback, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_result_between_min_and_max(
            values in prop::collection::vec(-1.0f64..1.0, 1..40),
            batch_size in 1usize..12,
        ) {
            let ctx = sim_context(30, 8);
            let config = config(30, batch_size);
            let reduced = reduce_values(&ctx, &config, &values);

            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(reduced.result >= min - 1e-6 && reduced.result <= max + 1e-6);
            prop_assert_eq!(reduced.scores, values.len() as u64);
        }

        #[test]
        fn test_reordering_stays_within_spread(
            (values, shuffled) in prop::collection::vec(-1.0f64..1.0, 1..32)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        ) {
            let ctx = sim_context(30, 8);
            let config = config(30, 32);
            let original = reduce_values(&ctx, &config, &values).result;
            let reordered = reduce_values(&ctx, &config, &shuffled).result;

            // The approximate max is not associative: with |a - b| up to 2 the
            // degree 3 sign wraps back to -1, so only the spread bounds the gap
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for result in [original, reordered] {
                prop_assert!(result >= min - 1e-6 && result <= max + 1e-6);
            }
            prop_assert!((original - reordered).abs() <= max - min + 1e-6);
        }

        #[test]
        fn test_swapping_paired_operands_is_noise_only(
            values in prop::collection::vec(-1.0f64..1.0, 2..32),
        ) {
            let ctx = sim_context(30, 8);
            let config = config(30, 32);

            // Same tournament pairs, each pair in the opposite order
            let mut swapped = values.clone();
            for pair in swapped.chunks_mut(2) {
                pair.reverse();
            }
            let original = reduce_values(&ctx, &config, &values).result;
            let reordered = reduce_values(&ctx, &config, &swapped).result;
            prop_assert!((original - reordered).abs() < 1e-6);
        }

        #[test]
        fn test_enrolled_match_survives_reordering(
            (values, shuffled) in (prop::collection::vec(-0.1f64..0.1, 1..32), 0usize..32)
                .prop_map(|(mut others, position)| {
                    let at = position.min(others.len());
                    others.insert(at, 1.0);
                    others
                })
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        ) {
            let ctx = sim_context(30, 8);
            let config = config(30, 32);
            let original = reduce_values(&ctx, &config, &values).result;
            let reordered = reduce_values(&ctx, &config, &shuffled).result;

            // One similarity near 1 among near orthogonal ones
            prop_assert!((original - reordered).abs() < 0.05);
            prop_assert!((1.0 - original).abs() < 0.05);
        }
    }
}
