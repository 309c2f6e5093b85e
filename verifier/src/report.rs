use std::fmt;
use std::time::Duration;

use feature_vectors::BaselineMatch;
use matcher::{Decision, ReductionStats};

/// Accuracy under which the encrypted result is flagged
const ACCURACY_WARNING: f64 = 90.0;

/// Encrypted result against the plaintext baseline, for validation.
#[derive(Debug, Clone)]
pub struct Report {
    pub baseline: Option<BaselineMatch>,
    pub decision: Decision,
    pub processed: u64,
    pub batches: u64,
    pub stats: ReductionStats,
    pub truncated: bool,
    pub final_level: u32,
    pub depth_budget: u32,
    pub runtime: Duration,
}

impl Report {
    pub fn absolute_error(&self) -> Option<f64> {
        self.baseline
            .as_ref()
            .map(|b| (self.decision.value - b.similarity).abs())
    }

    /// Relative error in percent, undefined for a zero baseline
    pub fn relative_error(&self) -> Option<f64> {
        let baseline = self.baseline.as_ref()?;
        if baseline.similarity == 0.0 {
            return None;
        }
        Some(100.0 * (self.decision.value - baseline.similarity).abs() / baseline.similarity.abs())
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.relative_error().map(|e| 100.0 - e)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Encrypted duplicate check ===")?;
        match &self.baseline {
            Some(b) => writeln!(
                f,
                "Plaintext max similarity : {:.6} (vector {})",
                b.similarity, b.index
            )?,
            None => writeln!(f, "Plaintext max similarity : n/a")?,
        }
        writeln!(f, "Encrypted result         : {:.6}", self.decision.value)?;
        if let Some(error) = self.absolute_error() {
            writeln!(f, "Absolute error           : {:.6}", error)?;
        }
        if let Some(error) = self.relative_error() {
            writeln!(f, "Relative error           : {:.4}%", error)?;
        }
        if let Some(accuracy) = self.accuracy() {
            writeln!(f, "Accuracy                 : {:.2}%", accuracy)?;
        }
        writeln!(
            f,
            "Vectors processed        : {}{}",
            self.processed,
            if self.truncated { " (store truncated)" } else { "" }
        )?;
        writeln!(f, "Batches                  : {}", self.batches)?;
        writeln!(
            f,
            "Combinations             : {} approximate max, {} fallback",
            self.stats.approx_max, self.stats.fallback
        )?;
        writeln!(
            f,
            "Final level              : {}/{}",
            self.final_level, self.depth_budget
        )?;
        writeln!(
            f,
            "Decision                 : {} (threshold {})",
            self.decision, self.decision.threshold
        )?;
        write!(f, "Runtime                  : {:.3}s", self.runtime.as_secs_f64())?;

        if self.accuracy().is_some_and(|a| a < ACCURACY_WARNING) {
            write!(
                f,
                "\nWARNING: accuracy is below {}%, the approximate maximum is unreliable",
                ACCURACY_WARNING
            )?;
        }
        Ok(())
    }
}
