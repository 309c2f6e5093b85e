use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::operators::ApproxMax;

/// Constants of the two combination operators.
///
/// The sign polynomial must stay within `[-1, 1]` for `|x| <= 2`, the widest
/// gap between two similarities, or the approximate max could leave the
/// range of its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproxSettings {
    /// `c1` in `sign(x) ~ c1*x + c3*x^3`
    pub sign_linear: f64,
    /// `c3` in `sign(x) ~ c1*x + c3*x^3`
    pub sign_cubic: f64,
    /// `k` in the fallback `0.5*(a+b) + k*(a-b)`, 0 is a plain average
    pub fallback_bias: f64,
}

impl Default for ApproxSettings {
    fn default() -> Self {
        Self {
            sign_linear: 1.5,
            sign_cubic: -0.5,
            fallback_bias: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Multiplicative depth budget `L`
    pub mult_depth: u32,
    /// Dimension `D` of every vector
    pub vec_dim: usize,
    /// Number `B` of scores reduced together
    pub batch_size: usize,
    /// Similarity at or above which the query is a duplicate
    pub threshold: f64,
    /// Number `n` of key share holders
    pub num_parties: usize,
    /// Number `t` of shares needed to decrypt
    pub threshold_t: usize,
    /// Levels kept in reserve before switching to the fallback operator
    pub depth_margin: u32,
    pub approx: ApproxSettings,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            mult_depth: 30,
            vec_dim: 512,
            batch_size: 512,
            threshold: 0.85,
            num_parties: 3,
            threshold_t: 2,
            depth_margin: 3,
            approx: ApproxSettings::default(),
        }
    }
}

/// Largest similarity gap the sign polynomial has to handle
const MAX_GAP: f64 = 2.0;

impl ApproxSettings {
    /// `max |c1*x + c3*x^3|` over `[0, 2]`, the polynomial being odd.
    pub fn sign_peak(&self) -> f64 {
        let sign = |x: f64| self.sign_linear * x + self.sign_cubic * x.powi(3);
        let mut peak = sign(MAX_GAP).abs();
        // Interior extremum where c1 + 3*c3*x^2 = 0
        if self.sign_cubic != 0.0 {
            let x2 = -self.sign_linear / (3.0 * self.sign_cubic);
            if x2 > 0.0 && x2 < MAX_GAP * MAX_GAP {
                peak = peak.max(sign(x2.sqrt()).abs());
            }
        }
        peak
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), MatchError> {
        let invalid = |msg: String| Err(MatchError::InvalidConfig(msg));

        if self.mult_depth == 0 {
            return invalid("the multiplicative depth must be at least 1".into());
        }
        if self.vec_dim == 0 {
            return invalid("vectors must have at least one coordinate".into());
        }
        if self.batch_size == 0 {
            return invalid("the batch size must be at least 1".into());
        }
        if !self.threshold.is_finite() {
            return invalid(format!("threshold {} is not a number", self.threshold));
        }
        if self.threshold_t == 0 || self.threshold_t > self.num_parties {
            return invalid(format!(
                "cannot require {} shares out of {} parties",
                self.threshold_t, self.num_parties
            ));
        }
        if self.depth_margin < ApproxMax::LEVEL_COST {
            return invalid(format!(
                "a depth margin of {} does not cover the {} levels of one approximate max",
                self.depth_margin,
                ApproxMax::LEVEL_COST
            ));
        }
        if self.depth_margin >= self.mult_depth {
            return invalid(format!(
                "a depth margin of {} leaves nothing of a budget of {}",
                self.depth_margin, self.mult_depth
            ));
        }
        if !self.approx.sign_linear.is_finite() || !self.approx.sign_cubic.is_finite() {
            return invalid("sign polynomial coefficients must be finite".into());
        }
        let peak = self.approx.sign_peak();
        if peak > 1.0 + 1e-9 {
            return invalid(format!(
                "sign polynomial reaches {:.4} on [-2, 2], it must stay within [-1, 1]",
                peak
            ));
        }
        if !(0.0..=0.5).contains(&self.approx.fallback_bias) {
            return invalid(format!(
                "fallback bias {} is outside [0, 0.5]",
                self.approx.fallback_bias
            ));
        }
        Ok(())
    }

    /// Slots needed to pack a vector and sum it with power-of-two rotations
    pub fn slot_count(&self) -> usize {
        self.batch_size.max(self.vec_dim).next_power_of_two()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slot_count(), 512);
    }

    #[test]
    fn test_slot_count() {
        let config = MatchConfig {
            vec_dim: 300,
            batch_size: 8,
            ..Default::default()
        };
        assert_eq!(config.slot_count(), 512);
    }

    #[test]
    fn test_sign_peak() {
        // 1.5x - 0.5x^3 peaks at exactly 1 for x = 1 and ends at -1 for x = 2
        assert!((ApproxSettings::default().sign_peak() - 1.0).abs() < 1e-12);

        let linear = ApproxSettings {
            sign_linear: 0.5,
            sign_cubic: 0.0,
            ..Default::default()
        };
        assert!((linear.sign_peak() - 1.0).abs() < 1e-12);
        assert!(
            MatchConfig {
                approx: linear,
                ..Default::default()
            }
            .validate()
            .is_ok()
        );

        let steep = ApproxSettings {
            sign_linear: 2.0,
            sign_cubic: -0.5,
            ..Default::default()
        };
        assert!(steep.sign_peak() > 1.5);
    }

    #[test]
    fn test_rejected_configs() {
        let bad = [
            MatchConfig {
                vec_dim: 0,
                ..Default::default()
            },
            MatchConfig {
                batch_size: 0,
                ..Default::default()
            },
            MatchConfig {
                threshold_t: 4,
                ..Default::default()
            },
            MatchConfig {
                threshold_t: 0,
                ..Default::default()
            },
            MatchConfig {
                depth_margin: 2,
                ..Default::default()
            },
            MatchConfig {
                mult_depth: 3,
                ..Default::default()
            },
            MatchConfig {
                threshold: f64::NAN,
                ..Default::default()
            },
            MatchConfig {
                approx: ApproxSettings {
                    sign_linear: 2.0,
                    ..Default::default()
                },
                ..Default::default()
            },
            MatchConfig {
                approx: ApproxSettings {
                    sign_linear: 1.0,
                    sign_cubic: 0.0,
                    ..Default::default()
                },
                ..Default::default()
            },
            MatchConfig {
                approx: ApproxSettings {
                    fallback_bias: 0.75,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(MatchError::InvalidConfig(_))),
                "{:?} should be rejected",
                config
            );
        }
    }
}
