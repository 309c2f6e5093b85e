use he::error::EngineError;
use he::traits::HomomorphicEngine;

use crate::config::ApproxSettings;
use crate::traits::CombineOperator;

/// `max(a, b) ~ 0.5*(a+b) + 0.5*sign(a-b)*(a-b)` with the odd polynomial
/// `sign(x) ~ c1*x + c3*x^3`.
///
/// With `d = a - b`, `sign(d)*d = c1*d^2 + c3*d^4` only has even powers, so
/// the whole expression is `0.5*(a+b) + 0.5*c1*d^2 + 0.5*c3*d^4`: three
/// levels (`d^2`, `d^4`, scaling) instead of the five a literal evaluation
/// would take. It is symmetric in `a` and `b`.
///
/// As long as `|sign(d)| <= 1` on the input range (true for the default
/// `1.5x - 0.5x^3` and `|d| <= 2`) the result stays between `min(a, b)` and
/// `max(a, b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproxMax {
    sign_linear: f64,
    sign_cubic: f64,
}

impl ApproxMax {
    pub const LEVEL_COST: u32 = 3;

    pub fn new(sign_linear: f64, sign_cubic: f64) -> Self {
        Self {
            sign_linear,
            sign_cubic,
        }
    }
}

impl From<&ApproxSettings> for ApproxMax {
    fn from(settings: &ApproxSettings) -> Self {
        Self::new(settings.sign_linear, settings.sign_cubic)
    }
}

impl CombineOperator for ApproxMax {
    fn level_cost(&self) -> u32 {
        Self::LEVEL_COST
    }

    fn combine<E: HomomorphicEngine>(
        &self,
        engine: &E,
        keys: &E::EvalKeys,
        a: &E::Ciphertext,
        b: &E::Ciphertext,
    ) -> Result<E::Ciphertext, EngineError> {
        let half_sum = engine.mult_scalar(&engine.add(a, b), 0.5);

        let diff = engine.sub(a, b);
        let diff2 = engine.mult(keys, &diff, &diff)?;
        let diff4 = engine.mult(keys, &diff2, &diff2)?;
        let spread = engine.add(
            &engine.mult_scalar(&diff2, 0.5 * self.sign_linear),
            &engine.mult_scalar(&diff4, 0.5 * self.sign_cubic),
        );

        Ok(engine.add(&half_sum, &spread))
    }
}

/// Cheap fallback `0.5*(a+b) + k*(a-b)`, a plain average when `k = 0`.
///
/// A non-zero bias tilts the result toward the left operand, which in the
/// reduction is always the older partial result.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearBlend {
    bias: f64,
}

impl LinearBlend {
    pub const LEVEL_COST: u32 = 1;

    pub fn new(bias: f64) -> Self {
        Self { bias }
    }

    pub fn average() -> Self {
        Self::new(0.0)
    }
}

impl CombineOperator for LinearBlend {
    fn level_cost(&self) -> u32 {
        Self::LEVEL_COST
    }

    fn combine<E: HomomorphicEngine>(
        &self,
        engine: &E,
        _keys: &E::EvalKeys,
        a: &E::Ciphertext,
        b: &E::Ciphertext,
    ) -> Result<E::Ciphertext, EngineError> {
        let half_sum = engine.mult_scalar(&engine.add(a, b), 0.5);
        if self.bias == 0.0 {
            return Ok(half_sum);
        }

        let tilt = engine.mult_scalar(&engine.sub(a, b), self.bias);
        Ok(engine.add(&half_sum, &tilt))
    }
}
