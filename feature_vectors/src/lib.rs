use log::debug;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Vectors with a norm below this are kept unscaled.
const MIN_NORM: f64 = 1e-10;

/// Unit-normalized biometric feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    /// Normalize `values` to unit Euclidean norm. A (near) zero vector is
    /// kept as-is since it has no direction.
    pub fn normalized(mut values: Vec<f64>) -> Self {
        let mut norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm < MIN_NORM {
            norm = 1.0;
        }
        values.iter_mut().for_each(|v| *v /= norm);
        FeatureVector(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Cosine similarity, since both vectors have unit norm
    pub fn dot(&self, other: &FeatureVector) -> f64 {
        self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum()
    }
}

/// Draw `count` unit vectors of dimension `dim` from a standard normal
/// distribution. The same seed always gives the same vectors.
pub fn synthesize(count: usize, dim: usize, seed: u64) -> Vec<FeatureVector> {
    debug!("Drawing {} vectors of dimension {} with seed {}", count, dim, seed);
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let values: Vec<f64> = (0..dim).map(|_| StandardNormal.sample(&mut rng)).collect();
            FeatureVector::normalized(values)
        })
        .collect()
}

/// Plaintext maximum similarity, used as a reference for the encrypted result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineMatch {
    pub index: usize,
    pub similarity: f64,
}

pub fn plaintext_max_similarity(
    query: &FeatureVector,
    database: &[FeatureVector],
) -> Option<BaselineMatch> {
    database
        .iter()
        .enumerate()
        .map(|(index, entry)| BaselineMatch {
            index,
            similarity: query.dot(entry),
        })
        .reduce(|best, m| if m.similarity > best.similarity { m } else { best })
}
