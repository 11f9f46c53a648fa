//! Classification scores and permutation importance

use crate::decoder::Decoder;
use pte_core::{PteError, PteResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Score reported for each fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    #[default]
    BalancedAccuracy,
    Accuracy,
}

impl Scoring {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scoring::BalancedAccuracy => "balanced_accuracy",
            Scoring::Accuracy => "accuracy",
        }
    }

    pub fn score(&self, y_true: &[u8], y_pred: &[u8]) -> f64 {
        match self {
            Scoring::BalancedAccuracy => balanced_accuracy(y_true, y_pred),
            Scoring::Accuracy => accuracy(y_true, y_pred),
        }
    }
}

impl FromStr for Scoring {
    type Err = PteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balanced_accuracy" => Ok(Scoring::BalancedAccuracy),
            "accuracy" => Ok(Scoring::Accuracy),
            other => Err(PteError::InvalidKeyword {
                kind: "scoring",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraction of correct predictions
pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Mean recall over the classes present in `y_true`
pub fn balanced_accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let mut classes: Vec<u8> = y_true.to_vec();
    classes.sort_unstable();
    classes.dedup();
    if classes.is_empty() {
        return f64::NAN;
    }
    let recalls: f64 = classes
        .iter()
        .map(|class| {
            let (hits, total) = y_true
                .iter()
                .zip(y_pred)
                .filter(|(t, _)| *t == class)
                .fold((0usize, 0usize), |(hits, total), (_, p)| (hits + usize::from(p == class), total + 1));
            hits as f64 / total as f64
        })
        .sum();
    recalls / classes.len() as f64
}

/// Mean drop of the decoder's score when each feature column is shuffled
///
/// Returns one value per column of `x`.
pub fn permutation_importance(
    decoder: &dyn Decoder,
    x: &[Vec<f64>],
    y: &[u8],
    n_repeats: usize,
    seed: u64,
) -> PteResult<Vec<f64>> {
    if n_repeats == 0 {
        return Err(PteError::InvalidParameter {
            name: "feature_importance",
            reason: "number of permutation repeats must be positive".to_string(),
        });
    }
    let baseline = decoder.score(x, y)?;
    let n_features = x.first().map(Vec::len).unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut permuted = x.to_vec();
    let mut importances = Vec::with_capacity(n_features);

    for feature in 0..n_features {
        let mut column: Vec<f64> = x.iter().map(|row| row[feature]).collect();
        let mut drop = 0.0;
        for _ in 0..n_repeats {
            column.shuffle(&mut rng);
            for (row, value) in permuted.iter_mut().zip(&column) {
                row[feature] = *value;
            }
            drop += baseline - decoder.score(&permuted, y)?;
        }
        for (row, original) in permuted.iter_mut().zip(x) {
            row[feature] = original[feature];
        }
        importances.push(drop / n_repeats as f64);
    }
    Ok(importances)
}
