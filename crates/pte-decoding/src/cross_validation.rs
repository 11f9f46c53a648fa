//! Group-aware cross-validation splitters
//!
//! Rows of one trial share a group; no splitter puts a group on both
//! sides of a fold.

use pte_core::{param_error, PteError, PteResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row indices of one train/test split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Splits rows into train/test folds by group
pub trait CrossValidator: Send + Sync {
    fn split(&self, groups: &[usize]) -> PteResult<Vec<Fold>>;

    fn name(&self) -> &'static str;
}

/// Sorted unique groups with their row indices
fn group_rows(groups: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut rows: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, g) in groups.iter().enumerate() {
        rows.entry(*g).or_default().push(i);
    }
    rows
}

fn fold_from_test_groups(groups: &[usize], is_test: impl Fn(usize) -> bool) -> Fold {
    let (test, train): (Vec<usize>, Vec<usize>) = (0..groups.len()).partition(|&i| is_test(groups[i]));
    Fold { train, test }
}

/// K folds of roughly equal size, each group in exactly one test fold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupKFold {
    pub n_splits: usize,
}

impl GroupKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }
}

impl CrossValidator for GroupKFold {
    fn split(&self, groups: &[usize]) -> PteResult<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(param_error!("n_splits", "GroupKFold needs at least 2 splits, got {}", self.n_splits));
        }
        let rows = group_rows(groups);
        if rows.len() < self.n_splits {
            return Err(param_error!(
                "n_splits",
                "cannot have number of splits {} greater than the number of groups {}",
                self.n_splits,
                rows.len()
            ));
        }

        // largest groups first, each into the currently lightest fold
        let mut by_size: Vec<(usize, usize)> = rows.iter().map(|(g, r)| (*g, r.len())).collect();
        by_size.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut weights = vec![0usize; self.n_splits];
        let mut fold_of: BTreeMap<usize, usize> = BTreeMap::new();
        for (group, size) in by_size {
            let lightest = weights
                .iter()
                .enumerate()
                .min_by_key(|(i, w)| (**w, *i))
                .map(|(i, _)| i)
                .unwrap_or(0);
            weights[lightest] += size;
            fold_of.insert(group, lightest);
        }

        Ok((0..self.n_splits)
            .map(|fold| fold_from_test_groups(groups, |g| fold_of.get(&g) == Some(&fold)))
            .collect())
    }

    fn name(&self) -> &'static str {
        "GroupKFold"
    }
}

/// One fold per group, testing on that group alone
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LeaveOneGroupOut;

impl CrossValidator for LeaveOneGroupOut {
    fn split(&self, groups: &[usize]) -> PteResult<Vec<Fold>> {
        let rows = group_rows(groups);
        if rows.len() < 2 {
            return Err(param_error!("groups", "LeaveOneGroupOut needs at least 2 groups, got {}", rows.len()));
        }
        Ok(rows.keys().map(|&test| fold_from_test_groups(groups, |g| g == test)).collect())
    }

    fn name(&self) -> &'static str {
        "LeaveOneGroupOut"
    }
}

/// Random group splits with a fixed share of test groups
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupShuffleSplit {
    pub n_splits: usize,
    pub test_size: f64,
    pub seed: u64,
}

impl GroupShuffleSplit {
    pub fn new(n_splits: usize, test_size: f64, seed: u64) -> Self {
        Self { n_splits, test_size, seed }
    }
}

impl CrossValidator for GroupShuffleSplit {
    fn split(&self, groups: &[usize]) -> PteResult<Vec<Fold>> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(param_error!("test_size", "must lie in (0, 1), got {}", self.test_size));
        }
        let unique: Vec<usize> = group_rows(groups).into_keys().collect();
        let n_test = (self.test_size * unique.len() as f64).ceil() as usize;
        if n_test == 0 || n_test >= unique.len() {
            return Err(PteError::InvalidParameter {
                name: "test_size",
                reason: format!(
                    "test_size {} leaves no training groups out of {}",
                    self.test_size,
                    unique.len()
                ),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok((0..self.n_splits)
            .map(|_| {
                let mut shuffled = unique.clone();
                shuffled.shuffle(&mut rng);
                let test = &shuffled[..n_test];
                fold_from_test_groups(groups, |g| test.contains(&g))
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "GroupShuffleSplit"
    }
}

/// Serialisable choice of splitter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrossValidation {
    GroupKFold {
        n_splits: usize,
    },
    LeaveOneGroupOut,
    GroupShuffleSplit {
        n_splits: usize,
        test_size: f64,
        #[serde(default)]
        seed: u64,
    },
}

impl Default for CrossValidation {
    fn default() -> Self {
        CrossValidation::GroupKFold { n_splits: 5 }
    }
}

impl CrossValidator for CrossValidation {
    fn split(&self, groups: &[usize]) -> PteResult<Vec<Fold>> {
        match *self {
            CrossValidation::GroupKFold { n_splits } => GroupKFold::new(n_splits).split(groups),
            CrossValidation::LeaveOneGroupOut => LeaveOneGroupOut.split(groups),
            CrossValidation::GroupShuffleSplit {
                n_splits,
                test_size,
                seed,
            } => GroupShuffleSplit::new(n_splits, test_size, seed).split(groups),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CrossValidation::GroupKFold { .. } => "GroupKFold",
            CrossValidation::LeaveOneGroupOut => "LeaveOneGroupOut",
            CrossValidation::GroupShuffleSplit { .. } => "GroupShuffleSplit",
        }
    }
}
