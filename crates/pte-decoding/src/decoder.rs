//! Linear two-class decoders
//!
//! Labels are 0 (rest) and 1 (target). Both models reduce to a weight
//! vector and an intercept; the decision value is `w·x + b` and the
//! class-1 probability is its logistic sigmoid.

use crate::cross_validation::{CrossValidator, GroupKFold};
use crate::metrics::Scoring;
use nalgebra::{DMatrix, DVector};
use pte_core::{param_error, PteError, PteResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Seed of the resampling RNG unless set explicitly
pub const DEFAULT_SEED: u64 = 42;

/// Folds of the hyper-parameter search
const INNER_FOLDS: usize = 3;

/// Interface shared by all decoders
pub trait Decoder: Send {
    /// Fit on rows `x` with labels `y`; `groups` mark trials for inner cross-validation
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8], groups: &[usize]) -> PteResult<()>;

    fn predict(&self, x: &[Vec<f64>]) -> PteResult<Vec<u8>>;

    /// Probability of class 1
    fn predict_proba(&self, x: &[Vec<f64>]) -> PteResult<Vec<f64>>;

    fn decision_function(&self, x: &[Vec<f64>]) -> PteResult<Vec<f64>>;

    fn scoring(&self) -> Scoring;

    /// Configured score of the predictions for `x` against `y`
    fn score(&self, x: &[Vec<f64>], y: &[u8]) -> PteResult<f64> {
        Ok(self.scoring().score(y, &self.predict(x)?))
    }

    /// Weights of the fitted model, one per feature
    fn coefficients(&self) -> Option<Vec<f64>>;

    fn name(&self) -> &str;

    /// Per-row output in the requested mode
    fn predict_mode(&self, x: &[Vec<f64>], mode: PredictionMode) -> PteResult<Vec<f64>> {
        match mode {
            PredictionMode::Classification => Ok(self.predict(x)?.into_iter().map(f64::from).collect()),
            PredictionMode::Probability => self.predict_proba(x),
            PredictionMode::DecisionFunction => self.decision_function(x),
        }
    }
}

/// What is stored as a prediction for each sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMode {
    #[default]
    #[serde(alias = "classify")]
    Classification,
    Probability,
    DecisionFunction,
}

impl FromStr for PredictionMode {
    type Err = PteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classify" | "classification" => Ok(PredictionMode::Classification),
            "probability" => Ok(PredictionMode::Probability),
            "decision_function" => Ok(PredictionMode::DecisionFunction),
            other => Err(PteError::InvalidKeyword {
                kind: "pred_mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Resampling of the training set toward equal class counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Balancing {
    /// Draw minority rows with replacement until the classes match
    #[default]
    Oversample,
    /// Keep a random subset of the majority class
    Undersample,
    None,
}

impl FromStr for Balancing {
    type Err = PteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oversample" => Ok(Balancing::Oversample),
            "undersample" => Ok(Balancing::Undersample),
            "none" | "false" => Ok(Balancing::None),
            other => Err(PteError::InvalidKeyword {
                kind: "balancing",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Balancing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balancing::Oversample => write!(f, "oversample"),
            Balancing::Undersample => write!(f, "undersample"),
            Balancing::None => write!(f, "none"),
        }
    }
}

impl Balancing {
    /// Row indices of the resampled training set
    pub fn resample<R: Rng>(&self, y: &[u8], rng: &mut R) -> Vec<usize> {
        let zeros: Vec<usize> = (0..y.len()).filter(|&i| y[i] == 0).collect();
        let ones: Vec<usize> = (0..y.len()).filter(|&i| y[i] != 0).collect();
        if zeros.is_empty() || ones.is_empty() || zeros.len() == ones.len() {
            return (0..y.len()).collect();
        }
        let (minority, majority) = if zeros.len() < ones.len() { (&zeros, &ones) } else { (&ones, &zeros) };

        match self {
            Balancing::None => (0..y.len()).collect(),
            Balancing::Oversample => {
                let mut indices: Vec<usize> = (0..y.len()).collect();
                indices.extend((0..majority.len() - minority.len()).map(|_| minority[rng.gen_range(0..minority.len())]));
                indices
            }
            Balancing::Undersample => {
                let mut kept: Vec<usize> = majority.choose_multiple(rng, minority.len()).copied().collect();
                kept.extend(minority.iter().copied());
                kept.sort_unstable();
                kept
            }
        }
    }
}

/// Weights and intercept of a fitted linear model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn decision(&self, row: &[f64]) -> f64 {
        self.coef.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + self.intercept
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn to_matrix(x: &[Vec<f64>]) -> PteResult<DMatrix<f64>> {
    let n_features = x.first().map(Vec::len).unwrap_or(0);
    if let Some(row) = x.iter().find(|row| row.len() != n_features) {
        return Err(PteError::DimensionMismatch {
            what: "feature row length",
            expected: n_features,
            actual: row.len(),
        });
    }
    Ok(DMatrix::from_fn(x.len(), n_features, |i, j| x[i][j]))
}

/// Solve `a · X = b`, falling back to the pseudo-inverse for singular `a`
fn solve(a: &DMatrix<f64>, b: &DMatrix<f64>) -> PteResult<DMatrix<f64>> {
    if let Some(solution) = a.clone().lu().solve(b) {
        if solution.iter().all(|v| v.is_finite()) {
            return Ok(solution);
        }
    }
    let pinv = a.clone().pseudo_inverse(1e-12).map_err(|e| PteError::ModelError {
        reason: format!("pseudo-inverse failed: {}", e),
    })?;
    Ok(pinv * b)
}

/// A linear model family with a single regularisation hyper-parameter
pub trait LinearEstimator: Send + Sync + Default + fmt::Debug {
    const NAME: &'static str;
    /// Hyper-parameter used without optimisation
    const DEFAULT_PARAM: f64;
    /// Values searched when optimising
    const GRID: &'static [f64];

    fn fit_model(&self, x: &DMatrix<f64>, y: &[u8], param: f64) -> PteResult<LinearModel>;
}

/// Linear discriminant analysis; the parameter is the shrinkage in `[0, 1]`
#[derive(Debug, Clone, Copy, Default)]
pub struct Lda;

impl LinearEstimator for Lda {
    const NAME: &'static str = "LDA";
    const DEFAULT_PARAM: f64 = 0.0;
    const GRID: &'static [f64] = &[0.0, 0.1, 0.3, 0.5, 0.7, 0.9];

    fn fit_model(&self, x: &DMatrix<f64>, y: &[u8], shrinkage: f64) -> PteResult<LinearModel> {
        let (n, p) = x.shape();
        let mut means = DMatrix::<f64>::zeros(p, 2);
        let mut counts = [0usize; 2];
        for (i, label) in y.iter().enumerate() {
            let k = usize::from(*label != 0);
            counts[k] += 1;
            for j in 0..p {
                means[(j, k)] += x[(i, j)];
            }
        }
        if counts.contains(&0) {
            return Err(PteError::ModelError {
                reason: "LDA needs samples of both classes".to_string(),
            });
        }
        for k in 0..2 {
            for j in 0..p {
                means[(j, k)] /= counts[k] as f64;
            }
        }

        // prior-weighted within-class covariance
        let mut cov = DMatrix::<f64>::zeros(p, p);
        for (i, label) in y.iter().enumerate() {
            let k = usize::from(*label != 0);
            let centered = DVector::from_fn(p, |j, _| x[(i, j)] - means[(j, k)]);
            cov += (&centered * centered.transpose()) / n as f64;
        }
        if shrinkage > 0.0 {
            let mu = cov.trace() / p as f64;
            cov = cov * (1.0 - shrinkage) + DMatrix::<f64>::identity(p, p) * (shrinkage * mu);
        }

        let scaled_means = solve(&cov, &means)?;
        let quad = |k: usize| means.column(k).dot(&scaled_means.column(k));
        let coef: Vec<f64> = (0..p).map(|j| scaled_means[(j, 1)] - scaled_means[(j, 0)]).collect();
        let intercept = -0.5 * (quad(1) - quad(0)) + (counts[1] as f64 / counts[0] as f64).ln();
        Ok(LinearModel { coef, intercept })
    }
}

/// L2-regularised logistic regression; the parameter is the inverse strength `C`
#[derive(Debug, Clone, Copy, Default)]
pub struct Logistic;

impl Logistic {
    const MAX_ITER: usize = 100;
    const TOL: f64 = 1e-8;
}

impl LinearEstimator for Logistic {
    const NAME: &'static str = "LogisticRegression";
    const DEFAULT_PARAM: f64 = 1.0;
    const GRID: &'static [f64] = &[0.01, 0.1, 1.0, 10.0, 100.0];

    fn fit_model(&self, x: &DMatrix<f64>, y: &[u8], c: f64) -> PteResult<LinearModel> {
        if !(c > 0.0) {
            return Err(param_error!("C", "must be positive, got {}", c));
        }
        let (n, p) = x.shape();
        let lambda = 1.0 / c;
        // design matrix with a trailing intercept column
        let design = DMatrix::from_fn(n, p + 1, |i, j| if j < p { x[(i, j)] } else { 1.0 });
        let target = DVector::from_iterator(n, y.iter().map(|v| f64::from(u8::from(*v != 0))));
        let mut beta = DVector::<f64>::zeros(p + 1);

        for iteration in 0..Self::MAX_ITER {
            let mu = (&design * &beta).map(sigmoid);
            let mut gradient = design.transpose() * (&mu - &target);
            let weights = mu.map(|m| (m * (1.0 - m)).max(1e-12));
            let weighted = DMatrix::from_fn(n, p + 1, |i, j| design[(i, j)] * weights[i]);
            let mut hessian = design.transpose() * weighted;
            for j in 0..p {
                gradient[j] += lambda * beta[j];
                hessian[(j, j)] += lambda;
            }
            hessian[(p, p)] += 1e-10;

            let step = match hessian.clone().cholesky() {
                Some(chol) => chol.solve(&gradient),
                None => solve(&hessian, &DMatrix::from_column_slice(p + 1, 1, gradient.as_slice()))?.column(0).into_owned(),
            };
            beta -= &step;
            if step.amax() < Self::TOL {
                tracing::trace!(iteration, "Logistic regression converged");
                break;
            }
        }

        if beta.iter().any(|v| !v.is_finite()) {
            return Err(PteError::ModelError {
                reason: "logistic regression diverged".to_string(),
            });
        }
        Ok(LinearModel {
            coef: beta.rows(0, p).iter().copied().collect(),
            intercept: beta[p],
        })
    }
}

/// Decoder around a linear estimator, with balancing and optional grid search
#[derive(Debug, Clone)]
pub struct LinearDecoder<E: LinearEstimator> {
    estimator: E,
    scoring: Scoring,
    balancing: Balancing,
    optimize: bool,
    seed: u64,
    param: f64,
    model: Option<LinearModel>,
}

pub type LdaDecoder = LinearDecoder<Lda>;
pub type LogisticDecoder = LinearDecoder<Logistic>;

impl<E: LinearEstimator> LinearDecoder<E> {
    pub fn new(scoring: Scoring, balancing: Balancing, optimize: bool) -> Self {
        Self {
            estimator: E::default(),
            scoring,
            balancing,
            optimize,
            seed: DEFAULT_SEED,
            param: E::DEFAULT_PARAM,
            model: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fix the hyper-parameter used when not optimising
    pub fn with_param(mut self, param: f64) -> Self {
        self.param = param;
        self
    }

    /// Hyper-parameter of the last fit
    pub fn param(&self) -> f64 {
        self.param
    }

    pub fn model(&self) -> Option<&LinearModel> {
        self.model.as_ref()
    }

    fn fitted(&self) -> PteResult<&LinearModel> {
        self.model.as_ref().ok_or_else(|| PteError::ModelError {
            reason: format!("{} decoder has not been fitted", E::NAME),
        })
    }

    /// Balance, then fit on the selected rows
    fn fit_rows(&self, x: &DMatrix<f64>, y: &[u8], rows: &[usize], param: f64, rng: &mut StdRng) -> PteResult<LinearModel> {
        let y_rows: Vec<u8> = rows.iter().map(|&i| y[i]).collect();
        let balanced: Vec<usize> = self.balancing.resample(&y_rows, rng).into_iter().map(|i| rows[i]).collect();
        let x_fit = x.select_rows(balanced.iter());
        let y_fit: Vec<u8> = balanced.iter().map(|&i| y[i]).collect();
        self.estimator.fit_model(&x_fit, &y_fit, param)
    }

    /// Hyper-parameter with the best mean inner-fold score
    fn search_param(&self, x: &DMatrix<f64>, y: &[u8], groups: &[usize], rng: &mut StdRng) -> PteResult<f64> {
        let n_groups = groups.iter().collect::<BTreeSet<_>>().len();
        if n_groups < INNER_FOLDS {
            tracing::debug!(n_groups, "Too few groups for hyper-parameter search, using default");
            return Ok(self.param);
        }
        let folds = GroupKFold::new(INNER_FOLDS).split(groups)?;

        let mut best = (f64::NEG_INFINITY, self.param);
        for &param in E::GRID {
            let mut total = 0.0;
            for fold in &folds {
                let model = self.fit_rows(x, y, &fold.train, param, rng)?;
                let y_true: Vec<u8> = fold.test.iter().map(|&i| y[i]).collect();
                let y_pred: Vec<u8> = fold
                    .test
                    .iter()
                    .map(|&i| {
                        let row: Vec<f64> = x.row(i).iter().copied().collect();
                        u8::from(model.decision(&row) > 0.0)
                    })
                    .collect();
                total += self.scoring.score(&y_true, &y_pred);
            }
            let mean = total / folds.len() as f64;
            tracing::trace!(param, score = mean, "Inner fold score");
            if mean > best.0 {
                best = (mean, param);
            }
        }
        tracing::debug!(estimator = E::NAME, param = best.1, score = best.0, "Selected hyper-parameter");
        Ok(best.1)
    }
}

impl<E: LinearEstimator> Decoder for LinearDecoder<E> {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8], groups: &[usize]) -> PteResult<()> {
        if x.len() != y.len() {
            return Err(PteError::DimensionMismatch {
                what: "labels",
                expected: x.len(),
                actual: y.len(),
            });
        }
        if groups.len() != y.len() {
            return Err(PteError::DimensionMismatch {
                what: "groups",
                expected: y.len(),
                actual: groups.len(),
            });
        }
        let matrix = to_matrix(x)?;
        if matrix.ncols() == 0 || matrix.nrows() == 0 {
            return Err(PteError::ModelError {
                reason: format!("{} cannot be fitted without samples and features", E::NAME),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        if self.optimize {
            self.param = self.search_param(&matrix, y, groups, &mut rng)?;
        }
        let rows: Vec<usize> = (0..y.len()).collect();
        self.model = Some(self.fit_rows(&matrix, y, &rows, self.param, &mut rng)?);
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> PteResult<Vec<u8>> {
        Ok(self.decision_function(x)?.into_iter().map(|d| u8::from(d > 0.0)).collect())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> PteResult<Vec<f64>> {
        Ok(self.decision_function(x)?.into_iter().map(sigmoid).collect())
    }

    fn decision_function(&self, x: &[Vec<f64>]) -> PteResult<Vec<f64>> {
        let model = self.fitted()?;
        x.iter()
            .map(|row| {
                if row.len() != model.coef.len() {
                    return Err(PteError::DimensionMismatch {
                        what: "feature row length",
                        expected: model.coef.len(),
                        actual: row.len(),
                    });
                }
                Ok(model.decision(row))
            })
            .collect()
    }

    fn scoring(&self) -> Scoring {
        self.scoring
    }

    fn coefficients(&self) -> Option<Vec<f64>> {
        self.model.as_ref().map(|m| m.coef.clone())
    }

    fn name(&self) -> &str {
        E::NAME
    }
}

/// Build a decoder by classifier name (`lda`, `logistic` or `lr`)
pub fn get_decoder(classifier: &str, scoring: Scoring, balancing: Balancing, optimize: bool) -> PteResult<Box<dyn Decoder>> {
    match classifier.to_lowercase().as_str() {
        "lda" => Ok(Box::new(LdaDecoder::new(scoring, balancing, optimize))),
        "logistic" | "lr" => Ok(Box::new(LogisticDecoder::new(scoring, balancing, optimize))),
        other => Err(param_error!("classifier", "unknown classifier `{}`, expected lda or logistic", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Box-Muller
    fn gaussian(rng: &mut StdRng) -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Two gaussian clouds separated along the first feature, five rows per group
    fn clouds(n_per_class: usize, shift: f64, seed: u64) -> (Vec<Vec<f64>>, Vec<u8>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Vec::new();
        let mut y = Vec::new();
        for class in 0..2u8 {
            for _ in 0..n_per_class {
                let offset = if class == 1 { shift } else { -shift };
                x.push(vec![offset + gaussian(&mut rng), gaussian(&mut rng)]);
                y.push(class);
            }
        }
        let groups = (0..x.len()).map(|i| i / 5).collect();
        (x, y, groups)
    }

    #[test]
    fn test_lda_separates_clouds() {
        let (x, y, groups) = clouds(50, 2.0, 1);
        let mut decoder = LdaDecoder::new(Scoring::BalancedAccuracy, Balancing::None, false);
        decoder.fit(&x, &y, &groups).unwrap();
        assert!(decoder.score(&x, &y).unwrap() > 0.9);

        let coef = decoder.coefficients().unwrap();
        assert!(coef[0] > 0.0);
        assert!(coef[0].abs() > 2.0 * coef[1].abs());
    }

    #[test]
    fn test_lda_matches_closed_form() {
        // equal priors, identity covariance: w = mu1 - mu0, b = -0.5 (|mu1|² - |mu0|²)
        let x = vec![vec![0.0], vec![2.0], vec![4.0], vec![6.0]];
        let y = vec![0, 0, 1, 1];
        let model = Lda.fit_model(&to_matrix(&x).unwrap(), &y, 0.0).unwrap();
        assert!((model.coef[0] - 4.0).abs() < 1e-9);
        assert!((model.intercept - -12.0).abs() < 1e-9);
        assert!(model.decision(&[3.0]).abs() < 1e-9);
    }

    #[test]
    fn test_lda_singular_covariance() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 1.0]).collect();
        let y: Vec<u8> = (0..10).map(|i| u8::from(i >= 5)).collect();
        let mut decoder = LdaDecoder::new(Scoring::Accuracy, Balancing::None, false);
        decoder.fit(&x, &y, &[0; 10]).unwrap();
        assert_eq!(decoder.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_logistic_separates_clouds() {
        let (x, y, groups) = clouds(50, 1.5, 2);
        let mut decoder = LogisticDecoder::new(Scoring::Accuracy, Balancing::None, false);
        decoder.fit(&x, &y, &groups).unwrap();
        assert!(decoder.score(&x, &y).unwrap() > 0.85);

        let proba = decoder.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        let predicted = decoder.predict(&x).unwrap();
        for (p, c) in proba.iter().zip(&predicted) {
            assert_eq!(*c, u8::from(*p > 0.5));
        }
    }

    #[test]
    fn test_logistic_separable_stays_finite() {
        let x = vec![vec![-1.0], vec![-0.5], vec![0.5], vec![1.0]];
        let y = vec![0, 0, 1, 1];
        let model = Logistic.fit_model(&to_matrix(&x).unwrap(), &y, 1.0).unwrap();
        assert!(model.coef[0].is_finite() && model.coef[0] > 0.0);
        assert!(model.intercept.abs() < 1e-6);
    }

    #[test]
    fn test_balancing() {
        let y = vec![0, 0, 0, 0, 1];
        let mut rng = StdRng::seed_from_u64(0);

        let over = Balancing::Oversample.resample(&y, &mut rng);
        assert_eq!(over.len(), 8);
        assert_eq!(over.iter().filter(|&&i| y[i] == 1).count(), 4);

        let under = Balancing::Undersample.resample(&y, &mut rng);
        assert_eq!(under.len(), 2);
        assert!(under.contains(&4));

        assert_eq!(Balancing::None.resample(&y, &mut rng), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_optimize_picks_grid_value() {
        let (x, y, groups) = clouds(30, 1.0, 3);
        let mut decoder = LdaDecoder::new(Scoring::BalancedAccuracy, Balancing::Oversample, true);
        decoder.fit(&x, &y, &groups).unwrap();
        assert!(Lda::GRID.contains(&decoder.param()));
        assert!(decoder.score(&x, &y).unwrap() > 0.7);
    }

    #[test]
    fn test_get_decoder() {
        assert_eq!(get_decoder("LDA", Scoring::Accuracy, Balancing::None, false).unwrap().name(), "LDA");
        assert_eq!(
            get_decoder("lr", Scoring::Accuracy, Balancing::None, false).unwrap().name(),
            "LogisticRegression"
        );
        let err = get_decoder("xgb", Scoring::Accuracy, Balancing::None, false).err().unwrap();
        assert!(matches!(err, PteError::InvalidParameter { name: "classifier", .. }));
    }

    #[test]
    fn test_unfitted_and_modes() {
        let decoder = LdaDecoder::new(Scoring::Accuracy, Balancing::None, false);
        assert!(matches!(decoder.predict(&[vec![1.0]]), Err(PteError::ModelError { .. })));

        let mut fitted = LdaDecoder::new(Scoring::Accuracy, Balancing::None, false);
        fitted.fit(&[vec![0.0], vec![2.0], vec![4.0], vec![6.0]], &[0, 0, 1, 1], &[0, 1, 2, 3]).unwrap();
        let rows = vec![vec![6.0]];
        assert_eq!(fitted.predict_mode(&rows, PredictionMode::Classification).unwrap(), vec![1.0]);
        assert_eq!(fitted.predict_mode(&rows, PredictionMode::DecisionFunction).unwrap(), vec![12.0]);
        assert_eq!("classify".parse::<PredictionMode>().unwrap(), PredictionMode::Classification);
    }
}
