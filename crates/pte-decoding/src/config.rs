//! Configuration of decoding runs

use crate::channels::ChannelSelection;
use crate::cross_validation::CrossValidation;
use crate::decoder::{Balancing, PredictionMode};
use crate::epochs::TargetBoundary;
use crate::metrics::Scoring;
use pte_core::{param_error, PteError, PteResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Feature importance reported per fold: `false`, `true` (coefficients) or a repeat count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ImportanceRepr", into = "ImportanceRepr")]
pub enum FeatureImportance {
    #[default]
    None,
    /// Weights of the fitted model
    Coefficients,
    /// Permutation importance with this many repeats
    Permutation(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ImportanceRepr {
    Flag(bool),
    Repeats(i64),
}

impl TryFrom<ImportanceRepr> for FeatureImportance {
    type Error = String;

    fn try_from(repr: ImportanceRepr) -> Result<Self, Self::Error> {
        match repr {
            ImportanceRepr::Flag(false) => Ok(FeatureImportance::None),
            ImportanceRepr::Flag(true) => Ok(FeatureImportance::Coefficients),
            ImportanceRepr::Repeats(n) if n > 0 => Ok(FeatureImportance::Permutation(n as usize)),
            ImportanceRepr::Repeats(n) => Err(format!(
                "`feature_importance` must be a positive integer or a boolean, got {}",
                n
            )),
        }
    }
}

impl From<FeatureImportance> for ImportanceRepr {
    fn from(importance: FeatureImportance) -> Self {
        match importance {
            FeatureImportance::None => ImportanceRepr::Flag(false),
            FeatureImportance::Coefficients => ImportanceRepr::Flag(true),
            FeatureImportance::Permutation(n) => ImportanceRepr::Repeats(n as i64),
        }
    }
}

/// Parameters of one decoding experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Sampling rate of the feature time series (taken from the settings file when decoding files)
    pub sfreq: f64,
    pub classifier: String,
    pub balancing: Balancing,
    pub scoring: Scoring,
    /// Search the classifier's hyper-parameter in an inner loop
    pub optimize: bool,
    pub target_begin: TargetBoundary,
    pub target_end: TargetBoundary,
    /// Seconds between the rest window and the trial onset
    pub dist_onset: f64,
    /// Seconds between the previous trial's end and the rest window
    pub dist_end: f64,
    /// Output paths containing any of these use `excep_dist_end`
    pub exception_files: Vec<String>,
    pub excep_dist_end: f64,
    pub use_channels: ChannelSelection,
    /// Time-locked prediction window around trial onset, in seconds
    pub pred_begin: f64,
    pub pred_end: f64,
    pub pred_mode: PredictionMode,
    pub cv_outer: CrossValidation,
    /// Used to pick the best channel per type for `single_best`
    pub cv_inner: CrossValidation,
    pub feature_importance: FeatureImportance,
    /// Write an HTML plot of the mean time-locked predictions
    pub plot: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sfreq: 10.0,
            classifier: "lda".to_string(),
            balancing: Balancing::Oversample,
            scoring: Scoring::BalancedAccuracy,
            optimize: false,
            target_begin: TargetBoundary::TrialOnset,
            target_end: TargetBoundary::TrialEnd,
            dist_onset: 2.0,
            dist_end: 2.0,
            exception_files: Vec::new(),
            excep_dist_end: 0.0,
            use_channels: ChannelSelection::Single,
            pred_begin: -3.0,
            pred_end: 3.0,
            pred_mode: PredictionMode::Classification,
            cv_outer: CrossValidation::GroupKFold { n_splits: 5 },
            cv_inner: CrossValidation::GroupKFold { n_splits: 5 },
            feature_importance: FeatureImportance::None,
            plot: false,
        }
    }
}

impl RunnerConfig {
    /// Defaults used when decoding feature files from a [`DecodingConfig`]
    pub fn for_decoding() -> Self {
        Self {
            dist_end: 0.5,
            excep_dist_end: 0.5,
            pred_end: 2.0,
            plot: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PteResult<()> {
        if !(self.sfreq > 0.0) {
            return Err(param_error!("sfreq", "must be positive, got {}", self.sfreq));
        }
        if self.target_begin == TargetBoundary::TrialEnd {
            return Err(param_error!("target_begin", "`trial_end` can only end the target window"));
        }
        if let (Some(begin), Some(end)) = (self.target_begin.seconds(), self.target_end.seconds()) {
            if end <= begin {
                return Err(param_error!("target_end", "must lie after target_begin ({} <= {})", end, begin));
            }
        }
        if self.pred_end < self.pred_begin {
            return Err(param_error!(
                "pred_end",
                "must not lie before pred_begin ({} < {})",
                self.pred_end,
                self.pred_begin
            ));
        }
        for (name, value) in [("dist_onset", self.dist_onset), ("dist_end", self.dist_end), ("excep_dist_end", self.excep_dist_end)] {
            if !value.is_finite() || value < 0.0 {
                return Err(PteError::InvalidParameter {
                    name: "dist",
                    reason: format!("{} must be a non-negative number, got {}", name, value),
                });
            }
        }
        Ok(())
    }
}

/// Everything needed to decode a feature file, read from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingConfig {
    /// Candidate label channels; the first present in the features is used
    pub label_channels: Vec<String>,
    /// Channels plotted as the target; the first match (case-insensitive substring) is used
    pub target_channels: Vec<String>,
    /// Feature column substrings to decode from
    pub use_features: Vec<String>,
    /// Number of 100 ms feature lags
    pub use_times: usize,
    /// Channels marking artifacts (non-zero = artifact)
    pub artifact_channels: Vec<String>,
    /// Bad-epochs CSV, or a directory of `<file>_bad_epochs.csv`
    pub bad_events_path: Option<PathBuf>,
    /// Missing keys fall back to [`RunnerConfig::for_decoding`]
    #[serde(flatten, deserialize_with = "decoding_runner")]
    pub runner: RunnerConfig,
}

fn decoding_runner<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RunnerConfig, D::Error> {
    let overrides = Map::<String, Value>::deserialize(deserializer)?;
    let mut merged = match serde_json::to_value(RunnerConfig::for_decoding()).map_err(D::Error::custom)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    merged.extend(overrides);
    serde_json::from_value(Value::Object(merged)).map_err(D::Error::custom)
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            label_channels: vec!["ANALOG_R_ROTA_CH".to_string(), "ANALOG_L_ROTA_CH".to_string()],
            target_channels: vec!["ANALOG_R_ROTA_CH".to_string(), "ANALOG_L_ROTA_CH".to_string()],
            use_features: vec!["fft".to_string()],
            use_times: 1,
            artifact_channels: Vec::new(),
            bad_events_path: None,
            runner: RunnerConfig::for_decoding(),
        }
    }
}

impl DecodingConfig {
    pub fn validate(&self) -> PteResult<()> {
        if self.label_channels.is_empty() {
            return Err(param_error!("label_channels", "at least one label channel must be given"));
        }
        if self.target_channels.is_empty() {
            return Err(param_error!("target_channels", "at least one target channel must be given"));
        }
        if self.use_features.is_empty() {
            return Err(param_error!("use_features", "at least one feature must be given"));
        }
        if self.use_times == 0 {
            return Err(param_error!("use_times", "must be at least 1"));
        }
        self.runner.validate()
    }

    pub fn to_json(&self) -> PteResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PteError::SerializationError {
            reason: format!("Failed to serialize decoding configuration: {}", e),
        })
    }

    pub fn from_json(json: &str) -> PteResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> PteResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PteError::io(path, e))?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PteResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|e| PteError::io(path, e))
    }
}
