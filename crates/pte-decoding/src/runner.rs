//! Decoding experiments: cross-validated decoding of one feature file
//!
//! A [`Runner`] epochs the features around the trials of a label channel,
//! cross-validates one decoder per channel pick and writes four files next
//! to its output stem:
//!
//! - `<stem>_results.csv`: one row per fold and channel pick
//! - `<stem>_predictions_timelocked.json`: predictions around every test trial
//! - `<stem>_features_timelocked.json`: the features behind those predictions
//! - `<stem>_features_concatenated.csv`: every epoched row with its label

use crate::channels::{ch_picks, init_channel_names, init_result_keys, side_from_path, ChannelSelection};
use crate::config::{DecodingConfig, FeatureImportance, RunnerConfig};
use crate::cross_validation::{CrossValidator, Fold};
use crate::decoder::{get_decoder, Decoder, DEFAULT_SEED};
use crate::epochs::{get_feat_array, get_feat_array_prediction, EpochParams, EpochedData};
use crate::events::events_from_label;
use crate::features::{get_feature_table, get_target_table};
use crate::metrics::{balanced_accuracy, permutation_importance};
use crate::reader::{read_bad_events, FeatureReader};
use crate::table::FeatureTable;
use pte_core::{ChannelType, PteError, PteResult};
use pte_processing::LinePlot;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A named time series aligned with the feature rows
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

impl NamedSeries {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Inputs of a decoding run
#[derive(Debug, Clone)]
pub struct DecodingData {
    /// Feature time series, one column per (lagged) feature
    pub features: FeatureTable,
    /// Channel plotted alongside the predictions
    pub target: NamedSeries,
    /// Channel whose non-zero stretches define the trials
    pub label: NamedSeries,
    /// Non-zero samples mark artifacts
    pub artifacts: Option<Vec<f64>>,
    /// Trial numbers excluded from decoding
    pub bad_events: Vec<usize>,
    /// Recording channels the features were computed from
    pub ch_names: Vec<String>,
}

/// Epochs time-locked to trial onset, keyed by channel (or channel type)
///
/// Serialises as one JSON object: `Target`, `TargetName`, one entry per
/// channel key, `Label`, `LabelName` and, for features, `ChannelNames`.
#[derive(Debug, Clone, PartialEq)]
pub struct Timelocked<T> {
    pub target_name: String,
    pub target: Vec<Vec<f64>>,
    pub channels: Vec<(String, Vec<T>)>,
    pub label_name: String,
    pub label: Vec<Vec<f64>>,
    pub channel_names: Option<Vec<String>>,
}

impl<T> Timelocked<T> {
    fn new(target_name: &str, label_name: &str, keys: &[String], channel_names: Option<Vec<String>>) -> Self {
        Self {
            target_name: target_name.to_string(),
            target: Vec::new(),
            channels: keys.iter().map(|k| (k.clone(), Vec::new())).collect(),
            label_name: label_name.to_string(),
            label: Vec::new(),
            channel_names,
        }
    }

    /// Epochs collected for `key`
    pub fn channel(&self, key: &str) -> Option<&[T]> {
        self.channels.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
    }

    fn extend(&mut self, key: &str, epochs: Vec<T>) -> PteResult<()> {
        match self.channels.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => {
                values.extend(epochs);
                Ok(())
            }
            None => Err(PteError::MissingColumn {
                column: key.to_string(),
                source: "time-locked results".to_string(),
            }),
        }
    }
}

impl<T: Serialize> Serialize for Timelocked<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.channel_names.is_some());
        let mut map = serializer.serialize_map(Some(self.channels.len() + 4 + extra))?;
        map.serialize_entry("Target", &self.target)?;
        map.serialize_entry("TargetName", &self.target_name)?;
        for (key, values) in &self.channels {
            map.serialize_entry(key, values)?;
        }
        map.serialize_entry("Label", &self.label)?;
        map.serialize_entry("LabelName", &self.label_name)?;
        if let Some(names) = &self.channel_names {
            map.serialize_entry("ChannelNames", names)?;
        }
        map.end()
    }
}

/// One row of `*_results.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub fold: usize,
    pub channel_name: String,
    pub score: f64,
    pub feature_importances: Vec<f64>,
    pub trials_used: usize,
    pub trials_discarded: usize,
    /// Event indices of the discarded trials
    pub ids_discarded: Vec<usize>,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct DecodingOutput {
    pub out_file: PathBuf,
    pub results: Vec<ResultRow>,
    pub predictions: Timelocked<Vec<f64>>,
    pub features: Timelocked<Vec<Vec<f64>>>,
    /// Files written, in writing order
    pub written: Vec<PathBuf>,
}

/// `path` with `suffix` appended to its last component
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn format_list<T: std::fmt::Display>(values: &[T]) -> String {
    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(", "))
}

/// Flip an epoch whose largest magnitude is negative, then scale it to [0, 1]
///
/// Constant epochs become all zeros.
fn min_max_scale(mut epoch: Vec<f64>) -> Vec<f64> {
    let min_of = |e: &[f64]| e.iter().copied().filter(|v| !v.is_nan()).fold(f64::INFINITY, f64::min);
    let max_of = |e: &[f64]| e.iter().copied().filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max);
    if min_of(&epoch).abs() > max_of(&epoch).abs() {
        epoch.iter_mut().for_each(|v| *v = -*v);
    }
    let (min, max) = (min_of(&epoch), max_of(&epoch));
    let range = max - min;
    epoch
        .into_iter()
        .map(|v| if range > 0.0 { (v - min) / range } else if v.is_nan() { v } else { 0.0 })
        .collect()
}

fn take_rows(table: &FeatureTable, indices: &[usize]) -> Vec<Vec<f64>> {
    indices.iter().filter_map(|&i| table.row(i).map(<[f64]>::to_vec)).collect()
}

/// Cross-validated decoding of one feature file
pub struct Runner {
    data: DecodingData,
    out_file: PathBuf,
    decoder: Box<dyn Decoder>,
    config: RunnerConfig,
    side: &'static str,
    ch_names: Vec<String>,
    result_keys: Vec<String>,
    dist_end: f64,
    events: Vec<usize>,
    epoched: EpochedData,
    feature_epochs: FeatureTable,
}

impl Runner {
    /// Derive trials from the label and epoch the features
    pub fn new(data: DecodingData, out_file: impl Into<PathBuf>, decoder: Box<dyn Decoder>, config: RunnerConfig) -> PteResult<Self> {
        config.validate()?;
        let out_file = out_file.into();
        let out_str = out_file.to_string_lossy().into_owned();
        let n_rows = data.features.n_rows();
        for (what, len) in [("label length", data.label.values.len()), ("target length", data.target.values.len())] {
            if len != n_rows {
                return Err(PteError::DimensionMismatch {
                    what,
                    expected: n_rows,
                    actual: len,
                });
            }
        }
        if let Some(artifacts) = &data.artifacts {
            if artifacts.len() != n_rows {
                return Err(PteError::DimensionMismatch {
                    what: "artifact length",
                    expected: n_rows,
                    actual: artifacts.len(),
                });
            }
        }

        let side = side_from_path(&out_str);
        let ch_names = init_channel_names(&data.ch_names, config.use_channels, side);
        let result_keys = init_result_keys(&ch_names, config.use_channels);

        let dist_end = if config.exception_files.iter().any(|exc| out_str.contains(exc.as_str())) {
            tracing::info!(file = %out_file.display(), "Exception file recognized");
            config.excep_dist_end
        } else {
            config.dist_end
        };

        let events = events_from_label(&data.label.values);
        if events.len() % 2 != 0 {
            return Err(PteError::OddEventCount { events: events.len() });
        }

        let params = EpochParams {
            sfreq: config.sfreq,
            target_begin: config.target_begin,
            target_end: config.target_end,
            dist_onset: config.dist_onset,
            dist_end,
        };
        let epoched = get_feat_array(
            data.features.rows(),
            &events,
            &params,
            data.artifacts.as_deref(),
            &data.bad_events,
        )?;
        let feature_epochs = FeatureTable::new(data.features.columns().to_vec(), epoched.data.clone())?;

        Ok(Self {
            data,
            out_file,
            decoder,
            config,
            side,
            ch_names,
            result_keys,
            dist_end,
            events,
            epoched,
            feature_epochs,
        })
    }

    pub fn events(&self) -> &[usize] {
        &self.events
    }

    pub fn epoched(&self) -> &EpochedData {
        &self.epoched
    }

    pub fn channel_names(&self) -> &[String] {
        &self.ch_names
    }

    pub fn result_keys(&self) -> &[String] {
        &self.result_keys
    }

    /// Gap after the previous trial actually used (exception files use their own)
    pub fn dist_end(&self) -> f64 {
        self.dist_end
    }

    pub fn side(&self) -> &str {
        self.side
    }

    /// Time-locked epochs of a single series around the given trial onsets
    fn series_epochs(&self, values: &[f64], onsets: &[usize]) -> Vec<Vec<f64>> {
        get_feat_array_prediction(
            values,
            &self.events,
            onsets,
            self.config.sfreq,
            self.config.pred_begin,
            self.config.pred_end,
        )
        .into_iter()
        .map(min_max_scale)
        .collect()
    }

    /// Best ECOG and best LFP channel on an inner split of the training rows
    fn single_best(&mut self, train: &[usize]) -> PteResult<Vec<String>> {
        let groups: Vec<usize> = train.iter().map(|&i| self.epoched.groups[i]).collect();
        let folds = self.config.cv_inner.split(&groups)?;
        let mut scores: Vec<(String, f64)> = Vec::new();

        for ch_name in &self.ch_names {
            let columns = self.feature_epochs.columns_containing(ch_name);
            if columns.is_empty() {
                continue;
            }
            let table = self.feature_epochs.select(&columns)?;
            let mut total = 0.0;
            for Fold { train: inner_train, test: inner_test } in &folds {
                let pick = |rows: &[usize]| rows.iter().map(|&i| train[i]).collect::<Vec<_>>();
                let (train_rows, test_rows) = (pick(inner_train), pick(inner_test));
                let y_train: Vec<u8> = train_rows.iter().map(|&i| self.epoched.labels[i]).collect();
                let y_test: Vec<u8> = test_rows.iter().map(|&i| self.epoched.labels[i]).collect();
                let g_train: Vec<usize> = train_rows.iter().map(|&i| self.epoched.groups[i]).collect();
                let (x_train, x_test) = (take_rows(&table, &train_rows), take_rows(&table, &test_rows));
                self.decoder.fit(&x_train, &y_train, &g_train)?;
                let y_pred = self.decoder.predict(&x_test)?;
                total += balanced_accuracy(&y_test, &y_pred);
            }
            scores.push((ch_name.clone(), total / folds.len() as f64));
        }

        let best = |kind: &str| {
            scores
                .iter()
                .filter(|(name, _)| name.contains(kind))
                .fold(None::<&(String, f64)>, |best, candidate| match best {
                    Some(b) if b.1 >= candidate.1 => Some(b),
                    _ => Some(candidate),
                })
                .map(|(name, score)| {
                    tracing::debug!(channel = %name, score, "Best channel of type {}", kind);
                    name.clone()
                })
        };
        Ok(["ECOG", "LFP"].into_iter().filter_map(best).collect())
    }

    fn importances(&self, x_test: &[Vec<f64>], y_test: &[u8]) -> PteResult<Vec<f64>> {
        match self.config.feature_importance {
            FeatureImportance::None => Ok(Vec::new()),
            FeatureImportance::Coefficients => Ok(self.decoder.coefficients().unwrap_or_default()),
            FeatureImportance::Permutation(n_repeats) => {
                permutation_importance(self.decoder.as_ref(), x_test, y_test, n_repeats, DEFAULT_SEED)
            }
        }
    }

    /// Cross-validate, then write all outputs
    pub fn run(mut self) -> PteResult<DecodingOutput> {
        let folds = self.config.cv_outer.split(&self.epoched.groups)?;
        tracing::info!(folds = folds.len(), cv = self.config.cv_outer.name(), "Running outer cross-validation");

        let mut predictions: Timelocked<Vec<f64>> =
            Timelocked::new(&self.data.target.name, &self.data.label.name, &self.result_keys, None);
        let mut features: Timelocked<Vec<Vec<f64>>> = Timelocked::new(
            &self.data.target.name,
            &self.data.label.name,
            &self.result_keys,
            Some(self.ch_names.clone()),
        );
        let mut results = Vec::new();
        let trials_used = self.epoched.events_used.len();
        let trials_discarded = self.events.len() / 2 - trials_used;

        for (fold, Fold { train, test }) in folds.iter().enumerate() {
            tracing::info!(fold, "Fold no.");
            let y_train: Vec<u8> = train.iter().map(|&i| self.epoched.labels[i]).collect();
            let y_test: Vec<u8> = test.iter().map(|&i| self.epoched.labels[i]).collect();
            let groups_train: Vec<usize> = train.iter().map(|&i| self.epoched.groups[i]).collect();
            let test_onsets: Vec<usize> = test
                .iter()
                .map(|&i| self.epoched.groups[i] * 2)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let label_epochs = self.series_epochs(&self.data.label.values, &test_onsets);
            predictions.label.extend(label_epochs.iter().cloned());
            features.label.extend(label_epochs);
            let target_epochs = self.series_epochs(&self.data.target.values, &test_onsets);
            predictions.target.extend(target_epochs.iter().cloned());
            features.target.extend(target_epochs);

            let picks = match self.config.use_channels {
                ChannelSelection::SingleBest => self.single_best(train)?,
                selection => ch_picks(selection, &self.ch_names, self.side),
            };

            for pick in picks {
                let ch_type = ChannelType::decoding_group(&pick);
                let columns = self.feature_epochs.columns_containing(&pick);
                if columns.is_empty() {
                    tracing::warn!(channel = %pick, "No features found for channel, skipping");
                    continue;
                }
                tracing::info!(channel = %pick, features = columns.len(), "Decoding channel");

                let table = self.feature_epochs.select(&columns)?;
                let x_train = take_rows(&table, train);
                let x_test = take_rows(&table, test);
                self.decoder.fit(&x_train, &y_train, &groups_train)?;
                let score = self.decoder.score(&x_test, &y_test)?;
                let feature_importances = self.importances(&x_test, &y_test)?;
                tracing::debug!(fold, channel = %pick, score, "Fold score");

                results.push(ResultRow {
                    fold,
                    channel_name: pick.clone(),
                    score,
                    feature_importances,
                    trials_used,
                    trials_discarded,
                    ids_discarded: self.epoched.events_discarded.clone(),
                });

                let source = self.data.features.select(&columns)?;
                let feature_epochs = get_feat_array_prediction(
                    source.rows(),
                    &self.events,
                    &test_onsets,
                    self.config.sfreq,
                    self.config.pred_begin,
                    self.config.pred_end,
                );
                let epoch_predictions = feature_epochs
                    .iter()
                    .map(|epoch| self.decoder.predict_mode(epoch, self.config.pred_mode))
                    .collect::<PteResult<Vec<_>>>()?;

                let key = if self.config.use_channels.is_per_channel() { pick.as_str() } else { ch_type };
                predictions.extend(key, epoch_predictions)?;
                features.extend(key, feature_epochs)?;
            }
        }

        self.write_outputs(results, predictions, features)
    }

    fn write_outputs(
        &self,
        results: Vec<ResultRow>,
        predictions: Timelocked<Vec<f64>>,
        features: Timelocked<Vec<Vec<f64>>>,
    ) -> PteResult<DecodingOutput> {
        if let Some(parent) = self.out_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PteError::io(parent, e))?;
        }
        tracing::info!(out_file = %self.out_file.display(), "Writing results");
        let mut written = Vec::new();

        if self.config.plot {
            let path = with_suffix(&self.out_file, ".html");
            self.plot_predictions(&predictions).write(&path)?;
            written.push(path);
        }

        let path = with_suffix(&self.out_file, "_results.csv");
        self.write_results(&path, &results)?;
        written.push(path);

        for (suffix, json) in [
            ("_predictions_timelocked.json", serde_json::to_string(&predictions)?),
            ("_features_timelocked.json", serde_json::to_string(&features)?),
        ] {
            let path = with_suffix(&self.out_file, suffix);
            fs::write(&path, json).map_err(|e| PteError::io(&path, e))?;
            written.push(path);
        }

        let path = with_suffix(&self.out_file, "_features_concatenated.csv");
        let labels: Vec<f64> = self.epoched.labels.iter().map(|l| f64::from(*l)).collect();
        self.feature_epochs.write_csv(&path, Some(("Label", &labels)))?;
        written.push(path);

        Ok(DecodingOutput {
            out_file: self.out_file.clone(),
            results,
            predictions,
            features,
            written,
        })
    }

    fn write_results(&self, path: &Path, results: &[ResultRow]) -> PteResult<()> {
        let csv_error = |e: csv::Error| PteError::FormatError {
            reason: format!("{}: {}", path.display(), e),
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
        writer
            .write_record([
                "fold",
                "channel_name",
                self.config.scoring.as_str(),
                "feature_importances",
                "trials_used",
                "trials_discarded",
                "IDs_discarded",
            ])
            .map_err(csv_error)?;
        for row in results {
            writer
                .write_record([
                    row.fold.to_string(),
                    row.channel_name.clone(),
                    format!("{:?}", row.score),
                    format_list(&row.feature_importances),
                    row.trials_used.to_string(),
                    row.trials_discarded.to_string(),
                    format_list(&row.ids_discarded),
                ])
                .map_err(csv_error)?;
        }
        writer.flush().map_err(|e| PteError::io(path, e))
    }

    /// Mean prediction per channel key and mean label over the prediction window
    fn plot_predictions(&self, predictions: &Timelocked<Vec<f64>>) -> LinePlot {
        let file_name = self
            .out_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let subject = file_name.split("_ieeg").next().unwrap_or_default();
        let title = format!(
            "Classification target {} - {}<br>{}",
            self.config.target_begin, self.config.target_end, subject
        );
        let mut plot = LinePlot::new(title, "Time [s]", "Prediction Rate");

        let mut add = |name: &str, epochs: &[Vec<f64>]| {
            if let Some(mean) = mean_epoch(epochs) {
                let times = (0..mean.len())
                    .map(|i| self.config.pred_begin + i as f64 / self.config.sfreq)
                    .collect();
                plot.add_series(name, times, mean);
            }
        };
        for (key, epochs) in &predictions.channels {
            add(key, epochs);
        }
        add("Label", &predictions.label);
        plot
    }
}

/// Sample-wise mean over epochs of equal length
fn mean_epoch(epochs: &[Vec<f64>]) -> Option<Vec<f64>> {
    let len = epochs.first()?.len();
    let mut mean = vec![0.0; len];
    for epoch in epochs {
        for (m, v) in mean.iter_mut().zip(epoch) {
            *m += v;
        }
    }
    Some(mean.into_iter().map(|m| m / epochs.len() as f64).collect())
}

/// Output stem of a decoding run
///
/// `root/decode_<begin>_<end>_model_<clf>_chs_<channels>_opt_<yes|no>_feats_<ms>_ms/<file>/<file>`
pub fn generate_outpath(root: &Path, feature_file: &str, config: &RunnerConfig, use_times: usize) -> PathBuf {
    let out_name = format!(
        "decode_{}_{}_model_{}_chs_{}_{}_feats_{}_ms",
        config.target_begin.path_token(),
        config.target_end.path_token(),
        config.classifier,
        config.use_channels,
        if config.optimize { "opt_yes" } else { "opt_no" },
        use_times * 100
    );
    root.join(out_name).join(feature_file).join(feature_file)
}

/// One feature file to decode
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub features_root: PathBuf,
    pub feature_file: String,
    pub out_root: PathBuf,
    pub config: DecodingConfig,
}

fn resolve_bad_events(path: &Path, feature_file: &str) -> PteResult<Vec<usize>> {
    let path = if path.is_dir() {
        let stem = Path::new(feature_file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| feature_file.to_string());
        path.join(format!("{}_bad_epochs.csv", stem))
    } else {
        path.to_path_buf()
    };
    if !path.exists() {
        tracing::warn!(file = feature_file, "No bad epochs file found");
        return Ok(Vec::new());
    }
    read_bad_events(&path)
}

/// Decode one feature file; `Ok(None)` when it has none of the label channels
pub fn run_prediction(request: &PredictionRequest) -> PteResult<Option<DecodingOutput>> {
    let PredictionRequest {
        features_root,
        feature_file,
        out_root,
        config,
    } = request;
    config.validate()?;
    tracing::info!(file = %feature_file, "Using file");

    let reader = FeatureReader::new(features_root);
    let features = reader.read_features(feature_file)?;
    let settings = reader.read_settings(feature_file)?;

    let Some(label_name) = config.label_channels.iter().find(|ch| features.has_column(ch)) else {
        tracing::warn!(
            labels = ?config.label_channels,
            file = %feature_file,
            "No valid label found, discarding file"
        );
        return Ok(None);
    };
    let label = NamedSeries::new(label_name.clone(), reader.read_label(&features, label_name)?);

    let bad_events = match &config.bad_events_path {
        Some(path) => resolve_bad_events(path, feature_file)?,
        None => Vec::new(),
    };

    let (target_name, target_values) = get_target_table(&config.target_channels, &features)?;
    let feature_table = get_feature_table(&features, &config.use_features, config.use_times)?;
    let artifacts = if config.artifact_channels.is_empty() {
        None
    } else {
        Some(get_target_table(&config.artifact_channels, &features)?.1)
    };

    let out_file = generate_outpath(out_root, feature_file, &config.runner, config.use_times);
    let runner_config = RunnerConfig {
        sfreq: settings.sampling_rate_features,
        ..config.runner.clone()
    };
    let decoder = get_decoder(
        &runner_config.classifier,
        runner_config.scoring,
        runner_config.balancing,
        runner_config.optimize,
    )?;

    let data = DecodingData {
        features: feature_table,
        target: NamedSeries::new(target_name, target_values),
        label,
        artifacts,
        bad_events,
        ch_names: settings.ch_names,
    };
    Runner::new(data, out_file, decoder, runner_config)?.run().map(Some)
}

/// How decoding one file of a batch ended
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    /// Outputs written under this stem
    Completed(PathBuf),
    /// No label channel found
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub feature_file: String,
    pub status: BatchStatus,
}

/// Decode many files on blocking tasks, at most `max_concurrency` at a time
///
/// A failing file is logged and reported; it never stops the batch.
pub async fn run_batch(requests: Vec<PredictionRequest>, max_concurrency: usize) -> Vec<BatchOutcome> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut handles = Vec::with_capacity(requests.len());

    for request in requests {
        let semaphore = semaphore.clone();
        let feature_file = request.feature_file.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| e.to_string())?;
            tokio::task::spawn_blocking(move || run_prediction(&request))
                .await
                .map_err(|e| format!("decoding task panicked: {}", e))?
                .map_err(|e| e.to_string())
        });
        handles.push((feature_file, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (feature_file, handle) in handles {
        let status = match handle.await {
            Ok(Ok(Some(output))) => BatchStatus::Completed(output.out_file),
            Ok(Ok(None)) => BatchStatus::Skipped,
            Ok(Err(reason)) => {
                tracing::error!(file = %feature_file, error = %reason, "Decoding failed");
                BatchStatus::Failed(reason)
            }
            Err(e) => {
                tracing::error!(file = %feature_file, error = %e, "Decoding task panicked");
                BatchStatus::Failed(e.to_string())
            }
        };
        outcomes.push(BatchOutcome { feature_file, status });
    }
    let completed = outcomes.iter().filter(|o| matches!(o.status, BatchStatus::Completed(_))).count();
    tracing::info!(files = outcomes.len(), completed, "Batch finished");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cross_validation::CrossValidation;
    use crate::epochs::TargetBoundary;

    const SFREQ: f64 = 10.0;

    /// 8 trials of 1 s movement every 10 s; ECOG_R_1 follows the movement, LFP_R_1 is noise
    fn synthetic_features() -> (Vec<String>, Vec<Vec<f64>>) {
        let n = 820;
        let mut rows = Vec::with_capacity(n);
        for i in 0..n {
            let moving = i >= 60 && (i - 60) % 100 < 10 && i < 60 + 8 * 100;
            let label = if moving { 1.0 } else { 0.0 };
            let noise = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
            let ecog = if moving { 2.0 } else { 0.0 } + 0.2 * noise;
            let lfp = ((i * 104729) % 17) as f64 / 17.0;
            rows.push(vec![ecog, lfp, label]);
        }
        (
            vec!["ECOG_R_1_fft_beta".into(), "LFP_R_1_fft_beta".into(), "ANALOG_R_ROTA_CH".into()],
            rows,
        )
    }

    fn write_feature_file(root: &Path, name: &str) {
        let (columns, rows) = synthetic_features();
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        FeatureTable::new(columns, rows)
            .unwrap()
            .write_csv(dir.join(format!("{}_FEATURES.csv", name)), None)
            .unwrap();
        fs::write(
            dir.join(format!("{}_SETTINGS.json", name)),
            r#"{"ch_names": ["ECOG_R_1", "LFP_R_1"], "sampling_rate_features": 10.0}"#,
        )
        .unwrap();
    }

    fn test_config() -> DecodingConfig {
        DecodingConfig {
            label_channels: vec!["ANALOG_R_ROTA_CH".into()],
            target_channels: vec!["ROTA".into()],
            use_features: vec!["fft".into()],
            use_times: 1,
            runner: RunnerConfig {
                cv_outer: CrossValidation::GroupKFold { n_splits: 4 },
                dist_onset: 1.0,
                dist_end: 1.0,
                pred_begin: -1.0,
                pred_end: 1.0,
                ..RunnerConfig::default()
            },
            ..DecodingConfig::default()
        }
    }

    #[test]
    fn test_generate_outpath() {
        let config = RunnerConfig::default();
        let path = generate_outpath(Path::new("/out"), "sub-01_ieeg", &config, 1);
        assert_eq!(
            path,
            PathBuf::from("/out/decode_trial_onset_trial_end_model_lda_chs_single_opt_no_feats_100_ms/sub-01_ieeg/sub-01_ieeg")
        );

        let config = RunnerConfig {
            target_begin: TargetBoundary::Seconds(0.0),
            target_end: TargetBoundary::Seconds(1.0),
            classifier: "logistic".into(),
            use_channels: ChannelSelection::AllContralat,
            optimize: true,
            ..RunnerConfig::default()
        };
        let path = generate_outpath(Path::new("out"), "f", &config, 3);
        assert_eq!(
            path,
            PathBuf::from("out/decode_trial_begin_1.0_model_logistic_chs_all_contralat_opt_yes_feats_300_ms/f/f")
        );
    }

    #[test]
    fn test_min_max_scale() {
        assert_eq!(min_max_scale(vec![0.0, 1.0, 2.0]), vec![0.0, 0.5, 1.0]);
        // inverted: largest magnitude is negative
        assert_eq!(min_max_scale(vec![0.0, -4.0, -2.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max_scale(vec![3.0, 3.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_timelocked_key_order() {
        let mut preds: Timelocked<Vec<f64>> =
            Timelocked::new("ANALOG_R_ROTA_CH", "ANALOG_R_ROTA_CH", &["ECOG".into(), "LFP".into()], None);
        preds.extend("ECOG", vec![vec![1.0]]).unwrap();
        assert!(preds.extend("EEG", vec![]).is_err());

        let json = serde_json::to_string(&preds).unwrap();
        assert_eq!(
            json,
            r#"{"Target":[],"TargetName":"ANALOG_R_ROTA_CH","ECOG":[[1.0]],"LFP":[],"Label":[],"LabelName":"ANALOG_R_ROTA_CH"}"#
        );
    }

    #[test]
    fn test_runner_rejects_odd_events() {
        let features = FeatureTable::new(vec!["ECOG_R_1_fft".into()], vec![vec![0.0]; 5]).unwrap();
        let data = DecodingData {
            features,
            target: NamedSeries::new("t", vec![0.0; 5]),
            label: NamedSeries::new("l", vec![0.0, 0.0, 1.0, 1.0, 1.0]),
            artifacts: None,
            bad_events: Vec::new(),
            ch_names: vec!["ECOG_R_1".into()],
        };
        let decoder = get_decoder("lda", Default::default(), Default::default(), false).unwrap();
        // onset 1, offset 3, and the forced offset at the last index
        let mut odd = data.clone();
        odd.label.values = vec![0.0, 1.0, 1.0, 0.0, 1.0];
        let mut graded = data.clone();
        graded.label.values = vec![0.0, 0.5, 1.0, 0.0, 0.0];
        // onset 2 with a forced offset at 4, but no room for a rest window
        let err = Runner::new(data, "out/x", decoder, RunnerConfig::default()).err().unwrap();
        assert!(matches!(err, PteError::NoTrials { .. }));
        let decoder = get_decoder("lda", Default::default(), Default::default(), false).unwrap();
        let err = Runner::new(odd, "out/x", decoder, RunnerConfig::default()).err().unwrap();
        assert!(matches!(err, PteError::OddEventCount { events: 3 }));
        // half steps are not events, leaving only the drop at 3
        let decoder = get_decoder("lda", Default::default(), Default::default(), false).unwrap();
        let err = Runner::new(graded, "out/x", decoder, RunnerConfig::default()).err().unwrap();
        assert!(matches!(err, PteError::OddEventCount { events: 1 }));
    }

    #[test]
    fn test_run_prediction_end_to_end() {
        let features_root = tempfile::tempdir().unwrap();
        let out_root = tempfile::tempdir().unwrap();
        let name = "sub-001_ses-EphysMedOff01_task-SelfpacedRotationR_acq-StimOff_run-01_ieeg";
        write_feature_file(features_root.path(), name);

        let mut config = test_config();
        config.runner.plot = true;
        config.runner.feature_importance = FeatureImportance::Coefficients;
        let request = PredictionRequest {
            features_root: features_root.path().to_path_buf(),
            feature_file: name.to_string(),
            out_root: out_root.path().to_path_buf(),
            config,
        };
        let output = run_prediction(&request).unwrap().unwrap();

        // 2 channels per fold, 4 folds
        assert_eq!(output.results.len(), 8);
        let ecog: Vec<f64> = output
            .results
            .iter()
            .filter(|r| r.channel_name == "ECOG_R_1")
            .map(|r| r.score)
            .collect();
        assert!(ecog.iter().all(|s| *s > 0.9), "ECOG scores {:?}", ecog);
        assert_eq!(output.results[0].trials_used + output.results[0].trials_discarded, 8);
        assert_eq!(output.results[0].feature_importances.len(), 1);

        // every used trial is tested exactly once, windows of 21 samples
        let ecog_preds = output.predictions.channel("ECOG_R_1").unwrap();
        assert_eq!(ecog_preds.len(), output.results[0].trials_used);
        assert!(ecog_preds.iter().all(|e| e.len() == 21));
        assert_eq!(output.predictions.label.len(), ecog_preds.len());
        assert_eq!(output.features.channel_names.as_deref().unwrap(), &["ECOG_R_1", "LFP_R_1"]);

        assert_eq!(output.written.len(), 5);
        for path in &output.written {
            assert!(path.exists(), "missing {}", path.display());
        }
        let results = fs::read_to_string(with_suffix(&output.out_file, "_results.csv")).unwrap();
        assert!(results.starts_with(
            "fold,channel_name,balanced_accuracy,feature_importances,trials_used,trials_discarded,IDs_discarded\n0,ECOG_R_1,"
        ));

        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(with_suffix(&output.out_file, "_predictions_timelocked.json")).unwrap(),
        )
        .unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["Target", "TargetName", "ECOG_R_1", "LFP_R_1", "Label", "LabelName"]);

        let concatenated = FeatureTable::read_csv(with_suffix(&output.out_file, "_features_concatenated.csv")).unwrap();
        assert_eq!(concatenated.columns().last().unwrap(), "Label");
    }

    #[test]
    fn test_run_prediction_without_label() {
        let features_root = tempfile::tempdir().unwrap();
        write_feature_file(features_root.path(), "f");
        let mut config = test_config();
        config.label_channels = vec!["ANALOG_L_ROTA_CH".into()];
        let request = PredictionRequest {
            features_root: features_root.path().to_path_buf(),
            feature_file: "f".into(),
            out_root: features_root.path().join("out"),
            config,
        };
        assert!(run_prediction(&request).unwrap().is_none());
    }

    #[test]
    fn test_single_best_and_all() {
        let features_root = tempfile::tempdir().unwrap();
        let out_root = tempfile::tempdir().unwrap();
        write_feature_file(features_root.path(), "f");

        for selection in [ChannelSelection::SingleBest, ChannelSelection::All] {
            let mut config = test_config();
            config.runner.use_channels = selection;
            let request = PredictionRequest {
                features_root: features_root.path().to_path_buf(),
                feature_file: "f".into(),
                out_root: out_root.path().to_path_buf(),
                config,
            };
            let output = run_prediction(&request).unwrap().unwrap();
            assert_eq!(output.results.len(), 8);
            assert!(output.predictions.channel("ECOG").is_some_and(|p| !p.is_empty()));
            assert!(output.predictions.channel("LFP").is_some_and(|p| !p.is_empty()));
        }
    }

    #[test]
    fn test_bad_events_directory() {
        let features_root = tempfile::tempdir().unwrap();
        let out_root = tempfile::tempdir().unwrap();
        write_feature_file(features_root.path(), "f");
        let bad_dir = tempfile::tempdir().unwrap();
        fs::write(bad_dir.path().join("f_bad_epochs.csv"), ",event_id\n0,1\n1,3\n").unwrap();

        let mut config = test_config();
        config.bad_events_path = Some(bad_dir.path().to_path_buf());
        let request = PredictionRequest {
            features_root: features_root.path().to_path_buf(),
            feature_file: "f".into(),
            out_root: out_root.path().to_path_buf(),
            config,
        };
        let output = run_prediction(&request).unwrap().unwrap();
        assert_eq!(output.results[0].trials_used, 6);
        assert_eq!(output.results[0].ids_discarded, vec![2, 6]);
    }

    #[tokio::test]
    async fn test_run_batch_collects_failures() {
        let features_root = tempfile::tempdir().unwrap();
        let out_root = tempfile::tempdir().unwrap();
        write_feature_file(features_root.path(), "good");

        let request = |file: &str| PredictionRequest {
            features_root: features_root.path().to_path_buf(),
            feature_file: file.to_string(),
            out_root: out_root.path().to_path_buf(),
            config: test_config(),
        };
        let outcomes = run_batch(vec![request("good"), request("missing")], 2).await;
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].status, BatchStatus::Completed(_)));
        assert_eq!(outcomes[1].feature_file, "missing");
        assert!(matches!(outcomes[1].status, BatchStatus::Failed(_)));
    }
}
