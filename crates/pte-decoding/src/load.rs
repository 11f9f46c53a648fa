//! Loading and aggregating the outputs of decoding runs

use crate::table::format_value;
use pte_core::{parse_entities, ChannelType, Medication, PteError, PteResult, Stimulation};
use pte_filetools::{DefaultFinder, FileFilter, FileFinder};
use pte_processing::{baseline_correct, handle_baseline, BaselineMode, BaselineWindow};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Explicit files, or a directory searched for them
#[derive(Debug, Clone, PartialEq)]
pub enum FilesOrDir {
    Files(Vec<PathBuf>),
    Dir(PathBuf),
}

impl FilesOrDir {
    /// Files to load; a directory is searched for paths containing `extension`
    pub fn resolve(&self, extension: &str, keywords: &[String]) -> PteResult<Vec<PathBuf>> {
        match self {
            FilesOrDir::Files(files) => Ok(files.clone()),
            FilesOrDir::Dir(directory) => {
                let mut finder = DefaultFinder::default();
                let filter = FileFilter::new().keywords(keywords.iter().cloned());
                finder.find_files(directory, Some(&[extension.to_string()][..]), &filter)?;
                tracing::info!("{}", finder);
                Ok(finder.files())
            }
        }
    }
}

impl From<PathBuf> for FilesOrDir {
    fn from(path: PathBuf) -> Self {
        FilesOrDir::Dir(path)
    }
}

impl From<Vec<PathBuf>> for FilesOrDir {
    fn from(files: Vec<PathBuf>) -> Self {
        FilesOrDir::Files(files)
    }
}

/// Best channel score of one channel type in one results file
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub filename: PathBuf,
    pub subject: Option<String>,
    pub medication: Medication,
    pub stimulation: Stimulation,
    pub trials_used: usize,
    pub trials_discarded: usize,
    /// `LFP` or `ECOG`
    pub channels: &'static str,
    /// NaN when the file has no channel of this type
    pub score: f64,
}

/// Scores of one subject and channel type, averaged over files
#[derive(Debug, Clone, PartialEq)]
pub struct AverageResult {
    pub subject: Option<String>,
    pub medication: Medication,
    pub stimulation: Stimulation,
    pub trials_used: usize,
    pub trials_discarded: usize,
    pub channels: &'static str,
    pub score: f64,
}

/// `balanced_accuracy` -> `Balanced Accuracy`
fn capitalize_key(key: &str) -> String {
    key.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Mean ignoring NaN; NaN when nothing is left
fn nan_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

fn nan_max(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |max, v| if max.is_nan() || v > max { v } else { max })
}

fn read_results_file(path: &Path, scoring_key: &str) -> PteResult<Vec<RawResult>> {
    let format_error = |reason: String| PteError::FormatError {
        reason: format!("{}: {}", path.display(), reason),
    };
    let mut reader = csv::Reader::from_path(path).map_err(|e| format_error(e.to_string()))?;
    let headers = reader.headers().map_err(|e| format_error(e.to_string()))?.clone();
    let column = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| PteError::MissingColumn {
            column: name.to_string(),
            source: path.display().to_string(),
        })
    };
    let (ch_col, score_col) = (column("channel_name")?, column(scoring_key)?);
    let (used_col, discarded_col) = (column("trials_used")?, column("trials_discarded")?);

    // per channel, in first-seen order
    let mut scores: Vec<(String, Vec<f64>)> = Vec::new();
    let mut trials: Option<(usize, usize)> = None;
    for record in reader.records() {
        let record = record.map_err(|e| format_error(e.to_string()))?;
        let cell = |col: usize| record.get(col).unwrap_or("").trim();
        let channel = cell(ch_col).to_string();
        let score = match cell(score_col) {
            "" => f64::NAN,
            s => s
                .parse()
                .map_err(|_| format_error(format!("score '{}' is not a number", s)))?,
        };
        if trials.is_none() {
            let count = |col: usize| {
                cell(col)
                    .parse::<usize>()
                    .map_err(|_| format_error(format!("trial count '{}' is not an integer", cell(col))))
            };
            trials = Some((count(used_col)?, count(discarded_col)?));
        }
        match scores.iter_mut().find(|(name, _)| *name == channel) {
            Some((_, values)) => values.push(score),
            None => scores.push((channel, vec![score])),
        }
    }
    let (trials_used, trials_discarded) =
        trials.ok_or_else(|| format_error("results file has no rows".to_string()))?;

    let name = path.to_string_lossy();
    let subject = parse_entities(path).subject;
    let averaged: Vec<(&'static str, f64)> = scores
        .into_iter()
        .map(|(channel, values)| (ChannelType::result_group(&channel), nan_mean(values)))
        .collect();

    Ok(["LFP", "ECOG"]
        .into_iter()
        .map(|channels| RawResult {
            filename: path.to_path_buf(),
            subject: subject.clone(),
            medication: Medication::from_filename(&name),
            stimulation: Stimulation::from_filename(&name),
            trials_used,
            trials_discarded,
            channels,
            score: nan_max(averaged.iter().filter(|(group, _)| *group == channels).map(|(_, s)| *s)),
        })
        .collect())
}

/// Load `*results.csv` files and aggregate them per subject
///
/// Returns the subject averages and the per-file rows (best LFP and best
/// ECOG channel of every file).
pub fn load_results(
    source: &FilesOrDir,
    keywords: &[String],
    scoring_key: &str,
) -> PteResult<(Vec<AverageResult>, Vec<RawResult>)> {
    let files = source.resolve("results.csv", keywords)?;
    let mut raw = Vec::with_capacity(files.len() * 2);
    for file in &files {
        raw.extend(read_results_file(file, scoring_key)?);
    }

    let mut average = Vec::new();
    let mut channel_groups: Vec<&'static str> = Vec::new();
    for result in &raw {
        if !channel_groups.contains(&result.channels) {
            channel_groups.push(result.channels);
        }
    }
    for channels in channel_groups {
        let of_channel: Vec<&RawResult> = raw.iter().filter(|r| r.channels == channels).collect();
        let mut subjects: Vec<&Option<String>> = Vec::new();
        for result in &of_channel {
            if !subjects.contains(&&result.subject) {
                subjects.push(&result.subject);
            }
        }
        for subject in subjects {
            let rows: Vec<&&RawResult> = of_channel.iter().filter(|r| &r.subject == subject).collect();
            let first = rows[0];
            average.push(AverageResult {
                subject: subject.clone(),
                medication: first.medication,
                stimulation: first.stimulation,
                trials_used: first.trials_used,
                trials_discarded: first.trials_discarded,
                channels,
                score: nan_mean(rows.iter().map(|r| r.score)),
            });
        }
    }
    tracing::info!(files = files.len(), subjects = average.len(), "Loaded decoding results");
    Ok((average, raw))
}

fn csv_writer(path: &Path) -> PteResult<csv::Writer<fs::File>> {
    csv::Writer::from_path(path).map_err(|e| PteError::FormatError {
        reason: format!("{}: {}", path.display(), e),
    })
}

fn write_rows(path: &Path, header: Vec<String>, rows: impl Iterator<Item = Vec<String>>) -> PteResult<()> {
    let mut writer = csv_writer(path)?;
    let write_error = |e: csv::Error| PteError::FormatError {
        reason: format!("{}: {}", path.display(), e),
    };
    writer.write_record(&header).map_err(write_error)?;
    for row in rows {
        writer.write_record(&row).map_err(write_error)?;
    }
    writer.flush().map_err(|e| PteError::io(path, e))
}

/// Write subject averages with capitalised headers (`Trials Used`, ...)
pub fn write_average_csv(path: impl AsRef<Path>, results: &[AverageResult], scoring_key: &str) -> PteResult<()> {
    let header = ["subject", "medication", "stimulation", "trials_used", "trials_discarded", "channels", scoring_key]
        .iter()
        .map(|h| capitalize_key(h))
        .collect();
    let rows = results.iter().map(|r| {
        vec![
            r.subject.clone().unwrap_or_default(),
            r.medication.label().to_string(),
            r.stimulation.label().to_string(),
            r.trials_used.to_string(),
            r.trials_discarded.to_string(),
            r.channels.to_string(),
            format_value(r.score),
        ]
    });
    write_rows(path.as_ref(), header, rows)
}

/// Write the per-file rows
pub fn write_raw_csv(path: impl AsRef<Path>, results: &[RawResult], scoring_key: &str) -> PteResult<()> {
    let header = [
        "filename",
        "subject",
        "medication",
        "stimulation",
        "trials_used",
        "trials_discarded",
        "channels",
        scoring_key,
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();
    let rows = results.iter().map(|r| {
        vec![
            r.filename.display().to_string(),
            r.subject.clone().unwrap_or_default(),
            r.medication.label().to_string(),
            r.stimulation.label().to_string(),
            r.trials_used.to_string(),
            r.trials_discarded.to_string(),
            r.channels.to_string(),
            format_value(r.score),
        ]
    });
    write_rows(path.as_ref(), header, rows)
}

/// Baseline correction applied to loaded predictions
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaselineCorrection {
    pub sfreq: Option<f64>,
    /// `None` disables the correction; `(None, None)` uses the whole epoch
    pub window: Option<BaselineWindow>,
    pub mode: BaselineMode,
}

impl BaselineCorrection {
    fn samples(&self) -> PteResult<Option<(usize, Option<usize>)>> {
        handle_baseline(self.window, self.sfreq)
    }
}

fn read_prediction_json(path: &Path) -> PteResult<Map<String, Value>> {
    let text = fs::read_to_string(path).map_err(|e| PteError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Epochs stored under `key`; `null` samples are read as NaN
fn epochs_of(preds: &Map<String, Value>, key: &str, path: &Path) -> PteResult<Vec<Vec<f64>>> {
    let value = preds.get(key).ok_or_else(|| PteError::MissingColumn {
        column: key.to_string(),
        source: path.display().to_string(),
    })?;
    let epochs: Vec<Vec<Option<f64>>> = serde_json::from_value(value.clone())?;
    Ok(epochs
        .into_iter()
        .map(|epoch| epoch.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        .collect())
}

/// Sample-wise mean of equally long curves
fn mean_curve(curves: &[Vec<f64>], what: &'static str) -> PteResult<Vec<f64>> {
    let len = curves.first().map(Vec::len).ok_or_else(|| PteError::NoTrials {
        reason: format!("no {} to average", what),
    })?;
    if let Some(bad) = curves.iter().find(|c| c.len() != len) {
        return Err(PteError::DimensionMismatch {
            what,
            expected: len,
            actual: bad.len(),
        });
    }
    Ok((0..len)
        .map(|i| curves.iter().map(|c| c[i]).sum::<f64>() / curves.len() as f64)
        .collect())
}

/// Mean time-locked prediction per channel and group: `[channel][group][time]`
///
/// Each file's epochs are averaged first. Files are grouped by their
/// position, or by the BIDS entity `key_average` when given.
pub fn load_predictions_timelocked(
    source: &FilesOrDir,
    baseline: &BaselineCorrection,
    channels: &[String],
    keywords: &[String],
    key_average: Option<&str>,
) -> PteResult<Vec<Vec<Vec<f64>>>> {
    let files = source.resolve("predictions_timelocked.json", keywords)?;
    let window = baseline.samples()?;

    let mut data: Vec<Vec<(Option<String>, Vec<Vec<f64>>)>> = vec![Vec::new(); channels.len()];
    for (index, path) in files.iter().enumerate() {
        let key = match key_average {
            Some(entity) => parse_entities(path).get(entity).map(str::to_string),
            None => Some(index.to_string()),
        };
        let preds = read_prediction_json(path)?;
        for (ch_index, ch_name) in channels.iter().enumerate() {
            let mut pred = mean_curve(&epochs_of(&preds, ch_name, path)?, "prediction epochs")?;
            if let Some((start, end)) = window {
                pred = baseline_correct(&pred, baseline.mode, start, end);
            }
            let groups = &mut data[ch_index];
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, curves)) => curves.push(pred),
                None => groups.push((key.clone(), vec![pred])),
            }
        }
    }

    data.into_iter()
        .map(|groups| {
            groups
                .iter()
                .map(|(_, curves)| mean_curve(curves, "file predictions"))
                .collect()
        })
        .collect()
}

/// Predictions of one channel key of one recording (or subject, when concatenated)
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub subject: Option<String>,
    pub session: Option<String>,
    pub task: Option<String>,
    pub run: Option<String>,
    pub acquisition: Option<String>,
    pub channel_name: String,
    /// `[epoch][time]`
    pub data: Vec<Vec<f64>>,
}

impl PredictionRecord {
    fn average(&mut self) -> PteResult<()> {
        self.data = vec![mean_curve(&self.data, "prediction epochs")?];
        Ok(())
    }
}

/// How predictions are combined by [`load_predictions_subject`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectAggregation {
    /// Average the epochs of every file
    pub average_predictions: bool,
    /// Stack the epochs of all runs per channel and subject
    pub concatenate_runs: bool,
    /// Average every record into a single curve
    pub average_runs: bool,
}

impl Default for SubjectAggregation {
    fn default() -> Self {
        Self {
            average_predictions: false,
            concatenate_runs: true,
            average_runs: false,
        }
    }
}

fn load_prediction_records(path: &Path, window: Option<(usize, Option<usize>)>, mode: BaselineMode) -> PteResult<Vec<PredictionRecord>> {
    let entities = parse_entities(path);
    let preds = read_prediction_json(path)?;
    preds
        .keys()
        .filter(|key| key.contains("ECOG") || key.contains("LFP"))
        .map(|key| {
            let mut data = epochs_of(&preds, key, path)?;
            if let Some((start, end)) = window {
                data = data
                    .iter()
                    .map(|epoch| baseline_correct(epoch, mode, start, end))
                    .collect();
            }
            Ok(PredictionRecord {
                subject: entities.subject.clone(),
                session: entities.session.clone(),
                task: entities.task.clone(),
                run: entities.run.clone(),
                acquisition: entities.acquisition.clone(),
                channel_name: key.clone(),
                data,
            })
        })
        .collect()
}

fn concatenate_runs(records: Vec<PredictionRecord>) -> Vec<PredictionRecord> {
    let mut stacked: Vec<PredictionRecord> = Vec::new();
    for record in records {
        match stacked
            .iter_mut()
            .find(|s| s.channel_name == record.channel_name && s.subject == record.subject)
        {
            Some(existing) => existing.data.extend(record.data),
            None => stacked.push(PredictionRecord {
                subject: record.subject,
                session: None,
                task: None,
                run: None,
                acquisition: None,
                channel_name: record.channel_name,
                data: record.data,
            }),
        }
    }
    // channel first, then subject, both in first-seen order
    let mut order: Vec<String> = Vec::new();
    for record in &stacked {
        if !order.contains(&record.channel_name) {
            order.push(record.channel_name.clone());
        }
    }
    let mut sorted = Vec::with_capacity(stacked.len());
    for channel in order {
        let (matching, rest): (Vec<_>, Vec<_>) = stacked.into_iter().partition(|r| r.channel_name == channel);
        sorted.extend(matching);
        stacked = rest;
    }
    sorted
}

/// Time-locked ECOG/LFP predictions per recording, optionally stacked per subject
pub fn load_predictions_subject(
    source: &FilesOrDir,
    baseline: &BaselineCorrection,
    keywords: &[String],
    aggregation: SubjectAggregation,
) -> PteResult<Vec<PredictionRecord>> {
    let files = source.resolve("predictions_timelocked.json", keywords)?;
    let window = baseline.samples()?;

    let mut records = Vec::new();
    for path in &files {
        let mut file_records = load_prediction_records(path, window, baseline.mode)?;
        if aggregation.average_predictions {
            for record in &mut file_records {
                record.average()?;
            }
        }
        records.extend(file_records);
    }
    if aggregation.concatenate_runs {
        records = concatenate_runs(records);
    }
    if aggregation.average_runs {
        for record in &mut records {
            record.average()?;
        }
    }
    tracing::debug!(files = files.len(), records = records.len(), "Loaded time-locked predictions");
    Ok(records)
}
