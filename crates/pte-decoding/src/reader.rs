//! Reading pre-computed feature files and their settings

use crate::table::FeatureTable;
use pte_core::{PteError, PteResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings stored next to a feature file (unknown keys are ignored)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    pub ch_names: Vec<String>,
    pub sampling_rate_features: f64,
}

/// Reads `<root>/<file>/<file>_FEATURES.csv` and `<root>/<file>/<file>_SETTINGS.json`
#[derive(Debug, Clone)]
pub struct FeatureReader {
    root: PathBuf,
}

impl FeatureReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn features_path(&self, feature_file: &str) -> PathBuf {
        self.root.join(feature_file).join(format!("{}_FEATURES.csv", feature_file))
    }

    pub fn settings_path(&self, feature_file: &str) -> PathBuf {
        self.root.join(feature_file).join(format!("{}_SETTINGS.json", feature_file))
    }

    pub fn read_features(&self, feature_file: &str) -> PteResult<FeatureTable> {
        let path = self.features_path(feature_file);
        let table = FeatureTable::read_csv(&path)?;
        tracing::debug!(
            path = %path.display(),
            rows = table.n_rows(),
            columns = table.n_cols(),
            "Read features"
        );
        Ok(table)
    }

    pub fn read_settings(&self, feature_file: &str) -> PteResult<FeatureSettings> {
        let path = self.settings_path(feature_file);
        let text = fs::read_to_string(&path).map_err(|e| PteError::io(&path, e))?;
        let settings: FeatureSettings = serde_json::from_str(&text)?;
        if !(settings.sampling_rate_features > 0.0) {
            return Err(PteError::InvalidParameter {
                name: "sampling_rate_features",
                reason: format!("must be positive, got {}", settings.sampling_rate_features),
            });
        }
        Ok(settings)
    }

    /// Label channel `name` of a feature table
    pub fn read_label(&self, features: &FeatureTable, name: &str) -> PteResult<Vec<f64>> {
        features.column(name)
    }
}

/// Epoch indices listed in the `event_id` column of a bad-epochs CSV
///
/// Other columns (annotations, reasons) are not parsed.
pub fn read_bad_events(path: impl AsRef<Path>) -> PteResult<Vec<usize>> {
    let path = path.as_ref();
    let format_error = |reason: String| PteError::FormatError {
        reason: format!("{}: {}", path.display(), reason),
    };
    let mut reader = csv::Reader::from_path(path).map_err(|e| format_error(e.to_string()))?;
    let column = reader
        .headers()
        .map_err(|e| format_error(e.to_string()))?
        .iter()
        .position(|h| h == "event_id")
        .ok_or_else(|| PteError::MissingColumn {
            column: "event_id".to_string(),
            source: path.display().to_string(),
        })?;

    let mut events = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format_error(e.to_string()))?;
        let cell = record.get(column).unwrap_or("").trim();
        if cell.is_empty() {
            continue;
        }
        let value: f64 = cell
            .parse()
            .map_err(|_| format_error(format!("event_id '{}' is not a number", cell)))?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(format_error(format!("event_id {} is not a non-negative integer", value)));
        }
        events.push(value as usize);
    }
    Ok(events)
}
