//! Configuration for signal plotting and spectral analysis

use crate::preprocessing::DetrendType;
use pte_core::{param_error, PteError, PteResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Options for preparing stacked signal plots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Decimate high-rate signals before plotting
    pub decimate: bool,
    /// Divide each channel by its RMS
    pub normalize: bool,
    /// Trend removed per channel
    pub detrend: DetrendType,
    /// Vertical spacing between channels in units of the overall RMS
    pub padding: f64,
    /// Plot title
    pub title: Option<String>,
    /// Line-noise frequency notched out before the other steps (Hz)
    pub line_freq: Option<f64>,
    /// Zero-phase bandpass `(low, high)` applied first (Hz)
    pub bandpass: Option<(f64, f64)>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            decimate: true,
            normalize: true,
            detrend: DetrendType::Linear,
            padding: 2.0,
            title: None,
            line_freq: None,
            bandpass: None,
        }
    }
}

impl PlotConfig {
    /// Plot the signals as they are, only stacked
    pub fn raw() -> Self {
        Self {
            decimate: false,
            normalize: false,
            detrend: DetrendType::None,
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn validate(&self) -> PteResult<()> {
        if !(self.padding >= 0.0) || !self.padding.is_finite() {
            return Err(param_error!("padding", "must be a non-negative number, got {}", self.padding));
        }
        validate_cleaning(self.line_freq, self.bandpass)
    }

    pub fn to_json(&self) -> PteResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PteError::SerializationError {
            reason: format!("Failed to serialize plot configuration: {}", e),
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

/// Line frequency and bandpass edges must be positive, with `low < high`
fn validate_cleaning(line_freq: Option<f64>, bandpass: Option<(f64, f64)>) -> PteResult<()> {
    if let Some(freq) = line_freq {
        if !(freq > 0.0) || !freq.is_finite() {
            return Err(param_error!("line_freq", "must be a positive frequency, got {}", freq));
        }
    }
    if let Some((low, high)) = bandpass {
        if !(low > 0.0) || !(low < high) || !high.is_finite() {
            return Err(param_error!("bandpass", "invalid range [{}, {}]", low, high));
        }
    }
    Ok(())
}

/// Welch spectrum parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Segment length in samples; `None` uses one second of data
    pub nperseg: Option<usize>,
    /// Segment overlap as a fraction of `nperseg`
    pub overlap: f64,
    /// Named frequency bands as `(name, low, high)` in Hz
    pub bands: Vec<(String, f64, f64)>,
    /// Line-noise frequency notched out before estimation (Hz)
    pub line_freq: Option<f64>,
    /// Zero-phase bandpass `(low, high)` applied before estimation (Hz)
    pub bandpass: Option<(f64, f64)>,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            nperseg: None,
            overlap: 0.5,
            bands: vec![
                ("delta".to_string(), 1.0, 4.0),
                ("theta".to_string(), 4.0, 8.0),
                ("alpha".to_string(), 8.0, 12.0),
                ("beta".to_string(), 13.0, 35.0),
                ("gamma".to_string(), 60.0, 200.0),
            ],
            line_freq: None,
            bandpass: None,
        }
    }
}

impl SpectrumConfig {
    /// Segment length for a sampling rate
    pub fn segment_length(&self, sfreq: f64) -> usize {
        self.nperseg.unwrap_or_else(|| sfreq.round().max(1.0) as usize)
    }

    pub fn validate(&self) -> PteResult<()> {
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(param_error!("overlap", "must lie in [0, 1), got {}", self.overlap));
        }
        if self.nperseg == Some(0) {
            return Err(param_error!("nperseg", "segment length must be positive"));
        }
        for (name, low, high) in &self.bands {
            if !(low < high) || *low < 0.0 {
                return Err(param_error!("bands", "band '{}' has invalid range [{}, {}]", name, low, high));
            }
        }
        validate_cleaning(self.line_freq, self.bandpass)
    }

    pub fn to_json(&self) -> PteResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PteError::SerializationError {
            reason: format!("Failed to serialize spectrum configuration: {}", e),
        })
    }

    pub fn from_json(json: &str) -> PteResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
