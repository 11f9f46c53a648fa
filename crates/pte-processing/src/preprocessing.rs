//! Resampling and per-channel corrections used before plotting and analysis

use crate::filters::{sosfiltfilt, FilterConfig};
use crate::processor::{SignalProcessor, StageKind};
use pte_core::{param_error, PteError, PteResult, Recording};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order of the anti-aliasing lowpass applied before decimation
pub const DECIMATION_FILTER_ORDER: usize = 8;

/// Root mean square of a slice (0 for an empty slice)
pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Zero-phase anti-aliasing lowpass followed by keeping every `factor`-th sample
#[derive(Debug, Clone)]
pub struct Decimator {
    factor: usize,
}

impl Decimator {
    pub fn new(factor: usize) -> PteResult<Self> {
        if factor == 0 {
            return Err(param_error!("factor", "decimation factor must be at least 1"));
        }
        Ok(Decimator { factor })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Decimate one channel sampled at `sfreq`
    pub fn decimate(&self, signal: &[f64], sfreq: f64) -> PteResult<Vec<f64>> {
        if self.factor < 2 {
            return Ok(signal.to_vec());
        }
        let cutoff = 0.8 * (sfreq / 2.0) / self.factor as f64;
        let sections = FilterConfig::lowpass(cutoff, DECIMATION_FILTER_ORDER).design(sfreq)?;
        Ok(sosfiltfilt(&sections, signal)
            .into_iter()
            .step_by(self.factor)
            .collect())
    }
}

impl SignalProcessor for Decimator {
    fn process(&mut self, input: &Recording) -> PteResult<Recording> {
        if self.factor < 2 {
            return Ok(input.clone());
        }
        let data = input
            .data
            .iter()
            .map(|channel| self.decimate(channel, input.sfreq))
            .collect::<PteResult<Vec<_>>>()?;
        let sfreq = input.sfreq / self.factor as f64;
        tracing::debug!(factor = self.factor, sfreq, "Decimated recording");
        input.with_data(data, sfreq)
    }

    fn name(&self) -> &str {
        "Decimator"
    }

    fn stage_kind(&self) -> StageKind {
        StageKind::Resampler
    }
}

/// Trend removed by [`Detrender`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetrendType {
    /// Least-squares line
    #[default]
    Linear,
    /// Mean
    Constant,
    /// Leave the signal untouched
    None,
}

impl FromStr for DetrendType {
    type Err = PteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(DetrendType::Linear),
            "constant" => Ok(DetrendType::Constant),
            "none" | "false" => Ok(DetrendType::None),
            other => Err(PteError::InvalidKeyword {
                kind: "detrend",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DetrendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetrendType::Linear => write!(f, "linear"),
            DetrendType::Constant => write!(f, "constant"),
            DetrendType::None => write!(f, "none"),
        }
    }
}

/// Remove a trend from a single channel
pub fn detrend(values: &[f64], detrend_type: DetrendType) -> Vec<f64> {
    let n = values.len();
    match detrend_type {
        DetrendType::None => values.to_vec(),
        _ if n == 0 => Vec::new(),
        DetrendType::Constant => {
            let mean = values.iter().sum::<f64>() / n as f64;
            values.iter().map(|v| v - mean).collect()
        }
        DetrendType::Linear if n < 2 => detrend(values, DetrendType::Constant),
        DetrendType::Linear => {
            let n_f = n as f64;
            let t_mean = (n_f - 1.0) / 2.0;
            let y_mean = values.iter().sum::<f64>() / n_f;
            let (mut cov, mut var) = (0.0, 0.0);
            for (i, &y) in values.iter().enumerate() {
                let dt = i as f64 - t_mean;
                cov += dt * (y - y_mean);
                var += dt * dt;
            }
            let slope = cov / var;
            values
                .iter()
                .enumerate()
                .map(|(i, &y)| y - (y_mean + slope * (i as f64 - t_mean)))
                .collect()
        }
    }
}

/// Per-channel detrending
#[derive(Debug, Clone, Default)]
pub struct Detrender {
    detrend_type: DetrendType,
}

impl Detrender {
    pub fn new(detrend_type: DetrendType) -> Self {
        Detrender { detrend_type }
    }
}

impl SignalProcessor for Detrender {
    fn process(&mut self, input: &Recording) -> PteResult<Recording> {
        let data = input
            .data
            .iter()
            .map(|channel| detrend(channel, self.detrend_type))
            .collect();
        input.with_data(data, input.sfreq)
    }

    fn name(&self) -> &str {
        "Detrender"
    }

    fn stage_kind(&self) -> StageKind {
        StageKind::Correction
    }
}

/// Divides each channel by its RMS
#[derive(Debug, Clone, Default)]
pub struct RmsNormalizer;

impl SignalProcessor for RmsNormalizer {
    fn process(&mut self, input: &Recording) -> PteResult<Recording> {
        let data = input
            .data
            .iter()
            .map(|channel| {
                let scale = rms(channel) + f64::EPSILON;
                channel.iter().map(|v| v / scale).collect()
            })
            .collect();
        input.with_data(data, input.sfreq)
    }

    fn name(&self) -> &str {
        "RMS Normalizer"
    }

    fn stage_kind(&self) -> StageKind {
        StageKind::Correction
    }
}
