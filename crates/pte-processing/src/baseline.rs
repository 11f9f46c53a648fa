//! Baseline correction of time-locked curves

use pte_core::{param_error, PteError, PteResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a curve is corrected against its baseline window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BaselineMode {
    /// Subtract the window mean, then divide by the window std
    #[default]
    #[serde(rename = "z-score", alias = "zscore")]
    ZScore,
    /// Divide by the window std
    #[serde(rename = "std")]
    Std,
}

impl FromStr for BaselineMode {
    type Err = PteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "z-score" | "zscore" => Ok(BaselineMode::ZScore),
            "std" => Ok(BaselineMode::Std),
            other => Err(PteError::InvalidKeyword {
                kind: "baseline mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Baseline window as `(start, end)` in seconds
pub type BaselineWindow = (Option<f64>, Option<f64>);

/// Convert a baseline window in seconds to sample indices
///
/// `None` disables the correction. Inside a window a missing start maps to
/// sample 0 and a missing end leaves the window open-ended, so `(None, None)`
/// covers the whole curve. Bounds are counted from the first sample; negative
/// bounds are rejected.
pub fn handle_baseline(
    baseline: Option<BaselineWindow>,
    sfreq: Option<f64>,
) -> PteResult<Option<(usize, Option<usize>)>> {
    let Some(window) = baseline else {
        return Ok(None);
    };
    if window == (None, None) {
        return Ok(Some((0, None)));
    }
    let sfreq = sfreq.ok_or_else(|| {
        param_error!(
            "sfreq",
            "if baseline is specified, sampling frequency must also be specified (got baseline {:?})",
            window
        )
    })?;
    let to_index = |t: f64| -> PteResult<usize> {
        let index = (t * sfreq).trunc();
        if index < 0.0 {
            return Err(param_error!("baseline", "baseline bound {} s lies before the first sample", t));
        }
        Ok(index as usize)
    };
    let start = window.0.map(to_index).transpose()?.unwrap_or(0);
    let end = window.1.map(to_index).transpose()?;
    Ok(Some((start, end)))
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Correct `values` against the window `[start, end)` (end clipped to the length)
pub fn baseline_correct(values: &[f64], mode: BaselineMode, start: usize, end: Option<usize>) -> Vec<f64> {
    let end = end.unwrap_or(values.len()).min(values.len());
    let window = if start < end { &values[start..end] } else { &[][..] };
    let (mean, std) = mean_std(window);
    match mode {
        BaselineMode::Std => values.iter().map(|v| v / std).collect(),
        BaselineMode::ZScore => values.iter().map(|v| (v - mean) / std).collect(),
    }
}
