//! Recording: multichannel container for electrophysiological data

use crate::error::{PteError, PteResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Multichannel recording with a uniform sampling rate
#[derive(Debug, Clone)]
pub struct Recording {
    /// Unique identifier for this recording
    pub id: Uuid,
    /// Channel names, one per row of `data`
    pub channel_names: Vec<String>,
    /// Channel-major samples (`data[channel][sample]`)
    pub data: Vec<Vec<f64>>,
    /// Sampling frequency in Hz
    pub sfreq: f64,
    /// Time of the first sample in seconds
    pub first_time: f64,
}

impl Recording {
    /// Create a new recording, validating shape and sampling rate
    pub fn new(channel_names: Vec<String>, data: Vec<Vec<f64>>, sfreq: f64) -> PteResult<Self> {
        if data.is_empty() {
            return Err(PteError::InvalidSignalData {
                reason: "Recording needs at least one channel".to_string(),
            });
        }
        if channel_names.len() != data.len() {
            return Err(PteError::DimensionMismatch {
                what: "channel names",
                expected: data.len(),
                actual: channel_names.len(),
            });
        }
        if !(sfreq > 0.0) || !sfreq.is_finite() {
            return Err(PteError::InvalidSignalData {
                reason: format!("Sampling frequency must be positive, got {}", sfreq),
            });
        }

        let n_samples = data[0].len();
        if let Some(bad) = data.iter().find(|ch| ch.len() != n_samples) {
            return Err(PteError::DimensionMismatch {
                what: "samples per channel",
                expected: n_samples,
                actual: bad.len(),
            });
        }

        Ok(Recording {
            id: Uuid::new_v4(),
            channel_names,
            data,
            sfreq,
            first_time: 0.0,
        })
    }

    /// Set the timestamp of the first sample
    pub fn with_first_time(mut self, first_time: f64) -> Self {
        self.first_time = first_time;
        self
    }

    /// Number of channels
    pub fn n_channels(&self) -> usize {
        self.data.len()
    }

    /// Number of samples per channel
    pub fn n_samples(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// Check if the recording holds no samples
    pub fn is_empty(&self) -> bool {
        self.n_samples() == 0
    }

    /// Get data for a specific channel
    pub fn channel(&self, index: usize) -> PteResult<&[f64]> {
        self.data.get(index).map(Vec::as_slice).ok_or_else(|| PteError::InvalidSignalData {
            reason: format!(
                "Channel index {} out of bounds (0-{})",
                index,
                self.n_channels().saturating_sub(1)
            ),
        })
    }

    /// Get data for a channel by name
    pub fn channel_by_name(&self, name: &str) -> PteResult<&[f64]> {
        let index = self
            .channel_names
            .iter()
            .position(|ch| ch == name)
            .ok_or_else(|| PteError::MissingColumn {
                column: name.to_string(),
                source: "recording".to_string(),
            })?;
        self.channel(index)
    }

    /// Signal duration in seconds
    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    /// Time vector in seconds
    pub fn times(&self) -> Vec<f64> {
        let dt = 1.0 / self.sfreq;
        (0..self.n_samples())
            .map(|i| self.first_time + i as f64 * dt)
            .collect()
    }

    /// Slice the recording to `[start, end)` seconds relative to its first sample
    pub fn slice_time(&self, start: f64, end: f64) -> PteResult<Recording> {
        if start < 0.0 || end > self.duration() || start >= end {
            return Err(PteError::InvalidSignalData {
                reason: format!(
                    "Invalid time range [{:.3}, {:.3}]s for signal duration {:.3}s",
                    start, end, self.duration()
                ),
            });
        }

        let start_sample = (start * self.sfreq) as usize;
        let end_sample = ((end * self.sfreq) as usize).min(self.n_samples());

        let data = self
            .data
            .iter()
            .map(|ch| ch[start_sample..end_sample].to_vec())
            .collect();

        Ok(Recording {
            id: Uuid::new_v4(),
            channel_names: self.channel_names.clone(),
            data,
            sfreq: self.sfreq,
            first_time: self.first_time + start_sample as f64 / self.sfreq,
        })
    }

    /// Keep only the named channels, in the given order
    pub fn pick_channels(&self, names: &[&str]) -> PteResult<Recording> {
        let mut data = Vec::with_capacity(names.len());
        for name in names {
            data.push(self.channel_by_name(name)?.to_vec());
        }
        let channel_names = names.iter().map(|s| s.to_string()).collect();
        Ok(Recording::new(channel_names, data, self.sfreq)?.with_first_time(self.first_time))
    }

    /// Replace the sample data, keeping names and timing
    pub fn with_data(&self, data: Vec<Vec<f64>>, sfreq: f64) -> PteResult<Recording> {
        Ok(Recording::new(self.channel_names.clone(), data, sfreq)?.with_first_time(self.first_time))
    }

    /// Calculate basic statistics for a channel
    pub fn channel_stats(&self, index: usize) -> PteResult<ChannelStats> {
        Ok(ChannelStats::calculate(self.channel(index)?))
    }
}

/// Basic statistics for a signal channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub rms: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub peak_to_peak: f64,
}

impl ChannelStats {
    pub fn calculate(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                peak_to_peak: 0.0,
            };
        }

        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let rms = (data.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let min = data.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        Self {
            mean,
            rms,
            std_dev: variance.sqrt(),
            min,
            max,
            peak_to_peak: max - min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ECOG_R_{}_SMC_AT", i + 1)).collect()
    }

    #[test]
    fn test_recording_creation() {
        let data = vec![vec![0.0; 1000], vec![1.0; 1000]];
        let recording = Recording::new(names(2), data, 1000.0).unwrap();

        assert_eq!(recording.n_channels(), 2);
        assert_eq!(recording.n_samples(), 1000);
        assert!((recording.duration() - 1.0).abs() < 1e-12);
        assert_eq!(recording.channel(1).unwrap()[10], 1.0);
    }

    #[test]
    fn test_ragged_channels_rejected() {
        let data = vec![vec![0.0; 10], vec![0.0; 9]];
        let err = Recording::new(names(2), data, 100.0).unwrap_err();
        assert!(matches!(err, PteError::DimensionMismatch { expected: 10, actual: 9, .. }));
    }

    #[test]
    fn test_slice_time() {
        let data = vec![(0..1000).map(|i| i as f64).collect()];
        let recording = Recording::new(names(1), data, 100.0).unwrap();

        let sliced = recording.slice_time(1.0, 5.0).unwrap();
        assert_eq!(sliced.n_samples(), 400);
        assert_eq!(sliced.channel(0).unwrap()[0], 100.0);
        assert!((sliced.first_time - 1.0).abs() < 1e-12);
        assert!((sliced.times()[0] - 1.0).abs() < 1e-12);

        assert!(recording.slice_time(5.0, 1.0).is_err());
        assert!(recording.slice_time(0.0, 20.0).is_err());
    }

    #[test]
    fn test_pick_channels() {
        let data = vec![vec![0.0; 5], vec![1.0; 5], vec![2.0; 5]];
        let recording = Recording::new(names(3), data, 10.0).unwrap();
        let picked = recording.pick_channels(&["ECOG_R_3_SMC_AT", "ECOG_R_1_SMC_AT"]).unwrap();
        assert_eq!(picked.channel(0).unwrap()[0], 2.0);
        assert_eq!(picked.channel(1).unwrap()[0], 0.0);
        assert!(recording.pick_channels(&["LFP_L_1"]).is_err());
    }

    #[test]
    fn test_channel_stats() {
        let stats = ChannelStats::calculate(&[1.0, -1.0, 1.0, -1.0]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.rms, 1.0);
        assert_eq!(stats.peak_to_peak, 2.0);
    }
}
