//! Power spectral density estimation (Welch's method)

use crate::config::SpectrumConfig;
use crate::pipeline::Pipeline;
use num_complex::Complex;
use pte_core::{param_error, PteError, PteResult, Recording};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One-sided power spectral density
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Bin frequencies in Hz
    pub frequencies: Vec<f64>,
    /// Power density per bin (units² / Hz)
    pub power: Vec<f64>,
}

impl Spectrum {
    /// Integrated power between `low` and `high` Hz (trapezoidal rule)
    pub fn band_power(&self, low: f64, high: f64) -> f64 {
        let points: Vec<(f64, f64)> = self
            .frequencies
            .iter()
            .zip(&self.power)
            .filter(|(f, _)| **f >= low && **f <= high)
            .map(|(f, p)| (*f, *p))
            .collect();
        points
            .windows(2)
            .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
            .sum()
    }

    /// Frequency of the largest power bin
    pub fn peak_frequency(&self) -> Option<f64> {
        self.power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| self.frequencies[i])
    }
}

fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Welch power spectral density of one channel
///
/// Segments of `nperseg` samples (clipped to the signal length) overlap by
/// `overlap * nperseg` samples; each is mean-detrended and Hann-windowed.
pub fn welch_psd(signal: &[f64], sfreq: f64, nperseg: usize, overlap: f64) -> PteResult<Spectrum> {
    if signal.is_empty() {
        return Err(PteError::InvalidSignalData {
            reason: "Cannot estimate a spectrum of an empty signal".to_string(),
        });
    }
    if !(sfreq > 0.0) {
        return Err(param_error!("sfreq", "must be positive, got {}", sfreq));
    }
    if nperseg == 0 {
        return Err(param_error!("nperseg", "segment length must be positive"));
    }
    if !(0.0..1.0).contains(&overlap) {
        return Err(param_error!("overlap", "must lie in [0, 1), got {}", overlap));
    }

    let nperseg = nperseg.min(signal.len());
    let noverlap = (nperseg as f64 * overlap).floor() as usize;
    let step = (nperseg - noverlap).max(1);
    let window = hann(nperseg);
    let scale = 1.0 / (sfreq * window.iter().map(|w| w * w).sum::<f64>());

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);
    let mut input = fft.make_input_vec();
    let mut output: Vec<Complex<f64>> = fft.make_output_vec();
    let n_bins = output.len();
    let mut power = vec![0.0; n_bins];

    let mut n_segments = 0usize;
    let mut start = 0;
    while start + nperseg <= signal.len() {
        let segment = &signal[start..start + nperseg];
        let mean = segment.iter().sum::<f64>() / nperseg as f64;
        for ((slot, &x), &w) in input.iter_mut().zip(segment).zip(&window) {
            *slot = (x - mean) * w;
        }
        fft.process(&mut input, &mut output).map_err(|e| PteError::InvalidSignalData {
            reason: format!("FFT failed: {}", e),
        })?;
        for (acc, bin) in power.iter_mut().zip(&output) {
            *acc += bin.norm_sqr();
        }
        n_segments += 1;
        start += step;
    }

    // one-sided: double everything but DC and (for even lengths) Nyquist
    let last_doubled = if nperseg % 2 == 0 { n_bins - 1 } else { n_bins };
    for (k, p) in power.iter_mut().enumerate() {
        *p *= scale / n_segments as f64;
        if k > 0 && k < last_doubled {
            *p *= 2.0;
        }
    }

    let frequencies = (0..n_bins).map(|k| k as f64 * sfreq / nperseg as f64).collect();
    Ok(Spectrum { frequencies, power })
}

/// Power in one named band of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPower {
    pub channel: String,
    pub band: String,
    pub power: f64,
}

/// Welch spectra of every channel of a recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpectra {
    pub channel_names: Vec<String>,
    pub spectra: Vec<Spectrum>,
    pub bands: Vec<(String, f64, f64)>,
}

impl ChannelSpectra {
    pub fn compute(recording: &Recording, config: &SpectrumConfig) -> PteResult<Self> {
        config.validate()?;
        let mut cleaning = Pipeline::cleaning(config.line_freq, config.bandpass)?;
        let cleaned;
        let recording = if cleaning.is_empty() {
            recording
        } else {
            cleaned = cleaning.run(recording)?.recording;
            &cleaned
        };
        let nperseg = config.segment_length(recording.sfreq);
        let spectra = recording
            .data
            .iter()
            .map(|channel| welch_psd(channel, recording.sfreq, nperseg, config.overlap))
            .collect::<PteResult<Vec<_>>>()?;
        tracing::debug!(
            channels = spectra.len(),
            nperseg,
            "Computed Welch spectra"
        );
        Ok(ChannelSpectra {
            channel_names: recording.channel_names.clone(),
            spectra,
            bands: config.bands.clone(),
        })
    }

    /// Band power for every channel and configured band
    pub fn band_powers(&self) -> Vec<BandPower> {
        self.channel_names
            .iter()
            .zip(&self.spectra)
            .flat_map(|(channel, spectrum)| {
                self.bands.iter().map(move |(band, low, high)| BandPower {
                    channel: channel.clone(),
                    band: band.clone(),
                    power: spectrum.band_power(*low, *high),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, sfreq: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sfreq).sin())
            .collect()
    }

    #[test]
    fn test_sine_peak() {
        let spectrum = welch_psd(&sine(10.0, 1.0, 250.0, 2500), 250.0, 250, 0.5).unwrap();
        assert_eq!(spectrum.frequencies.len(), 126);
        assert_eq!(spectrum.frequencies[1], 1.0);
        assert_eq!(spectrum.peak_frequency(), Some(10.0));
    }

    #[test]
    fn test_parseval_power() {
        // a sine of amplitude A carries A²/2 of power
        let spectrum = welch_psd(&sine(20.0, 2.0, 200.0, 4000), 200.0, 200, 0.5).unwrap();
        let total = spectrum.band_power(0.0, 100.0);
        assert!((total - 2.0).abs() < 0.1, "total power {total}");
        assert!(spectrum.band_power(40.0, 60.0) < 1e-6);
    }

    #[test]
    fn test_nperseg_clipped_to_signal() {
        let spectrum = welch_psd(&sine(5.0, 1.0, 100.0, 64), 100.0, 256, 0.5).unwrap();
        assert_eq!(spectrum.frequencies.len(), 33);
        assert!(welch_psd(&[], 100.0, 16, 0.5).is_err());
        assert!(welch_psd(&[1.0, 2.0], 100.0, 0, 0.5).is_err());
    }

    #[test]
    fn test_channel_spectra_band_powers() {
        let sfreq = 500.0;
        let recording = Recording::new(
            vec!["ECOG_R_1".into(), "LFP_R_1".into()],
            vec![sine(10.0, 1.0, sfreq, 5000), sine(20.0, 1.0, sfreq, 5000)],
            sfreq,
        )
        .unwrap();
        let spectra = ChannelSpectra::compute(&recording, &SpectrumConfig::default()).unwrap();
        let powers = spectra.band_powers();
        assert_eq!(powers.len(), 10);

        let get = |channel: &str, band: &str| {
            powers
                .iter()
                .find(|p| p.channel == channel && p.band == band)
                .map(|p| p.power)
                .unwrap()
        };
        assert!(get("ECOG_R_1", "alpha") > 10.0 * get("ECOG_R_1", "beta"));
        assert!(get("LFP_R_1", "beta") > 10.0 * get("LFP_R_1", "alpha"));
    }

    #[test]
    fn test_line_noise_removed_before_estimation() {
        let sfreq = 500.0;
        let noisy: Vec<f64> = sine(10.0, 1.0, sfreq, 5000)
            .iter()
            .zip(sine(50.0, 1.0, sfreq, 5000))
            .map(|(a, b)| a + b)
            .collect();
        let recording = Recording::new(vec!["ECOG_R_1".into()], vec![noisy], sfreq).unwrap();

        let raw = ChannelSpectra::compute(&recording, &SpectrumConfig::default()).unwrap();
        let config = SpectrumConfig {
            line_freq: Some(50.0),
            ..SpectrumConfig::default()
        };
        let cleaned = ChannelSpectra::compute(&recording, &config).unwrap();

        let line = |s: &ChannelSpectra| s.spectra[0].band_power(45.0, 55.0);
        assert!(line(&cleaned) < 0.1 * line(&raw));
        let alpha = |s: &ChannelSpectra| s.spectra[0].band_power(8.0, 12.0);
        assert!((alpha(&cleaned) / alpha(&raw) - 1.0).abs() < 0.05);
    }
}
