//! Digital filters for electrophysiological signals
//!
//! All IIR filters are realised as cascaded second-order sections in
//! transposed direct form II. `filtfilt` runs a section cascade forwards and
//! backwards for zero phase distortion.

use crate::processor::{SignalProcessor, StageKind};
use pte_core::{param_error, PteResult, Recording};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Filter types supported by the framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    /// Butterworth lowpass filter
    ButterworthLowpass,
    /// Butterworth highpass filter
    ButterworthHighpass,
    /// Butterworth bandpass filter (highpass and lowpass cascade)
    ButterworthBandpass,
    /// Notch filter for powerline interference
    Notch,
}

/// Filter configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filter type
    pub filter_type: FilterType,
    /// Filter order (for Butterworth filters)
    pub order: usize,
    /// Cutoff frequency for lowpass/highpass (Hz)
    pub cutoff_freq: Option<f64>,
    /// Low cutoff for bandpass (Hz)
    pub low_cutoff: Option<f64>,
    /// High cutoff for bandpass (Hz)
    pub high_cutoff: Option<f64>,
    /// Notch frequency (Hz) - typically 50 or 60
    pub notch_freq: Option<f64>,
    /// Notch quality factor
    pub notch_q: Option<f64>,
}

impl FilterConfig {
    fn empty(filter_type: FilterType, order: usize) -> Self {
        Self {
            filter_type,
            order,
            cutoff_freq: None,
            low_cutoff: None,
            high_cutoff: None,
            notch_freq: None,
            notch_q: None,
        }
    }

    /// Create lowpass filter configuration
    pub fn lowpass(cutoff_freq: f64, order: usize) -> Self {
        Self {
            cutoff_freq: Some(cutoff_freq),
            ..Self::empty(FilterType::ButterworthLowpass, order)
        }
    }

    /// Create highpass filter configuration
    pub fn highpass(cutoff_freq: f64, order: usize) -> Self {
        Self {
            cutoff_freq: Some(cutoff_freq),
            ..Self::empty(FilterType::ButterworthHighpass, order)
        }
    }

    /// Create bandpass filter configuration
    pub fn bandpass(low_cutoff: f64, high_cutoff: f64, order: usize) -> Self {
        Self {
            low_cutoff: Some(low_cutoff),
            high_cutoff: Some(high_cutoff),
            ..Self::empty(FilterType::ButterworthBandpass, order)
        }
    }

    /// Create notch filter configuration
    pub fn notch(freq: f64, q: f64) -> Self {
        Self {
            notch_freq: Some(freq),
            notch_q: Some(q),
            ..Self::empty(FilterType::Notch, 2)
        }
    }

    /// Design the second-order sections for a sampling rate
    pub fn design(&self, sfreq: f64) -> PteResult<Vec<Biquad>> {
        if !(sfreq > 0.0) {
            return Err(param_error!("sfreq", "must be positive, got {}", sfreq));
        }
        let nyquist = sfreq / 2.0;
        let check_cutoff = |name: &'static str, freq: Option<f64>| -> PteResult<f64> {
            let freq = freq.ok_or_else(|| param_error!("cutoff_freq", "{} requires a {} frequency", self.filter_type.label(), name))?;
            if !(freq > 0.0) || freq >= nyquist {
                return Err(param_error!(
                    "cutoff_freq",
                    "{} frequency must lie in (0, {}) Hz, got {}",
                    name,
                    nyquist,
                    freq
                ));
            }
            Ok(freq)
        };
        if self.filter_type != FilterType::Notch && self.order == 0 {
            return Err(param_error!("order", "filter order must be at least 1"));
        }

        match self.filter_type {
            FilterType::ButterworthLowpass => {
                let cutoff = check_cutoff("cutoff", self.cutoff_freq)?;
                Ok(butterworth_sections(self.order, cutoff, sfreq, false))
            }
            FilterType::ButterworthHighpass => {
                let cutoff = check_cutoff("cutoff", self.cutoff_freq)?;
                Ok(butterworth_sections(self.order, cutoff, sfreq, true))
            }
            FilterType::ButterworthBandpass => {
                let low = check_cutoff("low cutoff", self.low_cutoff)?;
                let high = check_cutoff("high cutoff", self.high_cutoff)?;
                if low >= high {
                    return Err(param_error!(
                        "low_cutoff",
                        "low cutoff ({}) must be less than high cutoff ({})",
                        low,
                        high
                    ));
                }
                let mut sections = butterworth_sections(self.order, low, sfreq, true);
                sections.extend(butterworth_sections(self.order, high, sfreq, false));
                Ok(sections)
            }
            FilterType::Notch => {
                let freq = check_cutoff("notch", self.notch_freq)?;
                let q = self.notch_q.unwrap_or(30.0);
                if !(q > 0.0) {
                    return Err(param_error!("notch_q", "quality factor must be positive, got {}", q));
                }
                Ok(vec![Biquad::notch(freq, q, sfreq)])
            }
        }
    }
}

impl FilterType {
    fn label(&self) -> &'static str {
        match self {
            FilterType::ButterworthLowpass => "Lowpass filter",
            FilterType::ButterworthHighpass => "Highpass filter",
            FilterType::ButterworthBandpass => "Bandpass filter",
            FilterType::Notch => "Notch filter",
        }
    }
}

/// Second-order section, normalised so that `a0 == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// Delay line of one section (transposed direct form II)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadState {
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn normalized(b: [f64; 3], a: [f64; 3]) -> Self {
        Self {
            b0: b[0] / a[0],
            b1: b[1] / a[0],
            b2: b[2] / a[0],
            a1: a[1] / a[0],
            a2: a[2] / a[0],
        }
    }

    /// Second-order lowpass with quality factor `q`
    pub fn lowpass(cutoff: f64, sfreq: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * cutoff / sfreq;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        Self::normalized(
            [(1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    /// Second-order highpass with quality factor `q`
    pub fn highpass(cutoff: f64, sfreq: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * cutoff / sfreq;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        Self::normalized(
            [(1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    /// First-order section (b2 = a2 = 0)
    pub fn first_order(cutoff: f64, sfreq: f64, highpass: bool) -> Self {
        let k = (PI * cutoff / sfreq).tan();
        let a1 = (k - 1.0) / (k + 1.0);
        let (b0, b1) = if highpass {
            (1.0 / (1.0 + k), -1.0 / (1.0 + k))
        } else {
            (k / (1.0 + k), k / (1.0 + k))
        };
        Self { b0, b1, b2: 0.0, a1, a2: 0.0 }
    }

    /// Notch at `freq` with quality factor `q`
    pub fn notch(freq: f64, q: f64, sfreq: f64) -> Self {
        let w0 = 2.0 * PI * freq / sfreq;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        Self::normalized([1.0, -2.0 * cos, 1.0], [1.0 + alpha, -2.0 * cos, 1.0 - alpha])
    }

    /// Filter one sample
    #[inline]
    pub fn step(&self, input: f64, state: &mut BiquadState) -> f64 {
        let output = self.b0 * input + state.z1;
        state.z1 = self.b1 * input - self.a1 * output + state.z2;
        state.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// DC gain of the section
    pub fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a1 + self.a2;
        if den.abs() < f64::EPSILON {
            0.0
        } else {
            (self.b0 + self.b1 + self.b2) / den
        }
    }

    /// State reached after an infinitely long constant input of `level`
    pub fn steady_state(&self, level: f64) -> BiquadState {
        let y = self.dc_gain() * level;
        BiquadState {
            z1: y - self.b0 * level,
            z2: self.b2 * level - self.a2 * y,
        }
    }
}

/// Butterworth sections of order `order` (bilinear transform, pre-warped at `cutoff`)
pub fn butterworth_sections(order: usize, cutoff: f64, sfreq: f64, highpass: bool) -> Vec<Biquad> {
    let mut sections = Vec::with_capacity(order.div_ceil(2));
    for k in 0..order / 2 {
        let q = 1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2 * order) as f64).sin());
        sections.push(if highpass {
            Biquad::highpass(cutoff, sfreq, q)
        } else {
            Biquad::lowpass(cutoff, sfreq, q)
        });
    }
    if order % 2 == 1 {
        sections.push(Biquad::first_order(cutoff, sfreq, highpass));
    }
    sections
}

/// Run a section cascade over `input` starting from `states`
pub fn sosfilt_with_state(sections: &[Biquad], input: &[f64], states: &mut [BiquadState]) -> Vec<f64> {
    input
        .iter()
        .map(|&x| {
            sections
                .iter()
                .zip(states.iter_mut())
                .fold(x, |acc, (section, state)| section.step(acc, state))
        })
        .collect()
}

/// Causal filtering from rest
pub fn sosfilt(sections: &[Biquad], input: &[f64]) -> Vec<f64> {
    let mut states = vec![BiquadState::default(); sections.len()];
    sosfilt_with_state(sections, input, &mut states)
}

/// Steady-state initial conditions of a cascade for a constant input of `level`
fn cascade_steady_state(sections: &[Biquad], level: f64) -> Vec<BiquadState> {
    let mut level = level;
    sections
        .iter()
        .map(|section| {
            let state = section.steady_state(level);
            level *= section.dc_gain();
            state
        })
        .collect()
}

/// Zero-phase forward-backward filtering
///
/// Both ends are padded with an odd reflection of `3 * (2 * sections + 1)`
/// samples (clipped to the signal length) and every pass starts from the
/// steady state of its first sample.
pub fn sosfiltfilt(sections: &[Biquad], input: &[f64]) -> Vec<f64> {
    let n = input.len();
    if n < 2 || sections.is_empty() {
        return input.to_vec();
    }

    let padlen = (3 * (2 * sections.len() + 1)).min(n - 1);
    let first = input[0];
    let last = input[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * padlen);
    extended.extend((1..=padlen).rev().map(|i| 2.0 * first - input[i]));
    extended.extend_from_slice(input);
    extended.extend((1..=padlen).map(|i| 2.0 * last - input[n - 1 - i]));

    let mut states = cascade_steady_state(sections, extended[0]);
    let mut forward = sosfilt_with_state(sections, &extended, &mut states);

    forward.reverse();
    let mut states = cascade_steady_state(sections, forward[0]);
    let mut backward = sosfilt_with_state(sections, &forward, &mut states);
    backward.reverse();

    backward[padlen..padlen + n].to_vec()
}

/// Sections, per-channel state and the sampling rate they were designed for
#[derive(Debug, Clone, Default)]
struct SectionCascade {
    sections: Vec<Biquad>,
    states: Vec<Vec<BiquadState>>,
    sampling_rate: f64,
    initialized: bool,
}

impl SectionCascade {
    fn ensure(&mut self, config: &FilterConfig, recording: &Recording) -> PteResult<()> {
        if !self.initialized || self.sampling_rate != recording.sfreq || self.states.len() != recording.n_channels() {
            self.sections = config.design(recording.sfreq)?;
            self.states = vec![vec![BiquadState::default(); self.sections.len()]; recording.n_channels()];
            self.sampling_rate = recording.sfreq;
            self.initialized = true;
        }
        Ok(())
    }

    fn run(&mut self, recording: &Recording, zero_phase: bool) -> PteResult<Recording> {
        let data = if zero_phase {
            recording
                .data
                .iter()
                .map(|channel| sosfiltfilt(&self.sections, channel))
                .collect()
        } else {
            recording
                .data
                .iter()
                .zip(self.states.iter_mut())
                .map(|(channel, states)| sosfilt_with_state(&self.sections, channel, states))
                .collect()
        };
        recording.with_data(data, recording.sfreq)
    }

    fn reset(&mut self) {
        for states in &mut self.states {
            states.fill(BiquadState::default());
        }
    }
}

/// Butterworth filter built from second-order sections
#[derive(Debug, Clone)]
pub struct ButterworthFilter {
    filter_config: FilterConfig,
    zero_phase: bool,
    cascade: SectionCascade,
}

impl ButterworthFilter {
    pub fn new(filter_config: FilterConfig) -> PteResult<Self> {
        if filter_config.filter_type == FilterType::Notch {
            return Err(param_error!("filter_type", "use NotchFilter for notch filtering"));
        }
        if filter_config.order == 0 {
            return Err(param_error!("order", "filter order must be at least 1"));
        }
        Ok(ButterworthFilter {
            filter_config,
            zero_phase: false,
            cascade: SectionCascade::default(),
        })
    }

    /// Filter forwards and backwards instead of causally
    pub fn with_zero_phase(mut self, zero_phase: bool) -> Self {
        self.zero_phase = zero_phase;
        self
    }

    pub fn config(&self) -> &FilterConfig {
        &self.filter_config
    }

    /// Causal filtering of one channel from rest
    pub fn apply(&self, signal: &[f64], sfreq: f64) -> PteResult<Vec<f64>> {
        Ok(sosfilt(&self.filter_config.design(sfreq)?, signal))
    }

    /// Zero-phase filtering of one channel
    pub fn filtfilt(&self, signal: &[f64], sfreq: f64) -> PteResult<Vec<f64>> {
        Ok(sosfiltfilt(&self.filter_config.design(sfreq)?, signal))
    }
}

impl SignalProcessor for ButterworthFilter {
    fn process(&mut self, input: &Recording) -> PteResult<Recording> {
        self.cascade.ensure(&self.filter_config, input)?;
        self.cascade.run(input, self.zero_phase)
    }

    fn name(&self) -> &str {
        "Butterworth Filter"
    }

    fn reset(&mut self) {
        self.cascade.reset();
    }
}

/// Notch filter for powerline interference removal
#[derive(Debug, Clone)]
pub struct NotchFilter {
    filter_config: FilterConfig,
    zero_phase: bool,
    cascade: SectionCascade,
}

impl NotchFilter {
    /// Create new notch filter
    pub fn new(notch_freq: f64, q_factor: f64) -> Self {
        NotchFilter {
            filter_config: FilterConfig::notch(notch_freq, q_factor),
            zero_phase: false,
            cascade: SectionCascade::default(),
        }
    }

    pub fn with_zero_phase(mut self, zero_phase: bool) -> Self {
        self.zero_phase = zero_phase;
        self
    }

    pub fn notch_freq(&self) -> f64 {
        self.filter_config.notch_freq.unwrap_or_default()
    }
}

impl SignalProcessor for NotchFilter {
    fn process(&mut self, input: &Recording) -> PteResult<Recording> {
        self.cascade.ensure(&self.filter_config, input)?;
        self.cascade.run(input, self.zero_phase)
    }

    fn name(&self) -> &str {
        "Notch Filter"
    }

    fn reset(&mut self) {
        self.cascade.reset();
    }

    fn stage_kind(&self) -> StageKind {
        StageKind::Filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sfreq: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / sfreq).sin()).collect()
    }

    // sine amplitude from the RMS over whole periods
    fn amplitude(signal: &[f64]) -> f64 {
        (signal.iter().map(|v| v * v).sum::<f64>() / signal.len() as f64).sqrt() * std::f64::consts::SQRT_2
    }

    fn gain_at(sections: &[Biquad], freq: f64, sfreq: f64) -> f64 {
        let out = sosfilt(sections, &sine(freq, sfreq, 4000));
        amplitude(&out[2000..])
    }

    #[test]
    fn test_butterworth_cutoff_gain() {
        let sfreq = 1000.0;
        for order in [1, 2, 3, 4, 8] {
            let sections = FilterConfig::lowpass(100.0, order).design(sfreq).unwrap();
            assert_eq!(sections.len(), order.div_ceil(2));
            let gain = gain_at(&sections, 100.0, sfreq);
            assert!((gain - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02, "order {order}: {gain}");
        }
    }

    #[test]
    fn test_lowpass_and_highpass_attenuation() {
        let sfreq = 1000.0;
        let lowpass = FilterConfig::lowpass(50.0, 4).design(sfreq).unwrap();
        assert!(gain_at(&lowpass, 5.0, sfreq) > 0.99);
        assert!(gain_at(&lowpass, 200.0, sfreq) < 0.01);

        let highpass = FilterConfig::highpass(50.0, 4).design(sfreq).unwrap();
        assert!(gain_at(&highpass, 200.0, sfreq) > 0.99);
        assert!(gain_at(&highpass, 5.0, sfreq) < 0.01);
    }

    #[test]
    fn test_bandpass_passes_center() {
        let sections = FilterConfig::bandpass(8.0, 30.0, 2).design(500.0).unwrap();
        assert!(gain_at(&sections, 15.0, 500.0) > 0.9);
        assert!(gain_at(&sections, 200.0, 500.0) < 0.01);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(FilterConfig::lowpass(600.0, 2).design(1000.0).is_err());
        assert!(FilterConfig::bandpass(30.0, 8.0, 2).design(1000.0).is_err());
        assert!(ButterworthFilter::new(FilterConfig::lowpass(10.0, 0)).is_err());
        assert!(ButterworthFilter::new(FilterConfig::notch(50.0, 30.0)).is_err());
    }

    #[test]
    fn test_filtfilt_preserves_constant_and_phase() {
        let filter = ButterworthFilter::new(FilterConfig::lowpass(40.0, 8)).unwrap();
        let constant = vec![3.0; 200];
        let out = filter.filtfilt(&constant, 1000.0).unwrap();
        assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-6));

        // a slow sine passes through unshifted
        let slow = sine(2.0, 1000.0, 2000);
        let out = filter.filtfilt(&slow, 1000.0).unwrap();
        let peak_in = slow[..1000].iter().enumerate().fold((0, f64::MIN), |a, (i, &v)| if v > a.1 { (i, v) } else { a }).0;
        let peak_out = out[..1000].iter().enumerate().fold((0, f64::MIN), |a, (i, &v)| if v > a.1 { (i, v) } else { a }).0;
        assert!((peak_in as i64 - peak_out as i64).abs() <= 1);
    }

    #[test]
    fn test_filtfilt_short_signals() {
        let sections = FilterConfig::lowpass(10.0, 4).design(100.0).unwrap();
        assert!(sosfiltfilt(&sections, &[]).is_empty());
        assert_eq!(sosfiltfilt(&sections, &[1.5]), vec![1.5]);
        assert_eq!(sosfiltfilt(&sections, &[1.0, 2.0, 3.0]).len(), 3);
    }

    #[test]
    fn test_notch_filter() {
        let sfreq = 1000.0;
        let mut filter = NotchFilter::new(50.0, 30.0).with_zero_phase(true);
        let data: Vec<f64> = sine(10.0, sfreq, 6000)
            .iter()
            .zip(sine(50.0, sfreq, 6000))
            .map(|(a, b)| a + 0.5 * b)
            .collect();
        let recording = Recording::new(vec!["ECOG_R_1".into()], vec![data], sfreq).unwrap();
        let out = filter.process(&recording).unwrap();

        let clean = sine(10.0, sfreq, 6000);
        let err = out.data[0][2000..4000]
            .iter()
            .zip(&clean[2000..4000])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(err < 0.05, "residual {err}");
    }

    #[test]
    fn test_butterworth_processor_streaming_state() {
        let sfreq = 200.0;
        let signal = sine(5.0, sfreq, 400);
        let recording = Recording::new(vec!["LFP_R_1".into()], vec![signal.clone()], sfreq).unwrap();
        let mut filter = ButterworthFilter::new(FilterConfig::lowpass(20.0, 2)).unwrap();

        let first = filter.process(&recording).unwrap();
        let expected = filter.apply(&signal, sfreq).unwrap();
        assert_eq!(first.data[0], expected);

        // state carries over until reset
        let second = filter.process(&recording).unwrap();
        assert_ne!(second.data[0], expected);
        filter.reset();
        let third = filter.process(&recording).unwrap();
        assert_eq!(third.data[0], expected);
    }
}
