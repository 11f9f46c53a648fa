//! PTE-Processing: preprocessing, spectra and plot export for recordings
//!
//! Zero-phase filtering, decimation, detrending and normalisation chained
//! through a processing pipeline, plus Welch spectra and HTML plots.

pub mod baseline;
pub mod config;
pub mod filters;
pub mod io;
pub mod pipeline;
pub mod plotting;
pub mod preprocessing;
pub mod processor;
pub mod time_frequency;

pub use baseline::{baseline_correct, handle_baseline, BaselineMode, BaselineWindow};
pub use config::{PlotConfig, SpectrumConfig};
pub use filters::{sosfilt, sosfiltfilt, Biquad, ButterworthFilter, FilterConfig, FilterType, NotchFilter};
pub use io::{read_recording_csv, write_recording_csv};
pub use pipeline::{Pipeline, PipelineOutput, StageReport};
pub use plotting::{decimation_factor, prepare_signals, raw_plot, sig_plot, LinePlot, LineSeries, StackedSignals};
pub use preprocessing::{detrend, rms, Decimator, DetrendType, Detrender, RmsNormalizer};
pub use processor::{SignalProcessor, StageKind};
pub use time_frequency::{welch_psd, BandPower, ChannelSpectra, Spectrum};
