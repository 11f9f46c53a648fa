//! Ordered chains of processing stages

use crate::config::PlotConfig;
use crate::filters::{ButterworthFilter, FilterConfig, NotchFilter};
use crate::preprocessing::{DetrendType, Decimator, Detrender, RmsNormalizer};
use crate::processor::{SignalProcessor, StageKind};
use pte_core::{PteResult, Recording};
use std::time::Instant;

/// Runs its stages in insertion order, feeding each the previous output
pub struct Pipeline {
    label: String,
    stages: Vec<Box<dyn SignalProcessor>>,
    skip_failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: String,
    pub elapsed_us: u64,
    pub applied: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub recording: Recording,
    pub reports: Vec<StageReport>,
    pub elapsed_us: u64,
    pub warnings: Vec<String>,
}

fn micros(since: Instant) -> u64 {
    since.elapsed().as_micros() as u64
}

impl Pipeline {
    pub fn new(label: &str) -> Self {
        Pipeline {
            label: label.to_string(),
            stages: Vec::new(),
            skip_failed: false,
        }
    }

    /// Appends a stage; chainable
    pub fn then(mut self, stage: impl SignalProcessor + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn push(&mut self, stage: Box<dyn SignalProcessor>) {
        self.stages.push(stage);
    }

    /// With `skip` set, a failing stage is logged and its input passed on unchanged
    pub fn skip_failed(mut self, skip: bool) -> Self {
        self.skip_failed = skip;
        self
    }

    /// Filtering, decimation, detrending and normalisation as selected by a plot configuration
    pub fn plot_preparation(config: &PlotConfig, decimation_factor: usize) -> PteResult<Self> {
        let mut pipeline = Pipeline::cleaning(config.line_freq, config.bandpass)?;
        pipeline.label = "Plot preparation".to_string();
        if config.decimate && decimation_factor >= 2 {
            pipeline.push(Box::new(Decimator::new(decimation_factor)?));
        }
        if config.detrend != DetrendType::None {
            pipeline.push(Box::new(Detrender::new(config.detrend)));
        }
        if config.normalize {
            pipeline.push(Box::new(RmsNormalizer));
        }
        Ok(pipeline)
    }

    /// Zero-phase bandpass followed by a line-noise notch, each only when set
    pub fn cleaning(line_freq: Option<f64>, bandpass: Option<(f64, f64)>) -> PteResult<Self> {
        let mut pipeline = Pipeline::new("Cleaning");
        if let Some((low, high)) = bandpass {
            let filter = ButterworthFilter::new(FilterConfig::bandpass(low, high, 4))?.with_zero_phase(true);
            pipeline.push(Box::new(filter));
        }
        if let Some(freq) = line_freq {
            pipeline.push(Box::new(NotchFilter::new(freq, 30.0).with_zero_phase(true)));
        }
        Ok(pipeline)
    }

    pub fn run(&mut self, input: &Recording) -> PteResult<PipelineOutput> {
        let started = Instant::now();
        let mut current = input.clone();
        let mut reports = Vec::with_capacity(self.stages.len());
        let mut warnings = Vec::new();

        for stage in self.stages.iter_mut() {
            if !stage.accepts(&current) {
                warnings.push(format!("Stage '{}' skipped: empty recording", stage.name()));
                continue;
            }

            let stage_started = Instant::now();
            let outcome = stage.process(&current);
            let applied = outcome.is_ok();
            reports.push(StageReport {
                stage: stage.name().to_string(),
                elapsed_us: micros(stage_started),
                applied,
            });
            match outcome {
                Ok(next) => current = next,
                Err(e) if self.skip_failed => {
                    tracing::warn!(stage = stage.name(), error = %e, "Stage failed, passing input through");
                    warnings.push(format!("Stage '{}' failed: {}", stage.name(), e));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(pipeline = %self.label, stages = reports.len(), "Pipeline finished");
        Ok(PipelineOutput {
            recording: current,
            reports,
            elapsed_us: micros(started),
            warnings,
        })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.stage_kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl SignalProcessor for Pipeline {
    fn process(&mut self, input: &Recording) -> PteResult<Recording> {
        Ok(self.run(input)?.recording)
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn reset(&mut self) {
        self.stages.iter_mut().for_each(|s| s.reset());
    }
}
