//! Interactive HTML export of stacked multichannel signals

use crate::config::PlotConfig;
use crate::pipeline::Pipeline;
use crate::preprocessing::rms;
use pte_core::{PteError, PteResult, Recording};
use serde::Serialize;
use serde_json::{json, Value};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Decimation factor that brings `sfreq` down towards 200 Hz (at most 10)
pub fn decimation_factor(sfreq: f64) -> usize {
    ((sfreq / 200.0).floor().max(0.0) as usize).min(10)
}

/// Signals prepared for a stacked plot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedSignals {
    pub times: Vec<f64>,
    pub channel_names: Vec<String>,
    /// Channel `i` shifted up by `offset * i`
    pub traces: Vec<Vec<f64>>,
    /// Vertical spacing between neighbouring channels
    pub offset: f64,
    /// Baseline of every channel on the y axis
    pub tick_values: Vec<f64>,
}

/// Decimate, detrend, normalise and stack signals as selected by `config`
pub fn prepare_signals(
    times: &[f64],
    signals: &[Vec<f64>],
    channel_names: &[String],
    sfreq: f64,
    config: &PlotConfig,
) -> PteResult<StackedSignals> {
    config.validate()?;
    if signals.len() != channel_names.len() {
        return Err(PteError::DimensionMismatch {
            what: "signals rows vs channel names",
            expected: channel_names.len(),
            actual: signals.len(),
        });
    }
    if let Some(bad) = signals.iter().find(|s| s.len() != times.len()) {
        return Err(PteError::DimensionMismatch {
            what: "signal samples vs time stamps",
            expected: times.len(),
            actual: bad.len(),
        });
    }

    let recording = Recording::new(channel_names.to_vec(), signals.to_vec(), sfreq)?;
    let factor = decimation_factor(sfreq);
    let mut pipeline = Pipeline::plot_preparation(config, factor)?;
    let prepared = pipeline.run(&recording)?.recording;

    let times: Vec<f64> = if config.decimate && factor >= 2 {
        times.iter().copied().step_by(factor).collect()
    } else {
        times.to_vec()
    };

    let all_values: Vec<f64> = prepared.data.iter().flatten().copied().collect();
    let offset = config.padding * rms(&all_values);
    let tick_values: Vec<f64> = (0..prepared.n_channels()).map(|i| offset * i as f64).collect();
    let traces = prepared
        .data
        .into_iter()
        .zip(&tick_values)
        .map(|(channel, shift)| channel.into_iter().map(|v| v + shift).collect())
        .collect();

    Ok(StackedSignals {
        times,
        channel_names: prepared.channel_names,
        traces,
        offset,
        tick_values,
    })
}

/// Export stacked signals as `<file_name>.html`
pub fn sig_plot(
    times: &[f64],
    signals: &[Vec<f64>],
    channel_names: &[String],
    sfreq: f64,
    file_name: impl AsRef<Path>,
    config: &PlotConfig,
) -> PteResult<PathBuf> {
    let stacked = prepare_signals(times, signals, channel_names, sfreq, config)?;

    let mut plot = LinePlot::new(config.title.clone().unwrap_or_default(), "Time (s)", "(a.u.)")
        .spline(true)
        .legend_title("Channel")
        .y_ticks(stacked.tick_values.clone(), stacked.channel_names.clone());
    for (name, trace) in stacked.channel_names.iter().zip(stacked.traces) {
        plot.add_series(name.clone(), stacked.times.clone(), trace);
    }

    let path = html_path(file_name.as_ref());
    plot.write(&path)?;
    tracing::info!(path = %path.display(), channels = channel_names.len(), "Wrote signal plot");
    Ok(path)
}

/// Export a recording, optionally sliced to `(start, end)` seconds
pub fn raw_plot(
    recording: &Recording,
    file_name: impl AsRef<Path>,
    t_slice: Option<(f64, f64)>,
    config: &PlotConfig,
) -> PteResult<PathBuf> {
    let sliced;
    let recording = match t_slice {
        Some((start, end)) => {
            sliced = recording.slice_time(start, end)?;
            &sliced
        }
        None => recording,
    };
    sig_plot(
        &recording.times(),
        &recording.data,
        &recording.channel_names,
        recording.sfreq,
        file_name,
        config,
    )
}

fn html_path(file_name: &Path) -> PathBuf {
    let mut os: OsString = file_name.as_os_str().to_owned();
    os.push(".html");
    PathBuf::from(os)
}

/// One named line of a [`LinePlot`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub name: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Titled multi-series line plot rendered as a standalone Plotly page
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinePlot {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<LineSeries>,
    legend_title: Option<String>,
    y_ticks: Option<(Vec<f64>, Vec<String>)>,
    spline: bool,
}

impl LinePlot {
    pub fn new(title: impl Into<String>, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            ..Self::default()
        }
    }

    pub fn spline(mut self, spline: bool) -> Self {
        self.spline = spline;
        self
    }

    pub fn legend_title(mut self, title: impl Into<String>) -> Self {
        self.legend_title = Some(title.into());
        self
    }

    /// Label the y axis at `values` with `labels` instead of numbers
    pub fn y_ticks(mut self, values: Vec<f64>, labels: Vec<String>) -> Self {
        self.y_ticks = Some((values, labels));
        self
    }

    pub fn add_series(&mut self, name: impl Into<String>, x: Vec<f64>, y: Vec<f64>) {
        self.series.push(LineSeries { name: name.into(), x, y });
    }

    /// Plotly figure (`data` + `layout`)
    pub fn figure(&self) -> Value {
        let shape = if self.spline { "spline" } else { "linear" };
        let data: Vec<Value> = self
            .series
            .iter()
            .map(|s| {
                json!({
                    "type": "scatter",
                    "mode": "lines",
                    "name": s.name,
                    "x": s.x,
                    "y": s.y,
                    "line": { "shape": shape },
                })
            })
            .collect();

        let mut yaxis = json!({ "title": { "text": self.y_label } });
        if let Some((values, labels)) = &self.y_ticks {
            yaxis["tickmode"] = json!("array");
            yaxis["tickvals"] = json!(values);
            yaxis["ticktext"] = json!(labels);
        }
        let mut layout = json!({
            "title": { "text": self.title },
            "xaxis": { "title": { "text": self.x_label } },
            "yaxis": yaxis,
        });
        if let Some(legend) = &self.legend_title {
            layout["legend"] = json!({ "title": { "text": legend } });
        }
        json!({ "data": data, "layout": layout })
    }

    pub fn to_html(&self) -> String {
        // keep "</script>" sequences in labels from closing the script tag
        let figure = self.figure().to_string().replace("</", "<\\/");
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <script src=\"{cdn}\"></script>\n</head>\n<body>\n\
             <div id=\"plot\" style=\"width:100%;height:100vh;\"></div>\n<script>\n\
             const figure = {figure};\n\
             Plotly.newPlot(\"plot\", figure.data, figure.layout, {{responsive: true}});\n\
             </script>\n</body>\n</html>\n",
            title = escape_html(&self.title),
            cdn = PLOTLY_CDN,
            figure = figure,
        )
    }

    pub fn write(&self, path: impl AsRef<Path>) -> PteResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PteError::io(parent, e))?;
        }
        fs::write(path, self.to_html()).map_err(|e| PteError::io(path, e))
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::DetrendType;

    fn signals(n: usize, sfreq: f64) -> (Vec<f64>, Vec<Vec<f64>>, Vec<String>) {
        let times: Vec<f64> = (0..n).map(|i| i as f64 / sfreq).collect();
        let a = times.iter().map(|t| (2.0 * std::f64::consts::PI * 4.0 * t).sin()).collect();
        let b = times.iter().map(|t| 5.0 + 3.0 * t + (2.0 * std::f64::consts::PI * 7.0 * t).cos()).collect();
        (times, vec![a, b], vec!["ECOG_R_1".to_string(), "LFP_R_1".to_string()])
    }

    #[test]
    fn test_decimation_factor() {
        assert_eq!(decimation_factor(1000.0), 5);
        assert_eq!(decimation_factor(4096.0), 10);
        assert_eq!(decimation_factor(250.0), 1);
        assert_eq!(decimation_factor(100.0), 0);
    }

    #[test]
    fn test_prepare_signals_decimates_and_stacks() {
        let (times, data, names) = signals(1000, 1000.0);
        let stacked = prepare_signals(&times, &data, &names, 1000.0, &PlotConfig::default()).unwrap();

        assert_eq!(stacked.times.len(), 200);
        assert_eq!(stacked.times[1], times[5]);
        assert!(stacked.traces.iter().all(|t| t.len() == 200));

        // normalised channels have unit RMS, so the spacing is the padding
        assert!((stacked.offset - 2.0).abs() < 1e-6);
        assert_eq!(stacked.tick_values, vec![0.0, stacked.offset]);
        let mean_second = stacked.traces[1].iter().sum::<f64>() / 200.0;
        assert!((mean_second - stacked.offset).abs() < 0.1);
    }

    #[test]
    fn test_prepare_signals_raw() {
        let (times, data, names) = signals(100, 100.0);
        let config = PlotConfig {
            padding: 0.0,
            ..PlotConfig::raw()
        };
        let stacked = prepare_signals(&times, &data, &names, 100.0, &config).unwrap();
        assert_eq!(stacked.traces, data);
        assert_eq!(stacked.times, times);

        let constant_only = PlotConfig {
            detrend: DetrendType::Constant,
            padding: 0.0,
            ..PlotConfig::raw()
        };
        let stacked = prepare_signals(&times, &data, &names, 100.0, &constant_only).unwrap();
        let mean = stacked.traces[1].iter().sum::<f64>() / 100.0;
        assert!(mean.abs() < 1e-9);
    }

    #[test]
    fn test_prepare_signals_dimension_checks() {
        let (times, data, names) = signals(100, 100.0);
        let err = prepare_signals(&times, &data, &names[..1], 100.0, &PlotConfig::default()).unwrap_err();
        assert!(matches!(err, PteError::DimensionMismatch { .. }));

        let err = prepare_signals(&times[..50], &data, &names, 100.0, &PlotConfig::default()).unwrap_err();
        assert!(matches!(err, PteError::DimensionMismatch { expected: 50, actual: 100, .. }));
    }

    #[test]
    fn test_sig_plot_writes_html() {
        let dir = tempfile::tempdir().unwrap();
        let (times, data, names) = signals(500, 500.0);
        let config = PlotConfig::default().with_title("Rest <ECOG>");
        let path = sig_plot(&times, &data, &names, 500.0, dir.path().join("sub-001_plot"), &config).unwrap();

        assert_eq!(path, dir.path().join("sub-001_plot.html"));
        let html = fs::read_to_string(&path).unwrap();
        assert!(html.contains("<title>Rest &lt;ECOG&gt;</title>"));
        assert!(html.contains("\"ticktext\":[\"ECOG_R_1\",\"LFP_R_1\"]"));
        assert!(html.contains("Time (s)"));
        assert!(html.contains("\"shape\":\"spline\""));
    }

    #[test]
    fn test_raw_plot_slice() {
        let dir = tempfile::tempdir().unwrap();
        let (_, data, names) = signals(1000, 250.0);
        let recording = Recording::new(names, data, 250.0).unwrap();
        let path = raw_plot(&recording, dir.path().join("raw"), Some((1.0, 2.0)), &PlotConfig::raw()).unwrap();
        assert!(path.exists());

        assert!(raw_plot(&recording, dir.path().join("bad"), Some((3.0, 1.0)), &PlotConfig::raw()).is_err());
    }

    #[test]
    fn test_line_plot_figure() {
        let mut plot = LinePlot::new("Predictions", "Time [s]", "Prediction");
        plot.add_series("ECOG", vec![0.0, 1.0], vec![0.2, 0.8]);
        let figure = plot.figure();
        assert_eq!(figure["data"][0]["name"], "ECOG");
        assert_eq!(figure["layout"]["title"]["text"], "Predictions");
        assert!(figure["layout"]["yaxis"].get("tickvals").is_none());
    }
}
