use crate::cli::{band_edges, PlotArgs};
use anyhow::Context;
use pte_processing::{raw_plot, read_recording_csv, DetrendType, PlotConfig};

pub fn execute(args: PlotArgs) -> anyhow::Result<()> {
    let recording = read_recording_csv(&args.file, args.sfreq)
        .with_context(|| format!("Failed to read recording {}", args.file.display()))?;

    let mut config = match &args.config {
        Some(path) => PlotConfig::load(path)?,
        None => PlotConfig::default(),
    };
    if args.no_decimate {
        config.decimate = false;
    }
    if args.no_normalize {
        config.normalize = false;
    }
    if let Some(detrend) = &args.detrend {
        config.detrend = detrend.parse::<DetrendType>()?;
    }
    if let Some(padding) = args.padding {
        config.padding = padding;
    }
    if let Some(title) = args.title {
        config.title = Some(title);
    }
    if args.line_freq.is_some() {
        config.line_freq = args.line_freq;
    }
    if let Some(edges) = band_edges(args.bandpass.as_deref()) {
        config.bandpass = Some(edges);
    }
    config.validate()?;

    let t_slice = args.start.zip(args.end);
    let path = raw_plot(&recording, &args.output, t_slice, &config)?;
    println!("{}", path.display());
    Ok(())
}
