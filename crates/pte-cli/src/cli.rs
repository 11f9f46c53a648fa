use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pte",
    version,
    about = "Electrophysiology utilities: find recordings, plot signals, decode movement",
    long_about = "Find and filter recordings (plain directories or BIDS datasets), export signal plots\n\
                  and spectra, and run cross-validated movement decoding on feature files."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Find and filter recording files
    Find(FindArgs),
    /// Decode movement from feature files
    Decode(DecodeArgs),
    /// Aggregate decoding results
    Results(ResultsArgs),
    /// Export a recording as an HTML signal plot
    Plot(PlotArgs),
    /// Welch spectra and band powers of a recording
    Spectrum(SpectrumArgs),
}

#[derive(Args)]
pub struct FindArgs {
    /// Directory to search recursively
    pub directory: PathBuf,

    /// Finder type: any or bids
    #[arg(long, default_value = "any")]
    pub datatype: String,

    /// Substrings the paths must contain (default: all files, or .vhdr/.edf for BIDS)
    #[arg(long, num_args = 1..)]
    pub extensions: Vec<String>,

    /// Keep files containing any of these strings
    #[arg(long, num_args = 1..)]
    pub keywords: Vec<String>,

    /// Drop files containing any of these strings
    #[arg(long, num_args = 1..)]
    pub exclude: Vec<String>,

    /// ipsilateral or contralateral to the ECOG strip
    #[arg(long)]
    pub hemisphere: Option<String>,

    /// on or off
    #[arg(long)]
    pub stimulation: Option<String>,

    /// on or off
    #[arg(long)]
    pub medication: Option<String>,

    /// JSON map of subject to ECOG hemisphere ("R" or "L")
    #[arg(long)]
    pub hemispheres: Option<PathBuf>,

    /// Print the found paths as a JSON array
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct DecodeArgs {
    /// Decoding configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Directory holding one sub-directory per feature file
    #[arg(long)]
    pub features_root: PathBuf,

    /// Root directory for the results
    #[arg(long)]
    pub out_root: PathBuf,

    /// Feature files to decode (default: every feature directory under the root)
    #[arg(long, num_args = 1..)]
    pub files: Vec<String>,

    /// Files decoded at the same time
    #[arg(long, default_value_t = 4)]
    pub jobs: usize,
}

#[derive(Args)]
pub struct ResultsArgs {
    /// Directory searched for *results.csv files
    pub directory: PathBuf,

    /// Keep files containing any of these strings
    #[arg(long, num_args = 1..)]
    pub keywords: Vec<String>,

    /// Score column of the results files
    #[arg(long, default_value = "balanced_accuracy")]
    pub scoring: String,

    /// Write the table to this CSV file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Per-file rows instead of subject averages
    #[arg(long, default_value_t = false)]
    pub raw: bool,
}

#[derive(Args)]
pub struct PlotArgs {
    /// Recording CSV, one column per channel (optionally led by a time column)
    pub file: PathBuf,

    /// Output name; `.html` is appended
    #[arg(short, long)]
    pub output: PathBuf,

    /// Sampling rate in Hz (default: from the time column)
    #[arg(long)]
    pub sfreq: Option<f64>,

    /// Start time in seconds
    #[arg(long, requires = "end")]
    pub start: Option<f64>,

    /// End time in seconds
    #[arg(long, requires = "start")]
    pub end: Option<f64>,

    /// Plot configuration (JSON); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub no_decimate: bool,

    #[arg(long, default_value_t = false)]
    pub no_normalize: bool,

    /// linear, constant or none
    #[arg(long)]
    pub detrend: Option<String>,

    /// Spacing between channels in units of the overall RMS
    #[arg(long)]
    pub padding: Option<f64>,

    #[arg(long)]
    pub title: Option<String>,

    /// Notch out this line-noise frequency in Hz (e.g. 50 or 60)
    #[arg(long)]
    pub line_freq: Option<f64>,

    /// Zero-phase bandpass applied first, in Hz
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    pub bandpass: Option<Vec<f64>>,
}

#[derive(Args)]
pub struct SpectrumArgs {
    /// Recording CSV, one column per channel (optionally led by a time column)
    pub file: PathBuf,

    /// Sampling rate in Hz (default: from the time column)
    #[arg(long)]
    pub sfreq: Option<f64>,

    /// Welch segment length in samples (default: one second)
    #[arg(long)]
    pub nperseg: Option<usize>,

    /// Print spectra and band powers as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Notch out this line-noise frequency in Hz (e.g. 50 or 60)
    #[arg(long)]
    pub line_freq: Option<f64>,

    /// Zero-phase bandpass applied first, in Hz
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    pub bandpass: Option<Vec<f64>>,
}

/// `--bandpass LOW HIGH` as a pair
pub fn band_edges(values: Option<&[f64]>) -> Option<(f64, f64)> {
    match values? {
        [low, high] => Some((*low, *high)),
        _ => None,
    }
}
