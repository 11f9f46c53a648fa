use crate::cli::{band_edges, SpectrumArgs};
use anyhow::Context;
use pte_processing::{read_recording_csv, ChannelSpectra, SpectrumConfig};

pub fn execute(args: SpectrumArgs) -> anyhow::Result<()> {
    let recording = read_recording_csv(&args.file, args.sfreq)
        .with_context(|| format!("Failed to read recording {}", args.file.display()))?;
    let config = SpectrumConfig {
        nperseg: args.nperseg,
        line_freq: args.line_freq,
        bandpass: band_edges(args.bandpass.as_deref()),
        ..SpectrumConfig::default()
    };
    let spectra = ChannelSpectra::compute(&recording, &config)?;
    let band_powers = spectra.band_powers();

    if args.json {
        let json = serde_json::json!({
            "sfreq": recording.sfreq,
            "spectra": spectra,
            "band_powers": band_powers,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{:<16} {:>12}  bands", "Channel", "Peak (Hz)");
    for (channel, spectrum) in spectra.channel_names.iter().zip(&spectra.spectra) {
        let peak = spectrum
            .peak_frequency()
            .map(|f| format!("{:.2}", f))
            .unwrap_or_else(|| "-".to_string());
        let bands: Vec<String> = band_powers
            .iter()
            .filter(|b| &b.channel == channel)
            .map(|b| format!("{}={:.3e}", b.band, b.power))
            .collect();
        println!("{:<16} {:>12}  {}", channel, peak, bands.join(" "));
    }
    Ok(())
}
