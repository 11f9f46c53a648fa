//! CSV import/export of recordings

use pte_core::{param_error, PteError, PteResult, Recording};
use std::path::Path;

const TIME_COLUMNS: &[&str] = &["time", "times", "time (s)"];

fn parse_cell(cell: &str, row: usize, column: &str) -> PteResult<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>().map_err(|_| PteError::FormatError {
        reason: format!("Row {}, column '{}': '{}' is not a number", row + 1, column, cell),
    })
}

/// Read a recording from a CSV file with one column per channel
///
/// A leading `time`/`times`/`Time (s)` column provides the first timestamp
/// and, when `sfreq` is not given, the sampling rate.
pub fn read_recording_csv(path: impl AsRef<Path>, sfreq: Option<f64>) -> PteResult<Recording> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();
    let has_time = headers
        .first()
        .map(|h| TIME_COLUMNS.contains(&h.to_lowercase().as_str()))
        .unwrap_or(false);
    let first_channel = usize::from(has_time);
    let channel_names: Vec<String> = headers[first_channel.min(headers.len())..].to_vec();
    if channel_names.is_empty() {
        return Err(PteError::FormatError {
            reason: format!("{} has no channel columns", path.display()),
        });
    }

    let mut times = Vec::new();
    let mut data = vec![Vec::new(); channel_names.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        if record.len() != headers.len() {
            return Err(PteError::DimensionMismatch {
                what: "CSV row length",
                expected: headers.len(),
                actual: record.len(),
            });
        }
        if has_time {
            times.push(parse_cell(&record[0], row, &headers[0])?);
        }
        for (channel, (values, name)) in data.iter_mut().zip(&channel_names).enumerate() {
            values.push(parse_cell(&record[first_channel + channel], row, name)?);
        }
    }

    let sfreq = match sfreq {
        Some(sfreq) => sfreq,
        None if times.len() >= 2 => {
            let dt = times[1] - times[0];
            if !(dt > 0.0) {
                return Err(param_error!("sfreq", "time column of {} is not increasing", path.display()));
            }
            1.0 / dt
        }
        None => {
            return Err(param_error!(
                "sfreq",
                "sampling frequency must be given when {} has no time column",
                path.display()
            ))
        }
    };

    let first_time = times.first().copied().unwrap_or(0.0);
    tracing::debug!(
        path = %path.display(),
        channels = channel_names.len(),
        samples = data[0].len(),
        sfreq,
        "Read recording"
    );
    Ok(Recording::new(channel_names, data, sfreq)?.with_first_time(first_time))
}

/// Write a recording as CSV with a leading `time` column
pub fn write_recording_csv(recording: &Recording, path: impl AsRef<Path>) -> PteResult<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut header = vec!["time".to_string()];
    header.extend(recording.channel_names.iter().cloned());
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for (i, t) in recording.times().iter().enumerate() {
        let mut row = Vec::with_capacity(recording.n_channels() + 1);
        row.push(t.to_string());
        row.extend(recording.data.iter().map(|channel| channel[i].to_string()));
        writer.write_record(&row).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| PteError::io(path, e))
}

fn csv_error(path: &Path, err: csv::Error) -> PteError {
    PteError::FormatError {
        reason: format!("{}: {}", path.display(), err),
    }
}
