use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn pte() -> Command {
    Command::cargo_bin("pte").unwrap()
}

const FEATURE_FILE: &str = "sub-001_ses-EphysMedOff01_task-SelfpacedRotationR_acq-StimOff_run-01_ieeg";

/// 8 movements of 1 s every 10 s at 10 Hz; the ECOG feature follows the movement
fn write_feature_dir(root: &Path) {
    let dir = root.join(FEATURE_FILE);
    fs::create_dir_all(&dir).unwrap();
    let mut csv = String::from(",ECOG_R_1_fft_beta,LFP_R_1_fft_beta,ANALOG_R_ROTA_CH\n");
    for i in 0..820usize {
        let moving = i >= 60 && (i - 60) % 100 < 10 && i < 860;
        let noise = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
        let ecog = if moving { 2.0 } else { 0.0 } + 0.2 * noise;
        let lfp = ((i * 104729) % 17) as f64 / 17.0;
        csv.push_str(&format!("{},{},{},{}\n", i, ecog, lfp, u8::from(moving)));
    }
    fs::write(dir.join(format!("{}_FEATURES.csv", FEATURE_FILE)), csv).unwrap();
    fs::write(
        dir.join(format!("{}_SETTINGS.json", FEATURE_FILE)),
        r#"{"ch_names": ["ECOG_R_1", "LFP_R_1"], "sampling_rate_features": 10.0}"#,
    )
    .unwrap();
}

fn write_sine_csv(path: &Path) {
    let mut csv = String::from("time,ECOG_R_1,LFP_R_1\n");
    for i in 0..1000 {
        let t = i as f64 / 100.0;
        let sine = (2.0 * std::f64::consts::PI * 10.0 * t).sin();
        csv.push_str(&format!("{},{},{}\n", t, sine, 0.5 * sine + t));
    }
    fs::write(path, csv).unwrap();
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    pte().assert().failure().stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    pte().arg("--version").assert().success().stdout(predicate::str::contains("pte"));
}

// =============================================================================
// FIND SUBCOMMAND
// =============================================================================

#[test]
fn test_find_json_with_keywords() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["sub-001_MedOff_run-1.vhdr", "sub-001_MedOn_run-1.vhdr", "notes.txt"] {
        fs::write(dir.path().join(name), "").unwrap();
    }

    let output = pte()
        .arg("find")
        .arg(dir.path())
        .args(["--extensions", ".vhdr", "--medication", "off", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let files: Vec<String> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("sub-001_MedOff_run-1.vhdr"));
}

#[test]
fn test_find_table() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.edf"), "").unwrap();
    pte()
        .arg("find")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Corresponding files found:"))
        .stdout(predicate::str::contains("a.edf"));
}

#[test]
fn test_find_unknown_datatype_fails() {
    let dir = tempfile::tempdir().unwrap();
    pte()
        .arg("find")
        .arg(dir.path())
        .args(["--datatype", "edf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("edf"));
}

#[test]
fn test_find_missing_directory_fails() {
    pte().args(["find", "/definitely/not/here"]).assert().failure();
}

// =============================================================================
// PLOT / SPECTRUM SUBCOMMANDS
// =============================================================================

#[test]
fn test_plot_writes_html() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("recording.csv");
    write_sine_csv(&csv);
    let output = dir.path().join("signals");

    pte()
        .arg("plot")
        .arg(&csv)
        .arg("--output")
        .arg(&output)
        .args(["--start", "1.0", "--end", "5.0", "--detrend", "constant", "--title", "Sines"])
        .assert()
        .success()
        .stdout(predicate::str::contains("signals.html"));

    let html = fs::read_to_string(dir.path().join("signals.html")).unwrap();
    assert!(html.contains("Sines"));
    assert!(html.contains("ECOG_R_1"));
}

#[test]
fn test_plot_rejects_bad_detrend() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("recording.csv");
    write_sine_csv(&csv);
    pte()
        .arg("plot")
        .arg(&csv)
        .arg("--output")
        .arg(dir.path().join("out"))
        .args(["--detrend", "quadratic"])
        .assert()
        .failure();
}

#[test]
fn test_spectrum_json_peak() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("recording.csv");
    write_sine_csv(&csv);

    let output = pte().arg("spectrum").arg(&csv).arg("--json").assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!((parsed["sfreq"].as_f64().unwrap() - 100.0).abs() < 1e-6);
    assert_eq!(parsed["spectra"]["channel_names"].as_array().unwrap().len(), 2);
    assert!(parsed["band_powers"].as_array().unwrap().len() >= 2);
}

#[test]
fn test_spectrum_line_freq_notch() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("recording.csv");
    write_sine_csv(&csv);

    let alpha_power = |extra: &[&str]| -> f64 {
        let output = pte().arg("spectrum").arg(&csv).arg("--json").args(extra).assert().success();
        let parsed: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
        parsed["band_powers"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["channel"] == "ECOG_R_1" && b["band"] == "alpha")
            .and_then(|b| b["power"].as_f64())
            .unwrap()
    };
    let raw = alpha_power(&[]);
    let notched = alpha_power(&["--line-freq", "10"]);
    assert!(notched < 0.3 * raw, "alpha power {notched} vs {raw}");
}

#[test]
fn test_plot_with_bandpass() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("recording.csv");
    write_sine_csv(&csv);

    pte()
        .arg("plot")
        .arg(&csv)
        .arg("--output")
        .arg(dir.path().join("filtered"))
        .args(["--bandpass", "1", "20", "--line-freq", "25"])
        .assert()
        .success()
        .stdout(predicate::str::contains("filtered.html"));

    // the high edge must stay below Nyquist (50 Hz)
    pte()
        .arg("plot")
        .arg(&csv)
        .arg("--output")
        .arg(dir.path().join("bad"))
        .args(["--bandpass", "1", "80"])
        .assert()
        .failure();
}

// =============================================================================
// DECODE / RESULTS SUBCOMMANDS
// =============================================================================

#[test]
fn test_decode_then_results() {
    let features = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_feature_dir(features.path());
    let config = features.path().join("decode.json");
    fs::write(
        &config,
        r#"{
            "label_channels": ["ANALOG_R_ROTA_CH"],
            "target_channels": ["ROTA"],
            "cv_outer": {"type": "group_k_fold", "n_splits": 4},
            "dist_onset": 1.0,
            "dist_end": 1.0,
            "pred_begin": -1.0,
            "pred_end": 1.0
        }"#,
    )
    .unwrap();

    pte()
        .arg("decode")
        .arg("--config")
        .arg(&config)
        .arg("--features-root")
        .arg(features.path())
        .arg("--out-root")
        .arg(out.path())
        .args(["--jobs", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(FEATURE_FILE));

    let average = out.path().join("average.csv");
    pte()
        .arg("results")
        .arg(out.path())
        .arg("--output")
        .arg(&average)
        .assert()
        .success();
    let text = fs::read_to_string(&average).unwrap();
    assert!(text.starts_with("Subject,Medication,Stimulation,Trials Used,Trials Discarded,Channels,Balanced Accuracy\n"));
    assert!(text.contains("001,OFF,OFF,8,0,ECOG,"));

    pte()
        .arg("results")
        .arg(out.path())
        .arg("--raw")
        .assert()
        .success()
        .stdout(predicate::str::contains("_results.csv"));
}

#[test]
fn test_decode_reports_failed_files() {
    let features = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let config = features.path().join("decode.json");
    fs::write(&config, "{}").unwrap();

    pte()
        .arg("decode")
        .arg("--config")
        .arg(&config)
        .arg("--features-root")
        .arg(features.path())
        .arg("--out-root")
        .arg(out.path())
        .args(["--files", "missing_ieeg"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing_ieeg: failed"))
        .stderr(predicate::str::contains("1 of 1 files failed"));
}

#[test]
fn test_decode_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("decode.json");
    fs::write(&config, r#"{"use_times": 0}"#).unwrap();
    pte()
        .arg("decode")
        .arg("--config")
        .arg(&config)
        .arg("--features-root")
        .arg(dir.path())
        .arg("--out-root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("use_times"));
}
