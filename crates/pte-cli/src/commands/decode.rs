use crate::cli::DecodeArgs;
use anyhow::{bail, Context};
use pte_decoding::{run_batch, BatchStatus, DecodingConfig, FeatureReader, PredictionRequest};
use std::fs;
use std::path::Path;

/// Sub-directories of `root` that hold a `<name>_FEATURES.csv`
fn discover_feature_files(root: &Path) -> anyhow::Result<Vec<String>> {
    let reader = FeatureReader::new(root);
    let mut files = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Failed to list {}", root.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if reader.features_path(&name).is_file() {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

pub async fn execute(args: DecodeArgs) -> anyhow::Result<()> {
    let config = DecodingConfig::load(&args.config)
        .with_context(|| format!("Failed to load decoding configuration {}", args.config.display()))?;

    let files = if args.files.is_empty() {
        discover_feature_files(&args.features_root)?
    } else {
        args.files
    };
    if files.is_empty() {
        bail!("No feature files found in {}", args.features_root.display());
    }
    tracing::info!(files = files.len(), jobs = args.jobs, "Starting decoding");

    let requests = files
        .into_iter()
        .map(|feature_file| PredictionRequest {
            features_root: args.features_root.clone(),
            feature_file,
            out_root: args.out_root.clone(),
            config: config.clone(),
        })
        .collect();
    let outcomes = run_batch(requests, args.jobs).await;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.status {
            BatchStatus::Completed(out_file) => println!("{}: {}", outcome.feature_file, out_file.display()),
            BatchStatus::Skipped => println!("{}: skipped (no label channel)", outcome.feature_file),
            BatchStatus::Failed(reason) => {
                failed += 1;
                println!("{}: failed ({})", outcome.feature_file, reason);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} files failed", failed, outcomes.len());
    }
    Ok(())
}
