use crate::cli::ResultsArgs;
use anyhow::Context;
use pte_decoding::{load_results, write_average_csv, write_raw_csv, FilesOrDir};

fn score_cell(score: f64) -> String {
    if score.is_nan() {
        "-".to_string()
    } else {
        format!("{:.3}", score)
    }
}

pub fn execute(args: ResultsArgs) -> anyhow::Result<()> {
    let source = FilesOrDir::Dir(args.directory.clone());
    let (average, raw) = load_results(&source, &args.keywords, &args.scoring)
        .with_context(|| format!("Failed to load results from {}", args.directory.display()))?;

    if let Some(output) = &args.output {
        if args.raw {
            write_raw_csv(output, &raw, &args.scoring)?;
        } else {
            write_average_csv(output, &average, &args.scoring)?;
        }
        tracing::info!(path = %output.display(), "Wrote results table");
        println!("{}", output.display());
        return Ok(());
    }

    if args.raw {
        println!("{:<60} {:<8} {}", "File", "Channels", args.scoring);
        for result in &raw {
            let name = result
                .filename
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("{:<60} {:<8} {}", name, result.channels, score_cell(result.score));
        }
    } else {
        println!(
            "{:<10} {:<10} {:<11} {:>11} {:>16} {:<8} {}",
            "Subject", "Medication", "Stimulation", "Trials Used", "Trials Discarded", "Channels", args.scoring
        );
        for result in &average {
            println!(
                "{:<10} {:<10} {:<11} {:>11} {:>16} {:<8} {}",
                result.subject.as_deref().unwrap_or("-"),
                result.medication.label(),
                result.stimulation.label(),
                result.trials_used,
                result.trials_discarded,
                result.channels,
                score_cell(result.score)
            );
        }
    }
    Ok(())
}
