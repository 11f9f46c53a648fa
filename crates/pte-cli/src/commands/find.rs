use crate::cli::FindArgs;
use anyhow::Context;
use pte_filetools::{get_filefinder, load_hemispheres, FileFilter, FileFinder};

pub fn execute(args: FindArgs) -> anyhow::Result<()> {
    let hemispheres = args
        .hemispheres
        .as_ref()
        .map(|path| {
            load_hemispheres(path).with_context(|| format!("Failed to read hemispheres from {}", path.display()))
        })
        .transpose()?;
    let mut finder = get_filefinder(&args.datatype, hemispheres)?;

    let mut filter = FileFilter::new().keywords(args.keywords).exclude(args.exclude);
    filter.hemisphere = args.hemisphere;
    filter.stimulation = args.stimulation;
    filter.medication = args.medication;

    let extensions = (!args.extensions.is_empty()).then_some(args.extensions.as_slice());
    finder
        .find_files(&args.directory, extensions, &filter)
        .with_context(|| format!("Failed to search {}", args.directory.display()))?;
    tracing::info!(finder = finder.name(), files = finder.len(), "Search finished");

    if args.json {
        let files: Vec<String> = finder.files().iter().map(|p| p.display().to_string()).collect();
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else {
        println!("{}", finder);
    }
    Ok(())
}
