//! Finder for BIDS-compliant datasets

use crate::finder::{format_file_table, FileFilter, FileFinder, FinderState, Hemispheres};
use pte_core::{BidsPath, PteResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extensions searched when none are given
pub const DEFAULT_BIDS_EXTENSIONS: &[&str] = &[".vhdr", ".edf"];

/// Finds raw data files in a BIDS dataset and exposes them as [`BidsPath`]s
#[derive(Debug, Clone, Default)]
pub struct BidsFinder {
    state: FinderState,
    bids_paths: Vec<BidsPath>,
}

impl BidsFinder {
    pub fn new(hemispheres: Hemispheres) -> Self {
        Self {
            state: FinderState::new(hemispheres),
            bids_paths: Vec::new(),
        }
    }

    /// Dataset root (the searched directory)
    pub fn bids_root(&self) -> Option<&Path> {
        self.state.directory.as_deref()
    }

    /// Found files as BIDS paths
    pub fn bids_paths(&self) -> &[BidsPath] {
        &self.bids_paths
    }

    /// Convert the filtered string paths; files that are not valid BIDS names are skipped
    fn make_bids_paths(&mut self) {
        let root = self.state.directory.clone();
        let mut bids_paths = Vec::with_capacity(self.state.files.len());
        for file in &self.state.files {
            match BidsPath::from_fname(file) {
                Ok(mut bids_path) => {
                    if let Some(root) = &root {
                        bids_path.update_root(root);
                    }
                    bids_paths.push(bids_path);
                }
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "Could not create BIDS path, skipping file");
                }
            }
        }
        self.state.files = bids_paths
            .iter()
            .map(|p| p.source_path().to_string_lossy().into_owned())
            .collect();
        self.bids_paths = bids_paths;
    }
}

impl FileFinder for BidsFinder {
    fn find_files(
        &mut self,
        directory: &Path,
        extensions: Option<&[String]>,
        filter: &FileFilter,
    ) -> PteResult<()> {
        let defaults: Vec<String>;
        let extensions = match extensions {
            Some(ext) => ext,
            None => {
                defaults = DEFAULT_BIDS_EXTENSIONS.iter().map(|s| s.to_string()).collect();
                &defaults
            }
        };
        self.state.collect_files(directory, extensions)?;
        self.state.apply_filter(filter)?;
        self.make_bids_paths();
        Ok(())
    }

    fn filter_files(&mut self, filter: &FileFilter) -> PteResult<()> {
        self.state.files = self
            .bids_paths
            .iter()
            .map(|p| p.fpath().to_string_lossy().into_owned())
            .collect();
        self.state.apply_filter(filter)?;
        self.make_bids_paths();
        Ok(())
    }

    fn files(&self) -> Vec<PathBuf> {
        self.bids_paths.iter().map(BidsPath::fpath).collect()
    }

    fn directory(&self) -> Option<&Path> {
        self.bids_root()
    }

    fn len(&self) -> usize {
        self.bids_paths.len()
    }

    fn name(&self) -> &str {
        "BidsFinder"
    }
}

impl fmt::Display for BidsFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_file_table(f, &self.state.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dataset() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (sub, ses) in [("001", "EphysMedOff01"), ("002", "EphysMedOn01")] {
            let nested = dir.path().join(format!("sub-{sub}")).join(format!("ses-{ses}")).join("ieeg");
            fs::create_dir_all(&nested).unwrap();
            let stem = format!("sub-{sub}_ses-{ses}_task-Rest_acq-StimOff_run-01_ieeg");
            for ext in ["vhdr", "eeg", "vmrk"] {
                fs::write(nested.join(format!("{stem}.{ext}")), b"").unwrap();
            }
        }
        fs::write(dir.path().join("notes.edf"), b"").unwrap();
        dir
    }

    #[test]
    fn test_default_extensions_and_conversion() {
        let dir = dataset();
        let mut finder = BidsFinder::default();
        finder.find_files(dir.path(), None, &FileFilter::new()).unwrap();

        // notes.edf has no subject entity and is skipped
        assert_eq!(finder.len(), 2);
        let paths = finder.bids_paths();
        assert_eq!(paths[0].subject(), Some("001"));
        assert_eq!(paths[0].root.as_deref(), Some(dir.path()));
        assert!(finder.files()[0].exists());
    }

    #[test]
    fn test_refilter_bids_paths() {
        let dir = dataset();
        let mut finder = BidsFinder::default();
        finder.find_files(dir.path(), None, &FileFilter::new()).unwrap();
        finder.filter_files(&FileFilter::new().medication("on")).unwrap();

        assert_eq!(finder.len(), 1);
        assert_eq!(finder.bids_paths()[0].subject(), Some("002"));
    }
}
