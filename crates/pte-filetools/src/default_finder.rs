//! Finder for any type of file

use crate::finder::{format_file_table, FileFilter, FileFinder, FinderState, Hemispheres};
use pte_core::PteResult;
use std::fmt;
use std::path::{Path, PathBuf};

/// Finds and filters files of any type
#[derive(Debug, Clone, Default)]
pub struct DefaultFinder {
    state: FinderState,
}

impl DefaultFinder {
    pub fn new(hemispheres: Hemispheres) -> Self {
        Self {
            state: FinderState::new(hemispheres),
        }
    }

    /// Iterate over the found paths
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.state.files.iter().map(String::as_str)
    }
}

impl FileFinder for DefaultFinder {
    fn find_files(
        &mut self,
        directory: &Path,
        extensions: Option<&[String]>,
        filter: &FileFilter,
    ) -> PteResult<()> {
        self.state.collect_files(directory, extensions.unwrap_or(&[]))?;
        self.state.apply_filter(filter)
    }

    fn filter_files(&mut self, filter: &FileFilter) -> PteResult<()> {
        self.state.apply_filter(filter)
    }

    fn files(&self) -> Vec<PathBuf> {
        self.state.files.iter().map(PathBuf::from).collect()
    }

    fn directory(&self) -> Option<&Path> {
        self.state.directory.as_deref()
    }

    fn len(&self) -> usize {
        self.state.files.len()
    }

    fn name(&self) -> &str {
        "DefaultFinder"
    }
}

impl fmt::Display for DefaultFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_file_table(f, &self.state.files)
    }
}

impl<'a> IntoIterator for &'a DefaultFinder {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.state.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dataset() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub-001").join("ieeg");
        fs::create_dir_all(&nested).unwrap();
        for name in [
            "sub-001_task-Rest_ieeg.vhdr",
            "sub-001_task-Rest_ieeg.eeg",
            "sub-001_task-Rest_channels.tsv",
        ] {
            fs::write(nested.join(name), b"").unwrap();
        }
        fs::write(dir.path().join("dataset_description.json"), b"{}").unwrap();
        dir
    }

    #[test]
    fn test_find_all_files() {
        let dir = dataset();
        let mut finder = DefaultFinder::default();
        finder.find_files(dir.path(), None, &FileFilter::new()).unwrap();
        assert_eq!(finder.len(), 4);
        assert_eq!(finder.directory(), Some(dir.path()));
    }

    #[test]
    fn test_find_with_extensions_and_keywords() {
        let dir = dataset();
        let mut finder = DefaultFinder::default();
        let extensions = vec![".vhdr".to_string(), ".tsv".to_string()];
        finder
            .find_files(dir.path(), Some(&extensions), &FileFilter::new().keywords(["channels"]))
            .unwrap();
        let files = finder.files();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("sub-001_task-Rest_channels.tsv"));

        finder.filter_files(&FileFilter::new().exclude(["channels"])).unwrap();
        assert!(finder.is_empty());
    }

    #[test]
    fn test_display_table() {
        let dir = dataset();
        let mut finder = DefaultFinder::default();
        assert_eq!(finder.to_string(), "No corresponding files found.");

        let extensions = vec![".vhdr".to_string()];
        finder.find_files(dir.path(), Some(&extensions), &FileFilter::new()).unwrap();
        let table = finder.to_string();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Corresponding files found:");
        assert_eq!(lines[1], "  Index  Filename");
        assert!(lines[2].starts_with('\u{2500}'));
        assert_eq!(lines[3], "      0  sub-001_task-Rest_ieeg.vhdr");
    }
}
