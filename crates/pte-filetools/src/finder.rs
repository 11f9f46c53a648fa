//! Core finder trait and the filtering shared by all finders

use pte_core::{parse_entities, HemisphereSide, Medication, PteError, PteResult, Stimulation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Hemisphere of the ECOG strip per subject (`"R"`, `"L"` or unset)
pub type Hemispheres = BTreeMap<String, Option<String>>;

/// Load a hemisphere map from a JSON object such as `{"003": "R", "007": null}`
pub fn load_hemispheres(path: impl AsRef<Path>) -> PteResult<Hemispheres> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| PteError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Filters applied to a list of found files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFilter {
    /// Keep files containing any of these strings
    #[serde(default)]
    pub keywords: Vec<String>,
    /// `ipsilateral` / `contralateral` relative to the ECOG strip
    #[serde(default)]
    pub hemisphere: Option<String>,
    /// `on` / `off` (or `StimOn` / `StimOff`)
    #[serde(default)]
    pub stimulation: Option<String>,
    /// `on` / `off` (or `MedOn` / `MedOff`)
    #[serde(default)]
    pub medication: Option<String>,
    /// Drop files containing any of these strings
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    pub fn hemisphere(mut self, hemisphere: impl Into<String>) -> Self {
        self.hemisphere = Some(hemisphere.into());
        self
    }

    pub fn stimulation(mut self, stimulation: impl Into<String>) -> Self {
        self.stimulation = Some(stimulation.into());
        self
    }

    pub fn medication(mut self, medication: impl Into<String>) -> Self {
        self.medication = Some(medication.into());
        self
    }

    /// True when no filter is set
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.exclude.is_empty()
            && self.hemisphere.is_none()
            && self.stimulation.is_none()
            && self.medication.is_none()
    }
}

/// Core trait for finding and filtering files
pub trait FileFinder: fmt::Display + Send {
    /// Find files in `directory` (recursively) and apply `filter`
    ///
    /// `extensions` are matched as substrings of the full path; `None`
    /// selects the finder's default extensions.
    fn find_files(
        &mut self,
        directory: &Path,
        extensions: Option<&[String]>,
        filter: &FileFilter,
    ) -> PteResult<()>;

    /// Filter the current file list
    fn filter_files(&mut self, filter: &FileFilter) -> PteResult<()>;

    /// Current file list
    fn files(&self) -> Vec<PathBuf>;

    /// Directory searched by the last `find_files`
    fn directory(&self) -> Option<&Path>;

    fn len(&self) -> usize {
        self.files().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finder name for logs
    fn name(&self) -> &str;
}

/// State shared by finder implementations
#[derive(Debug, Clone, Default)]
pub struct FinderState {
    pub hemispheres: Hemispheres,
    pub directory: Option<PathBuf>,
    pub files: Vec<String>,
}

impl FinderState {
    pub fn new(hemispheres: Hemispheres) -> Self {
        Self {
            hemispheres,
            directory: None,
            files: Vec::new(),
        }
    }

    /// Walk `directory` and keep files whose path contains any extension
    pub fn collect_files(&mut self, directory: &Path, extensions: &[String]) -> PteResult<()> {
        if !directory.is_dir() {
            return Err(PteError::DirectoryNotFound {
                directory: directory.to_path_buf(),
            });
        }

        let files = WalkDir::new(directory)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        self.directory = Some(directory.to_path_buf());
        self.files = keyword_search(files, extensions);
        tracing::debug!(
            directory = %directory.display(),
            found = self.files.len(),
            "Collected files"
        );
        Ok(())
    }

    /// Apply exclude, keyword, stimulation, medication and hemisphere filters in that order
    pub fn apply_filter(&mut self, filter: &FileFilter) -> PteResult<()> {
        let mut files = self.files.clone();

        if !filter.exclude.is_empty() {
            files.retain(|file| !filter.exclude.iter().any(|item| file.contains(item.as_str())));
        }
        if !filter.keywords.is_empty() {
            files = keyword_search(files, &filter.keywords);
        }
        if let Some(stimulation) = &filter.stimulation {
            let token = Stimulation::parse_keyword(stimulation)?.file_token();
            files.retain(|file| file.contains(token));
        }
        if let Some(medication) = &filter.medication {
            let token = Medication::parse_keyword(medication)?.file_token();
            files.retain(|file| file.contains(token));
        }
        if let Some(hemisphere) = &filter.hemisphere {
            let side = HemisphereSide::parse_keyword(hemisphere)?;
            files = self.filter_hemisphere(files, side)?;
        }

        self.files = files;
        Ok(())
    }

    fn filter_hemisphere(&self, files: Vec<String>, side: HemisphereSide) -> PteResult<Vec<String>> {
        let mut matching = Vec::with_capacity(files.len());
        for file in files {
            let subject = parse_entities(&file).subject.unwrap_or_default();
            let hem = match self.hemispheres.get(&subject) {
                Some(Some(hem)) => format!("{}_", hem),
                _ => {
                    return Err(PteError::HemisphereNotSpecified {
                        subject,
                        specified: self
                            .hemispheres
                            .iter()
                            .map(|(sub, hem)| format!("{}: {}", sub, hem.as_deref().unwrap_or("None")))
                            .collect(),
                    })
                }
            };
            let ipsilateral = file.contains(&hem);
            match side {
                HemisphereSide::Ipsilateral if ipsilateral => matching.push(file),
                HemisphereSide::Contralateral if !ipsilateral => matching.push(file),
                _ => {}
            }
        }
        Ok(matching)
    }
}

/// Keep files containing any of the keywords; no keywords keeps everything
pub fn keyword_search(files: Vec<String>, keywords: &[String]) -> Vec<String> {
    if keywords.is_empty() {
        return files;
    }
    files
        .into_iter()
        .filter(|file| keywords.iter().any(|key| file.contains(key.as_str())))
        .collect()
}

/// Terminal width from `$COLUMNS`, defaulting to 80
fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse().ok())
        .filter(|&c| c > 0)
        .unwrap_or(80)
}

/// Render the found-files table used by every finder's `Display`
pub fn format_file_table(f: &mut fmt::Formatter<'_>, files: &[String]) -> fmt::Result {
    if files.is_empty() {
        return write!(f, "No corresponding files found.");
    }

    let basenames: Vec<String> = files
        .iter()
        .map(|file| {
            Path::new(file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.clone())
        })
        .collect();
    let col_width = basenames.iter().map(|n| n.chars().count()).max().unwrap_or(0);
    let index_width = "Index".len() + 2;

    writeln!(f, "Corresponding files found:")?;
    writeln!(
        f,
        "{:>iw$}{:>fw$}",
        "Index",
        "Filename",
        iw = index_width,
        fw = "Filename".len() + 2
    )?;
    write!(f, "{}", "\u{2500}".repeat(terminal_width()))?;
    for (idx, name) in basenames.iter().enumerate() {
        write!(f, "\n{:>iw$}{:>fw$}", idx, name, iw = index_width, fw = col_width + 2)?;
    }
    Ok(())
}
