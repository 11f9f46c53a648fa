//! BIDS filename entities and paths
//!
//! Only the naming scheme is handled here: `key-value` entities joined by
//! underscores, followed by a suffix and an extension, e.g.
//! `sub-003_ses-EphysMedOff01_task-Rest_run-01_ieeg.vhdr`.

use crate::error::{PteError, PteResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Datatype directories recognised when inferring `BidsPath::datatype`
pub const BIDS_DATATYPES: &[&str] = &[
    "anat", "beh", "dwi", "eeg", "fmap", "func", "ieeg", "meg", "nirs", "perf", "pet",
];

/// Entities that can appear in a BIDS filename
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidsEntities {
    pub subject: Option<String>,
    pub session: Option<String>,
    pub task: Option<String>,
    pub acquisition: Option<String>,
    pub run: Option<String>,
    pub processing: Option<String>,
    pub recording: Option<String>,
    pub space: Option<String>,
    pub split: Option<String>,
    pub description: Option<String>,
}

impl BidsEntities {
    /// Look up an entity by its long name ("subject") or its key ("sub")
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "subject" | "sub" => &self.subject,
            "session" | "ses" => &self.session,
            "task" => &self.task,
            "acquisition" | "acq" => &self.acquisition,
            "run" => &self.run,
            "processing" | "proc" => &self.processing,
            "recording" | "rec" => &self.recording,
            "space" => &self.space,
            "split" => &self.split,
            "description" | "desc" => &self.description,
            _ => return None,
        };
        value.as_deref()
    }

    fn slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "sub" => Some(&mut self.subject),
            "ses" => Some(&mut self.session),
            "task" => Some(&mut self.task),
            "acq" => Some(&mut self.acquisition),
            "run" => Some(&mut self.run),
            "proc" => Some(&mut self.processing),
            "rec" => Some(&mut self.recording),
            "space" => Some(&mut self.space),
            "split" => Some(&mut self.split),
            "desc" => Some(&mut self.description),
            _ => None,
        }
    }

    /// Serialise entities back to the `key-value_...` prefix in BIDS order
    pub fn to_prefix(&self) -> String {
        [
            ("sub", &self.subject),
            ("ses", &self.session),
            ("task", &self.task),
            ("acq", &self.acquisition),
            ("run", &self.run),
            ("proc", &self.processing),
            ("space", &self.space),
            ("rec", &self.recording),
            ("split", &self.split),
            ("desc", &self.description),
        ]
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| format!("{}-{}", key, v)))
        .collect::<Vec<_>>()
        .join("_")
    }
}

/// Split a basename into stem and extension; `.nii.gz`-style double extensions stay together
fn split_extension(basename: &str) -> (&str, Option<&str>) {
    match basename.find('.') {
        Some(0) | None => (basename, None),
        Some(pos) => (&basename[..pos], Some(&basename[pos..])),
    }
}

/// Parse entities from a filename, ignoring tokens that are not entities
pub fn parse_entities(path: impl AsRef<Path>) -> BidsEntities {
    parse_name(path.as_ref()).0
}

fn parse_name(path: &Path) -> (BidsEntities, Option<String>, Option<String>) {
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, extension) = split_extension(&basename);

    let mut entities = BidsEntities::default();
    let mut suffix = None;
    for token in stem.split('_') {
        match token.split_once('-') {
            Some((key, value)) => {
                if let Some(slot) = entities.slot(key) {
                    *slot = Some(value.to_string());
                }
            }
            None if !token.is_empty() => suffix = Some(token.to_string()),
            None => {}
        }
    }
    (entities, suffix, extension.map(str::to_string))
}

/// A file located by its BIDS entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidsPath {
    /// Dataset root, when known
    pub root: Option<PathBuf>,
    pub entities: BidsEntities,
    /// Datatype directory (`ieeg`, `eeg`, ...)
    pub datatype: Option<String>,
    /// Filename suffix (`ieeg`, `channels`, ...)
    pub suffix: Option<String>,
    /// Extension including the leading dot
    pub extension: Option<String>,
    original: PathBuf,
}

impl BidsPath {
    /// Build a BIDS path from a filename; the subject entity is mandatory
    pub fn from_fname(path: impl AsRef<Path>) -> PteResult<Self> {
        let path = path.as_ref();
        let (entities, suffix, extension) = parse_name(path);
        if entities.subject.is_none() {
            return Err(PteError::InvalidBidsName {
                path: path.display().to_string(),
                reason: "filename has no `sub-` entity".to_string(),
            });
        }

        let datatype = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| BIDS_DATATYPES.contains(&n.as_str()));

        Ok(BidsPath {
            root: None,
            entities,
            datatype,
            suffix,
            extension,
            original: path.to_path_buf(),
        })
    }

    /// Set the dataset root
    pub fn update_root(&mut self, root: impl AsRef<Path>) {
        self.root = Some(root.as_ref().to_path_buf());
    }

    /// Subject label
    pub fn subject(&self) -> Option<&str> {
        self.entities.subject.as_deref()
    }

    /// Filename rebuilt from entities, suffix and extension
    pub fn basename(&self) -> String {
        let mut name = self.entities.to_prefix();
        if let Some(suffix) = &self.suffix {
            name.push('_');
            name.push_str(suffix);
        }
        if let Some(ext) = &self.extension {
            name.push_str(ext);
        }
        name
    }

    /// Full path: `root/sub-X[/ses-Y][/datatype]/basename`, or the source path without a root
    pub fn fpath(&self) -> PathBuf {
        let Some(root) = &self.root else {
            return self.original.clone();
        };
        let mut path = root.clone();
        if let Some(subject) = &self.entities.subject {
            path.push(format!("sub-{}", subject));
        }
        if let Some(session) = &self.entities.session {
            path.push(format!("ses-{}", session));
        }
        if let Some(datatype) = &self.datatype {
            path.push(datatype);
        }
        path.push(self.basename());
        path
    }

    /// Path the entity set was parsed from
    pub fn source_path(&self) -> &Path {
        &self.original
    }
}
