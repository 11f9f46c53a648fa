//! PTE-Filetools: find and filter recording files
//!
//! Supports plain directory trees and BIDS datasets.

pub mod bids_finder;
pub mod default_finder;
pub mod finder;

pub use bids_finder::{BidsFinder, DEFAULT_BIDS_EXTENSIONS};
pub use default_finder::DefaultFinder;
pub use finder::{keyword_search, load_hemispheres, FileFilter, FileFinder, Hemispheres};

use pte_core::{PteError, PteResult};

/// Datatypes accepted by [`get_filefinder`]
pub const FINDER_DATATYPES: &[&str] = &["any", "bids"];

/// Create a finder for the given datatype (`"any"` or `"bids"`, case-insensitive)
pub fn get_filefinder(datatype: &str, hemispheres: Option<Hemispheres>) -> PteResult<Box<dyn FileFinder>> {
    let hemispheres = hemispheres.unwrap_or_default();
    match datatype.to_lowercase().as_str() {
        "any" => Ok(Box::new(DefaultFinder::new(hemispheres))),
        "bids" => Ok(Box::new(BidsFinder::new(hemispheres))),
        _ => Err(PteError::FinderNotFound {
            datatype: datatype.to_string(),
            allowed: FINDER_DATATYPES.to_vec(),
        }),
    }
}
