//! PTE-Core: Foundation types for electrophysiology utilities
//!
//! Recording container, channel/condition vocabulary, BIDS naming and the
//! shared error type.

pub mod bids;
pub mod channel_types;
pub mod error;
pub mod recording;

pub use bids::{parse_entities, BidsEntities, BidsPath};
pub use channel_types::*;
pub use error::{PteError, PteResult};
pub use recording::*;
