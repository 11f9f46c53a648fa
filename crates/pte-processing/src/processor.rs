//! Processing stage trait shared by filters and corrections

use pte_core::{PteResult, Recording};
use serde::{Deserialize, Serialize};

/// One step applied to a whole recording
pub trait SignalProcessor: Send + Sync {
    fn process(&mut self, input: &Recording) -> PteResult<Recording>;

    /// Display name used in stage reports
    fn name(&self) -> &str;

    /// Clears filter state carried between calls
    fn reset(&mut self) {}

    /// Recordings without channels or with a non-positive rate are skipped
    fn accepts(&self, recording: &Recording) -> bool {
        recording.n_channels() > 0 && recording.sfreq > 0.0
    }

    fn stage_kind(&self) -> StageKind {
        StageKind::Filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Frequency-domain filters (lowpass, notch, ...)
    Filter,
    /// Resampling (decimation)
    Resampler,
    /// Per-channel corrections (detrending, normalisation)
    Correction,
}
