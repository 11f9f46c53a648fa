//! Epoching of feature time series around trial events
//!
//! Each trial contributes a rest window before its onset (label 0) and a
//! target window after it (label 1). Windows are sample ranges relative to
//! the onset event; ranges starting before the first sample are clipped.

use pte_core::{param_error, PteError, PteResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Rest window bounds relative to trial onset, in seconds
pub const REST_BEGIN: f64 = -5.0;
pub const REST_END: f64 = -2.0;

/// Start or end of the target window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BoundaryRepr", into = "BoundaryRepr")]
pub enum TargetBoundary {
    /// Seconds relative to trial onset
    Seconds(f64),
    /// The onset event itself
    TrialOnset,
    /// The offset event of the trial (end boundary only)
    TrialEnd,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BoundaryRepr {
    Seconds(f64),
    Keyword(String),
}

impl TryFrom<BoundaryRepr> for TargetBoundary {
    type Error = String;

    fn try_from(repr: BoundaryRepr) -> Result<Self, Self::Error> {
        match repr {
            BoundaryRepr::Seconds(s) => Ok(TargetBoundary::Seconds(s)),
            BoundaryRepr::Keyword(k) => match k.as_str() {
                "trial_onset" => Ok(TargetBoundary::TrialOnset),
                "trial_end" => Ok(TargetBoundary::TrialEnd),
                other => Err(format!(
                    "target boundary must be a number, `trial_onset` or `trial_end`, got `{}`",
                    other
                )),
            },
        }
    }
}

impl From<TargetBoundary> for BoundaryRepr {
    fn from(boundary: TargetBoundary) -> Self {
        match boundary {
            TargetBoundary::Seconds(s) => BoundaryRepr::Seconds(s),
            TargetBoundary::TrialOnset => BoundaryRepr::Keyword("trial_onset".to_string()),
            TargetBoundary::TrialEnd => BoundaryRepr::Keyword("trial_end".to_string()),
        }
    }
}

impl TargetBoundary {
    /// Offset from trial onset in seconds; `None` for `TrialEnd`
    pub fn seconds(&self) -> Option<f64> {
        match self {
            TargetBoundary::Seconds(s) => Some(*s),
            TargetBoundary::TrialOnset => Some(0.0),
            TargetBoundary::TrialEnd => None,
        }
    }

    /// Token used in output directory names
    pub fn path_token(&self) -> String {
        match self {
            TargetBoundary::Seconds(s) if *s == 0.0 => "trial_begin".to_string(),
            TargetBoundary::Seconds(s) => format!("{:?}", s),
            TargetBoundary::TrialOnset => "trial_onset".to_string(),
            TargetBoundary::TrialEnd => "trial_end".to_string(),
        }
    }
}

impl fmt::Display for TargetBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetBoundary::Seconds(s) => write!(f, "{:?}", s),
            TargetBoundary::TrialOnset => write!(f, "0.0"),
            TargetBoundary::TrialEnd => write!(f, "trial_end"),
        }
    }
}

/// Timing parameters of the epoching, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochParams {
    pub sfreq: f64,
    pub target_begin: TargetBoundary,
    pub target_end: TargetBoundary,
    /// Minimum distance of the rest window to the trial onset
    pub dist_onset: f64,
    /// Minimum distance of the rest window to the previous trial's end
    pub dist_end: f64,
}

/// Samples for a duration in seconds, truncated toward zero
fn to_samples(seconds: f64, sfreq: f64) -> i64 {
    (seconds * sfreq).trunc() as i64
}

/// Clip a signed sample range to `[0, len)`
fn clip(start: i64, end: i64, len: usize) -> Range<usize> {
    let len = len as i64;
    let start = start.clamp(0, len);
    let end = end.clamp(0, len).max(start);
    start as usize..end as usize
}

/// Samples available before trial `ind` for a rest window
///
/// The usable stretch runs from `dist_end` after the previous offset to
/// `dist_onset` before this onset and is shortened to begin after the last
/// artifact inside it.
pub fn baseline_period(
    events: &[usize],
    ind: usize,
    dist_onset: i64,
    dist_end: i64,
    artifacts: Option<&[f64]>,
) -> i64 {
    let ind_onset = events[ind] as i64 - dist_onset;
    let ind_end = if ind != 0 { events[ind - 1] as i64 + dist_end } else { 0 };
    if ind_onset <= 0 {
        return 0;
    }
    let mut baseline = ind_onset - ind_end;
    if let Some(artifacts) = artifacts {
        let range = clip(ind_end, ind_onset, artifacts.len());
        let last_artifact = artifacts[range].iter().rposition(|v| *v != 0.0).unwrap_or(0);
        baseline -= last_artifact as i64;
    }
    baseline
}

/// Epoched feature rows with their labels and trial groups
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpochedData {
    pub data: Vec<Vec<f64>>,
    /// 0 for rest rows, 1 for target rows
    pub labels: Vec<u8>,
    /// Event index of the onset of every kept trial
    pub events_used: Vec<usize>,
    /// Trial number of every row
    pub groups: Vec<usize>,
    /// Event index of the onset of every discarded trial
    pub events_discarded: Vec<usize>,
}

impl EpochedData {
    pub fn n_rows(&self) -> usize {
        self.data.len()
    }
}

/// Build rest and target epochs for every trial
pub fn get_feat_array(
    data: &[Vec<f64>],
    events: &[usize],
    params: &EpochParams,
    artifacts: Option<&[f64]>,
    bad_epochs: &[usize],
) -> PteResult<EpochedData> {
    if events.len() % 2 != 0 {
        return Err(PteError::OddEventCount { events: events.len() });
    }
    if !(params.sfreq > 0.0) {
        return Err(param_error!("sfreq", "must be positive, got {}", params.sfreq));
    }
    let sfreq = params.sfreq;
    let target_begin = params
        .target_begin
        .seconds()
        .map(|s| to_samples(s, sfreq))
        .ok_or_else(|| param_error!("target_begin", "`trial_end` cannot begin the target window"))?;
    let target_end = params.target_end.seconds().map(|s| to_samples(s, sfreq));
    let dist_onset = to_samples(params.dist_onset, sfreq);
    let dist_end = to_samples(params.dist_end, sfreq);
    let rest_end = to_samples(REST_END, sfreq);

    let mut epoched = EpochedData::default();
    for (i, ind) in (0..events.len()).step_by(2).enumerate() {
        let onset = events[ind] as i64;
        let baseline = baseline_period(events, ind, dist_onset, dist_end, artifacts);
        let rest_begin = ((rest_end - baseline) as f64).max(REST_BEGIN * sfreq).trunc() as i64;

        let rest = clip(onset + rest_begin, onset + rest_end, data.len());
        let target_stop = match target_end {
            Some(end) => onset + end,
            None => events[ind + 1] as i64,
        };
        let target = clip(onset + target_begin, target_stop, data.len());

        let has_artifact = artifacts
            .map(|a| a[clip(onset + target_begin, target_stop, a.len())].iter().any(|v| *v != 0.0))
            .unwrap_or(false);

        if baseline <= 0 || has_artifact || bad_epochs.contains(&i) {
            tracing::debug!(trial = i, baseline, has_artifact, "Discarding trial");
            epoched.events_discarded.push(ind);
            continue;
        }

        let n_rest = rest.len();
        let n_target = target.len();
        epoched.data.extend(data[rest].iter().cloned());
        epoched.data.extend(data[target].iter().cloned());
        epoched.labels.extend(std::iter::repeat(0).take(n_rest));
        epoched.labels.extend(std::iter::repeat(1).take(n_target));
        epoched.groups.extend(std::iter::repeat(i).take(n_rest + n_target));
        epoched.events_used.push(ind);
    }

    tracing::info!(
        used = epoched.events_used.len(),
        discarded = epoched.events_discarded.len(),
        "No. of trials used"
    );
    if epoched.events_used.is_empty() || epoched.data.is_empty() {
        return Err(PteError::NoTrials {
            reason: format!("all {} trials were discarded", events.len() / 2),
        });
    }
    Ok(epoched)
}

/// Fixed-length epochs `[onset + begin, onset + end]` (inclusive) around the given events
///
/// Epochs that do not fit entirely inside `data` are skipped.
pub fn get_feat_array_prediction<T: Clone>(
    data: &[T],
    events: &[usize],
    events_used: &[usize],
    sfreq: f64,
    begin: f64,
    end: f64,
) -> Vec<Vec<T>> {
    let begin = to_samples(begin, sfreq);
    let end = to_samples(end, sfreq);
    if end < begin {
        return Vec::new();
    }
    let expected = (end - begin + 1) as usize;

    events_used
        .iter()
        .filter_map(|&ind| {
            let onset = *events.get(ind)? as i64;
            let range = clip(onset + begin, onset + end + 1, data.len());
            if range.len() == expected {
                Some(data[range].to_vec())
            } else {
                tracing::debug!(
                    got = range.len(),
                    expected,
                    epoch = ind + 1,
                    events = events.len(),
                    "Mismatch of epoch samples, discarding epoch"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64]).collect()
    }

    fn params(target_end: TargetBoundary) -> EpochParams {
        EpochParams {
            sfreq: 1.0,
            target_begin: TargetBoundary::TrialOnset,
            target_end,
            dist_onset: 1.0,
            dist_end: 1.0,
        }
    }

    #[test]
    fn test_boundary_serde() {
        let b: TargetBoundary = serde_json::from_str("\"trial_onset\"").unwrap();
        assert_eq!(b, TargetBoundary::TrialOnset);
        let b: TargetBoundary = serde_json::from_str("-1.5").unwrap();
        assert_eq!(b, TargetBoundary::Seconds(-1.5));
        assert!(serde_json::from_str::<TargetBoundary>("\"later\"").is_err());
        assert_eq!(serde_json::to_string(&TargetBoundary::TrialEnd).unwrap(), "\"trial_end\"");
    }

    #[test]
    fn test_path_token() {
        assert_eq!(TargetBoundary::Seconds(0.0).path_token(), "trial_begin");
        assert_eq!(TargetBoundary::Seconds(1.0).path_token(), "1.0");
        assert_eq!(TargetBoundary::Seconds(-0.5).path_token(), "-0.5");
        assert_eq!(TargetBoundary::TrialOnset.path_token(), "trial_onset");
        assert_eq!(TargetBoundary::TrialEnd.path_token(), "trial_end");
    }

    #[test]
    fn test_baseline_period() {
        let events = [10, 15, 30, 35];
        assert_eq!(baseline_period(&events, 0, 2, 2, None), 8);
        // previous offset at 15 plus 2, onset at 30 minus 2
        assert_eq!(baseline_period(&events, 2, 2, 2, None), 11);
        assert_eq!(baseline_period(&[1, 4], 0, 2, 2, None), 0);

        let mut artifacts = vec![0.0; 40];
        artifacts[20] = 1.0;
        // artifact at relative index 3 of the window [17, 28)
        assert_eq!(baseline_period(&events, 2, 2, 2, Some(&artifacts)), 8);
    }

    #[test]
    fn test_feat_array_windows() {
        let data = rows(40);
        let events = [10, 15, 30, 35];
        let epoched = get_feat_array(&data, &events, &params(TargetBoundary::TrialEnd), None, &[]).unwrap();

        // trial 0: rest [10 - 5, 10 - 2), target [10, 15)
        // trial 1: rest [30 - 5, 30 - 2), target [30, 35)
        let values: Vec<f64> = epoched.data.iter().map(|r| r[0]).collect();
        assert_eq!(
            values,
            vec![5.0, 6.0, 7.0, 10.0, 11.0, 12.0, 13.0, 14.0, 25.0, 26.0, 27.0, 30.0, 31.0, 32.0, 33.0, 34.0]
        );
        assert_eq!(&epoched.labels[..8], &[0, 0, 0, 1, 1, 1, 1, 1]);
        assert_eq!(&epoched.groups[..8], &[0; 8]);
        assert_eq!(epoched.groups[8], 1);
        assert_eq!(epoched.events_used, vec![0, 2]);
        assert!(epoched.events_discarded.is_empty());
    }

    #[test]
    fn test_feat_array_fixed_end_and_short_baseline() {
        let data = rows(40);
        let events = [10, 15, 20, 25];
        let mut p = params(TargetBoundary::Seconds(2.0));
        p.dist_end = 2.0;
        let epoched = get_feat_array(&data, &events, &p, None, &[]).unwrap();

        // trial 1 has a baseline of (20 - 1) - (15 + 2) = 2 samples: rest [20 - 4, 20 - 2)
        let values: Vec<f64> = epoched.data.iter().map(|r| r[0]).collect();
        assert_eq!(values, vec![5.0, 6.0, 7.0, 10.0, 11.0, 16.0, 17.0, 20.0, 21.0]);
    }

    #[test]
    fn test_feat_array_discards() {
        let data = rows(60);
        let events = [10, 15, 30, 35, 50, 55];
        let mut artifacts = vec![0.0; 60];
        artifacts[32] = 1.0;
        let epoched =
            get_feat_array(&data, &events, &params(TargetBoundary::TrialEnd), Some(&artifacts), &[2]).unwrap();
        assert_eq!(epoched.events_used, vec![0]);
        assert_eq!(epoched.events_discarded, vec![2, 4]);
        assert!(epoched.groups.iter().all(|g| *g == 0));

        let err = get_feat_array(&data, &events, &params(TargetBoundary::TrialEnd), None, &[0, 1, 2]).unwrap_err();
        assert!(matches!(err, PteError::NoTrials { .. }));

        let err = get_feat_array(&data, &[1, 2, 3], &params(TargetBoundary::TrialEnd), None, &[]).unwrap_err();
        assert!(matches!(err, PteError::OddEventCount { events: 3 }));
    }

    #[test]
    fn test_feat_array_prediction() {
        let data: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let events = [2, 4, 10, 12, 18, 19];
        let epochs = get_feat_array_prediction(&data, &events, &[0, 2, 4], 1.0, -3.0, 2.0);
        // onset 2 starts before the data, onset 18 ends after it
        assert_eq!(epochs, vec![vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]]);

        let rows = rows(20);
        let epochs = get_feat_array_prediction(&rows, &events, &[2], 1.0, 0.0, 1.0);
        assert_eq!(epochs, vec![vec![vec![10.0], vec![11.0]]]);
    }
}
