//! Trial events derived from a label channel

/// Indices where the label changes, as alternating onset/offset pairs
///
/// Sample differences are truncated toward zero, so steps smaller than one
/// unit of a graded label are not events. A label that is already active at
/// the first sample yields an onset at 0, one still active at the last sample
/// yields an offset at the last index.
pub fn events_from_label(label: &[f64]) -> Vec<usize> {
    let n = label.len();
    if n == 0 {
        return Vec::new();
    }
    let mut diff = vec![0.0; n];
    for i in 1..n {
        diff[i] = (label[i] - label[i - 1]).trunc();
    }
    if label[0] != 0.0 {
        diff[0] = 1.0;
    }
    if label[n - 1] != 0.0 {
        diff[n - 1] = -1.0;
    }
    let events: Vec<usize> = diff
        .iter()
        .enumerate()
        .filter(|(_, d)| **d != 0.0)
        .map(|(i, _)| i)
        .collect();
    tracing::debug!(trials = events.len() as f64 / 2.0, "Number of events detected");
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_from_label() {
        assert_eq!(events_from_label(&[0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0]), vec![1, 3, 5, 7]);
    }

    #[test]
    fn test_forced_edges() {
        assert_eq!(events_from_label(&[1.0, 1.0, 0.0, 0.0, 1.0, 1.0]), vec![0, 2, 4, 5]);
        assert_eq!(events_from_label(&[0.0, 0.0, 0.0]), Vec::<usize>::new());
        assert!(events_from_label(&[]).is_empty());
    }

    #[test]
    fn test_graded_label_steps() {
        // half steps truncate to zero; the last index is forced only for a non-zero end
        assert_eq!(events_from_label(&[0.0, 0.5, 1.0, 0.0]), vec![3]);
        assert_eq!(events_from_label(&[0.0, 0.5, 1.5, 1.5, 0.2, 0.0]), vec![2, 4]);
        assert_eq!(events_from_label(&[0.0, -1.0, 0.0]), vec![1, 2]);
    }
}
