//! Selection of feature and target columns

use crate::table::FeatureTable;
use pte_core::{param_error, PteError, PteResult};

/// Columns matching any of `use_features`, plus `use_times - 1` lagged copies
///
/// The current sample is suffixed `_100_ms`, a copy shifted by `s` rows is
/// suffixed `_{(s + 1) * 100}_ms`. Missing values become 0.
pub fn get_feature_table(features: &FeatureTable, use_features: &[String], use_times: usize) -> PteResult<FeatureTable> {
    if use_times == 0 {
        return Err(param_error!("use_times", "must be at least 1"));
    }
    let picks: Vec<String> = features
        .columns()
        .iter()
        .filter(|col| use_features.iter().any(|pick| col.contains(pick.as_str())))
        .cloned()
        .collect();
    let used = features.select(&picks)?;

    let mut columns = Vec::with_capacity(picks.len() * use_times);
    for s in 0..use_times {
        columns.extend(picks.iter().map(|col| format!("{}_{}_ms", col, (s + 1) * 100)));
    }

    let rows = (0..used.n_rows())
        .map(|i| {
            let mut row = Vec::with_capacity(columns.len());
            for s in 0..use_times {
                match i.checked_sub(s).and_then(|j| used.row(j)) {
                    Some(source) => row.extend(source.iter().map(|v| if v.is_nan() { 0.0 } else { *v })),
                    None => row.extend(std::iter::repeat(0.0).take(picks.len())),
                }
            }
            row
        })
        .collect();

    tracing::debug!(features = picks.len(), use_times, "Built feature table");
    FeatureTable::new(columns, rows)
}

/// First column whose lower-cased name contains one of `targets`, tried in order
pub fn get_target_table(targets: &[String], features: &FeatureTable) -> PteResult<(String, Vec<f64>)> {
    for target in targets {
        let pick = target.to_lowercase();
        if let Some(column) = features.columns().iter().find(|c| c.to_lowercase().contains(&pick)) {
            tracing::debug!(channel = %column, "Channel used");
            return Ok((column.clone(), features.column(column)?));
        }
    }
    Err(PteError::MissingColumn {
        column: targets.join(", "),
        source: "feature table".to_string(),
    })
}
