//! Channel selection for decoding runs

use pte_core::PteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which channels (or channel groups) a decoder is trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelection {
    /// One model per channel
    #[default]
    Single,
    /// One model per channel type, using the best channel of an inner loop
    SingleBest,
    /// One model per channel type, using all its channels
    All,
    SingleContralat,
    SingleIpsilat,
    AllContralat,
    AllIpsilat,
}

impl ChannelSelection {
    pub const ALL: [ChannelSelection; 7] = [
        ChannelSelection::Single,
        ChannelSelection::SingleBest,
        ChannelSelection::All,
        ChannelSelection::SingleContralat,
        ChannelSelection::SingleIpsilat,
        ChannelSelection::AllContralat,
        ChannelSelection::AllIpsilat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelSelection::Single => "single",
            ChannelSelection::SingleBest => "single_best",
            ChannelSelection::All => "all",
            ChannelSelection::SingleContralat => "single_contralat",
            ChannelSelection::SingleIpsilat => "single_ipsilat",
            ChannelSelection::AllContralat => "all_contralat",
            ChannelSelection::AllIpsilat => "all_ipsilat",
        }
    }

    /// Whether results are keyed per channel rather than per channel type
    pub fn is_per_channel(&self) -> bool {
        matches!(
            self,
            ChannelSelection::Single | ChannelSelection::SingleContralat | ChannelSelection::SingleIpsilat
        )
    }
}

impl FromStr for ChannelSelection {
    type Err = PteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelSelection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| PteError::InvalidKeyword {
                kind: "use_channels",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ChannelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channels considered for a run
pub fn init_channel_names(ch_names: &[String], selection: ChannelSelection, side: &str) -> Vec<String> {
    match selection {
        ChannelSelection::Single | ChannelSelection::SingleBest | ChannelSelection::All => ch_names.to_vec(),
        ChannelSelection::SingleContralat | ChannelSelection::AllContralat => {
            ch_names.iter().filter(|ch| !ch.contains(side)).cloned().collect()
        }
        ChannelSelection::SingleIpsilat | ChannelSelection::AllIpsilat => {
            ch_names.iter().filter(|ch| ch.contains(side)).cloned().collect()
        }
    }
}

/// Keys under which predictions and features are collected
pub fn init_result_keys(ch_names: &[String], selection: ChannelSelection) -> Vec<String> {
    if selection.is_per_channel() {
        ch_names.to_vec()
    } else {
        vec!["ECOG".to_string(), "LFP".to_string()]
    }
}

/// Column substrings each model is trained on
///
/// `SingleBest` returns every channel as a candidate; the runner narrows
/// them down per fold.
pub fn ch_picks(selection: ChannelSelection, ch_names: &[String], side: &str) -> Vec<String> {
    let owned = |picks: &[&str]| -> Vec<String> { picks.iter().map(|p| p.to_string()).collect() };
    match selection {
        ChannelSelection::Single | ChannelSelection::SingleBest => ch_names.to_vec(),
        ChannelSelection::SingleContralat => ch_names.iter().filter(|ch| !ch.contains(side)).cloned().collect(),
        ChannelSelection::SingleIpsilat => ch_names.iter().filter(|ch| ch.contains(side)).cloned().collect(),
        ChannelSelection::All => owned(&["ECOG", "LFP"]),
        ChannelSelection::AllIpsilat if side == "L_" => owned(&["ECOG", "LFP_L"]),
        ChannelSelection::AllIpsilat => owned(&["ECOG", "LFP_R"]),
        ChannelSelection::AllContralat if side == "L_" => owned(&["ECOG", "LFP_R"]),
        ChannelSelection::AllContralat => owned(&["ECOG", "LFP_L"]),
    }
}

/// Hemisphere token of an output path, `"R_"` unless only `L_` occurs
pub fn side_from_path(out_file: &str) -> &'static str {
    if out_file.contains("R_") {
        "R_"
    } else if out_file.contains("L_") {
        "L_"
    } else {
        "R_"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        ["ECOG_R_1", "ECOG_R_2", "LFP_R_1", "LFP_L_1"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_selection_parse() {
        for selection in ChannelSelection::ALL {
            assert_eq!(selection.to_string().parse::<ChannelSelection>().unwrap(), selection);
        }
        assert!("both".parse::<ChannelSelection>().is_err());
        let parsed: ChannelSelection = serde_json::from_str("\"all_ipsilat\"").unwrap();
        assert_eq!(parsed, ChannelSelection::AllIpsilat);
    }

    #[test]
    fn test_init_channel_names() {
        assert_eq!(init_channel_names(&names(), ChannelSelection::All, "R_").len(), 4);
        assert_eq!(init_channel_names(&names(), ChannelSelection::SingleContralat, "R_"), vec!["LFP_L_1"]);
        assert_eq!(init_channel_names(&names(), ChannelSelection::AllIpsilat, "R_").len(), 3);
    }

    #[test]
    fn test_result_keys() {
        assert_eq!(init_result_keys(&names(), ChannelSelection::Single), names());
        assert_eq!(init_result_keys(&names(), ChannelSelection::SingleBest), vec!["ECOG", "LFP"]);
        assert_eq!(init_result_keys(&names(), ChannelSelection::AllContralat), vec!["ECOG", "LFP"]);
    }

    #[test]
    fn test_ch_picks() {
        assert_eq!(ch_picks(ChannelSelection::All, &names(), "R_"), vec!["ECOG", "LFP"]);
        assert_eq!(ch_picks(ChannelSelection::AllIpsilat, &names(), "L_"), vec!["ECOG", "LFP_L"]);
        assert_eq!(ch_picks(ChannelSelection::AllIpsilat, &names(), "R_"), vec!["ECOG", "LFP_R"]);
        assert_eq!(ch_picks(ChannelSelection::AllContralat, &names(), "R_"), vec!["ECOG", "LFP_L"]);
        assert_eq!(ch_picks(ChannelSelection::SingleIpsilat, &names(), "L_"), vec!["LFP_L_1"]);
    }

    #[test]
    fn test_side_from_path() {
        assert_eq!(side_from_path("out/sub-1_ECOG_L_1"), "L_");
        assert_eq!(side_from_path("out/R_L_mixed"), "R_");
        assert_eq!(side_from_path("out/none"), "R_");
    }
}
