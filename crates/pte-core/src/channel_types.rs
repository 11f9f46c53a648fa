//! Channel classification and recording-condition keywords

use crate::error::{PteError, PteResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Electrophysiological channel classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Electrocorticography strip/grid contact
    Ecog,
    /// Local field potential from a DBS lead
    Lfp,
    /// Scalp EEG
    Eeg,
    /// Anything else (EMG, accelerometer, rotameter, ...)
    Other,
}

impl ChannelType {
    /// Infer the channel type from a channel name
    pub fn from_name(name: &str) -> Self {
        let upper = name.to_uppercase();
        if upper.contains("ECOG") {
            ChannelType::Ecog
        } else if upper.contains("LFP") {
            ChannelType::Lfp
        } else if upper.contains("EEG") {
            ChannelType::Eeg
        } else {
            ChannelType::Other
        }
    }

    /// Decoding group of a channel: ECOG if the name says so, LFP otherwise
    pub fn decoding_group(name: &str) -> &'static str {
        if name.contains("ECOG") {
            "ECOG"
        } else {
            "LFP"
        }
    }

    /// Result grouping used when loading results: LFP if the name says so, ECOG otherwise
    pub fn result_group(name: &str) -> &'static str {
        if name.contains("LFP") {
            "LFP"
        } else {
            "ECOG"
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Ecog => write!(f, "ECOG"),
            ChannelType::Lfp => write!(f, "LFP"),
            ChannelType::Eeg => write!(f, "EEG"),
            ChannelType::Other => write!(f, "OTHER"),
        }
    }
}

/// Dopaminergic medication state during a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Medication {
    On,
    Off,
}

/// Stimulation state during a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stimulation {
    On,
    Off,
}

/// Parse an abbreviated keyword: it must be a substring of the "on" or "off" token
fn parse_on_off(keyword: &str, on: &str, off: &str) -> Option<bool> {
    let keyword = keyword.to_lowercase();
    if on.contains(&keyword) {
        Some(true)
    } else if off.contains(&keyword) {
        Some(false)
    } else {
        None
    }
}

impl Medication {
    /// Parse a user keyword such as "on", "medoff", "OFF"
    pub fn parse_keyword(keyword: &str) -> PteResult<Self> {
        match parse_on_off(keyword, "medon", "medoff") {
            Some(true) => Ok(Medication::On),
            Some(false) => Ok(Medication::Off),
            None => Err(PteError::InvalidKeyword {
                kind: "medication",
                value: keyword.to_string(),
            }),
        }
    }

    /// Token used in filenames
    pub fn file_token(&self) -> &'static str {
        match self {
            Medication::On => "MedOn",
            Medication::Off => "MedOff",
        }
    }

    /// Infer from a filename: Off when `MedOff` appears, On otherwise
    pub fn from_filename(name: &str) -> Self {
        if name.contains("MedOff") {
            Medication::Off
        } else {
            Medication::On
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Medication::On => "ON",
            Medication::Off => "OFF",
        }
    }
}

impl Stimulation {
    /// Parse a user keyword such as "on", "stimoff", "OFF"
    pub fn parse_keyword(keyword: &str) -> PteResult<Self> {
        match parse_on_off(keyword, "stimon", "stimoff") {
            Some(true) => Ok(Stimulation::On),
            Some(false) => Ok(Stimulation::Off),
            None => Err(PteError::InvalidKeyword {
                kind: "stimulation",
                value: keyword.to_string(),
            }),
        }
    }

    /// Token used in filenames
    pub fn file_token(&self) -> &'static str {
        match self {
            Stimulation::On => "StimOn",
            Stimulation::Off => "StimOff",
        }
    }

    /// Infer from a filename: Off when `StimOff` appears, On otherwise
    pub fn from_filename(name: &str) -> Self {
        if name.contains("StimOff") {
            Stimulation::Off
        } else {
            Stimulation::On
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stimulation::On => "ON",
            Stimulation::Off => "OFF",
        }
    }
}

/// Side of the recording relative to the ECOG strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HemisphereSide {
    Ipsilateral,
    Contralateral,
}

impl HemisphereSide {
    /// Parse an abbreviated keyword ("ipsi", "contra", ...)
    pub fn parse_keyword(keyword: &str) -> PteResult<Self> {
        let lower = keyword.to_lowercase();
        let ipsi = "ipsilateral".contains(&lower);
        let contra = "contralateral".contains(&lower);
        match (ipsi, contra) {
            (true, false) => Ok(HemisphereSide::Ipsilateral),
            (false, true) => Ok(HemisphereSide::Contralateral),
            _ => Err(PteError::InvalidKeyword {
                kind: "hemisphere",
                value: keyword.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_inference() {
        assert_eq!(ChannelType::from_name("ECOG_R_1_SMC_AT"), ChannelType::Ecog);
        assert_eq!(ChannelType::from_name("LFP_L_2_STN_MT"), ChannelType::Lfp);
        assert_eq!(ChannelType::from_name("eeg_cz"), ChannelType::Eeg);
        assert_eq!(ChannelType::from_name("ANALOG_R_ROTA_CH"), ChannelType::Other);

        assert_eq!(ChannelType::decoding_group("LFP_R_1"), "LFP");
        assert_eq!(ChannelType::decoding_group("EMG_R"), "LFP");
        assert_eq!(ChannelType::result_group("EMG_R"), "ECOG");
    }

    #[test]
    fn test_condition_keywords() {
        assert_eq!(Medication::parse_keyword("OFF").unwrap(), Medication::Off);
        assert_eq!(Medication::parse_keyword("medon").unwrap(), Medication::On);
        // "med" is a prefix of both tokens; on is tested first
        assert_eq!(Medication::parse_keyword("med").unwrap(), Medication::On);
        assert!(Medication::parse_keyword("levodopa").is_err());

        assert_eq!(Stimulation::parse_keyword("StimOff").unwrap(), Stimulation::Off);
        assert!(Stimulation::parse_keyword("dbs").is_err());
    }

    #[test]
    fn test_condition_from_filename() {
        let name = "sub-003_ses-EphysMedOff01_task-SelfpacedRotationR_acq-StimOn_run-01_ieeg";
        assert_eq!(Medication::from_filename(name), Medication::Off);
        assert_eq!(Stimulation::from_filename(name), Stimulation::On);
        assert_eq!(Medication::Off.label(), "OFF");
    }

    #[test]
    fn test_hemisphere_keyword() {
        assert_eq!(HemisphereSide::parse_keyword("Ipsi").unwrap(), HemisphereSide::Ipsilateral);
        assert_eq!(HemisphereSide::parse_keyword("contra").unwrap(), HemisphereSide::Contralateral);
        assert!(HemisphereSide::parse_keyword("lateral").is_err());
        assert!(HemisphereSide::parse_keyword("left").is_err());
    }
}
