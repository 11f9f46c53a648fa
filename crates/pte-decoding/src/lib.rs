//! PTE-Decoding: movement decoding from electrophysiology features
//!
//! Trials are read from a label channel, rest and target epochs are cut from
//! the feature time series, and linear decoders are cross-validated per
//! channel with groups kept intact. Results, time-locked predictions and
//! features are written per feature file and can be aggregated afterwards.

pub mod channels;
pub mod config;
pub mod cross_validation;
pub mod decoder;
pub mod epochs;
pub mod events;
pub mod features;
pub mod load;
pub mod metrics;
pub mod reader;
pub mod runner;
pub mod table;

pub use channels::{ch_picks, init_channel_names, init_result_keys, side_from_path, ChannelSelection};
pub use config::{DecodingConfig, FeatureImportance, RunnerConfig};
pub use cross_validation::{CrossValidation, CrossValidator, Fold, GroupKFold, GroupShuffleSplit, LeaveOneGroupOut};
pub use decoder::{
    get_decoder, Balancing, Decoder, LdaDecoder, LinearDecoder, LinearEstimator, LinearModel, LogisticDecoder,
    PredictionMode, DEFAULT_SEED,
};
pub use epochs::{baseline_period, get_feat_array, get_feat_array_prediction, EpochParams, EpochedData, TargetBoundary};
pub use events::events_from_label;
pub use features::{get_feature_table, get_target_table};
pub use load::{
    load_predictions_subject, load_predictions_timelocked, load_results, write_average_csv, write_raw_csv,
    AverageResult, BaselineCorrection, FilesOrDir, PredictionRecord, RawResult, SubjectAggregation,
};
pub use metrics::{accuracy, balanced_accuracy, permutation_importance, Scoring};
pub use reader::{read_bad_events, FeatureReader, FeatureSettings};
pub use runner::{
    generate_outpath, run_batch, run_prediction, with_suffix, BatchOutcome, BatchStatus, DecodingData,
    DecodingOutput, NamedSeries, PredictionRequest, ResultRow, Runner, Timelocked,
};
pub use table::FeatureTable;
