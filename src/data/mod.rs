//! Data ingestion
//!
//! Episode records, the SQLite episode store and training dataset preparation.

pub mod database;
pub mod dataset;
pub mod episode;

#[cfg(test)]
pub(crate) mod fixtures;

pub use database::EpisodeStore;
pub use dataset::{prepare_dataset, train_test_split, PreparedDataset, TrainTestSplit};
pub use episode::{Episode, EpisodeExport, WeatherObservation};
