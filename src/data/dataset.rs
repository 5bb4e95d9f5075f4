//! Training dataset preparation
//!
//! Turns an episode export into a feature matrix and blended labels, then
//! splits it into train and test partitions.

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::episode::EpisodeExport;
use crate::features::{EpisodeFeatures, LabelBlend};
use crate::{PescaError, Result};

/// Counts of what happened to each exported episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreparationSummary {
    pub total: usize,
    pub used: usize,
    pub skipped_missing_label: usize,
    pub skipped_missing_context: usize,
}

/// Feature rows and labels ready for training
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub feature_names: Vec<String>,
    pub summary: PreparationSummary,
}

impl PreparedDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Extract features and labels from every usable episode
///
/// The minimum sample check applies to the raw export, before any episode is
/// skipped. An export whose episodes are all skipped is an error.
pub fn prepare_dataset(
    export: &EpisodeExport,
    min_samples: usize,
    blend: &LabelBlend,
) -> Result<PreparedDataset> {
    let total = export.len();
    if total < min_samples {
        return Err(PescaError::InsufficientData {
            found: total,
            required: min_samples,
        });
    }

    let mut summary = PreparationSummary {
        total,
        ..Default::default()
    };
    let mut features = Vec::with_capacity(total);
    let mut labels = Vec::with_capacity(total);

    for (index, episode) in export.episodes.iter().enumerate() {
        let (Some(score), Some(feedback)) = (episode.pesca_score_final, episode.user_feedback)
        else {
            summary.skipped_missing_label += 1;
            continue;
        };
        if !episode.has_context() {
            log::debug!("Skipping episode {}: no location or timestamp", index);
            summary.skipped_missing_context += 1;
            continue;
        }

        let row = EpisodeFeatures::from_episode(episode, index)?;
        features.push(row.to_vec());
        labels.push(blend.target(score, feedback));
    }
    summary.used = labels.len();

    if labels.is_empty() {
        return Err(PescaError::NoUsableEpisodes { total });
    }

    log::info!(
        "Prepared {} of {} episodes ({} without label, {} without location/time)",
        summary.used,
        summary.total,
        summary.skipped_missing_label,
        summary.skipped_missing_context
    );

    Ok(PreparedDataset {
        features,
        labels,
        feature_names: EpisodeFeatures::names(),
        summary,
    })
}

/// Count usable and skipped episodes without extracting features
pub fn summarize_export(export: &EpisodeExport) -> PreparationSummary {
    let mut summary = PreparationSummary {
        total: export.len(),
        ..Default::default()
    };
    for episode in &export.episodes {
        if !episode.has_label() {
            summary.skipped_missing_label += 1;
        } else if !episode.has_context() {
            summary.skipped_missing_context += 1;
        } else {
            summary.used += 1;
        }
    }
    summary
}

/// Train and test partitions of a prepared dataset
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train_features: Vec<Vec<f64>>,
    pub train_labels: Vec<f64>,
    pub test_features: Vec<Vec<f64>>,
    pub test_labels: Vec<f64>,
}

/// Shuffle rows with a seeded RNG and hold out `test_fraction` of them
///
/// The test partition size is rounded up and both partitions keep at least
/// one row when there are two or more rows.
pub fn train_test_split(
    features: &[Vec<f64>],
    labels: &[f64],
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    let n = labels.len();
    if features.len() != n {
        return Err(PescaError::Fit(format!(
            "{} feature rows but {} labels",
            features.len(),
            n
        )));
    }
    if n < 2 {
        return Err(PescaError::InsufficientData {
            found: n,
            required: 2,
        });
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PescaError::Config(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);
    let pick_rows = |idx: &[usize]| idx.iter().map(|&i| features[i].clone()).collect::<Vec<_>>();
    let pick_labels = |idx: &[usize]| idx.iter().map(|&i| labels[i]).collect::<Vec<_>>();

    log::info!("Split {} samples: train={}, test={}", n, train_idx.len(), test_idx.len());

    Ok(TrainTestSplit {
        train_features: pick_rows(train_idx),
        train_labels: pick_labels(train_idx),
        test_features: pick_rows(test_idx),
        test_labels: pick_labels(test_idx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::episode::Episode;
    use crate::data::fixtures::{synthetic_episodes, synthetic_export};

    #[test]
    fn test_below_minimum_fails_before_training() {
        let export = synthetic_export(99);
        let err = prepare_dataset(&export, 100, &LabelBlend::default()).unwrap_err();
        assert!(matches!(
            err,
            PescaError::InsufficientData {
                found: 99,
                required: 100
            }
        ));
    }

    #[test]
    fn test_unlabelled_episodes_are_skipped() {
        let mut episodes = synthetic_episodes(10);
        episodes[0].user_feedback = None;
        episodes[3].pesca_score_final = None;
        episodes[7].created_at = None;
        let export = EpisodeExport {
            episodes,
            ..Default::default()
        };

        let dataset = prepare_dataset(&export, 5, &LabelBlend::default()).unwrap();
        assert_eq!(dataset.len(), 7);
        assert_eq!(dataset.summary.skipped_missing_label, 2);
        assert_eq!(dataset.summary.skipped_missing_context, 1);
        assert!(dataset.len() <= export.len());
    }

    #[test]
    fn test_summary_matches_preparation() {
        let mut episodes = synthetic_episodes(12);
        episodes[2].user_feedback = None;
        episodes[5].location_lon = None;
        let export = EpisodeExport {
            episodes,
            ..Default::default()
        };

        let summary = summarize_export(&export);
        let prepared = prepare_dataset(&export, 1, &LabelBlend::default()).unwrap();
        assert_eq!(summary, prepared.summary);
        assert_eq!(summary.used, 10);
    }

    #[test]
    fn test_all_skipped_fails_fast() {
        let episodes = vec![Episode::default(); 4];
        let export = EpisodeExport {
            episodes,
            ..Default::default()
        };
        let err = prepare_dataset(&export, 1, &LabelBlend::default()).unwrap_err();
        assert!(matches!(err, PescaError::NoUsableEpisodes { total: 4 }));
    }

    #[test]
    fn test_labels_follow_blend_formula() {
        let export = synthetic_export(30);
        let dataset = prepare_dataset(&export, 1, &LabelBlend::default()).unwrap();

        for (episode, label) in export.episodes.iter().zip(&dataset.labels) {
            let score = episode.pesca_score_final.unwrap();
            let feedback = episode.user_feedback.unwrap();
            assert_eq!(*label, 0.3 * score + 0.7 * (2.0 * feedback));
        }
    }

    #[test]
    fn test_feature_rows_have_fourteen_columns() {
        let dataset = prepare_dataset(&synthetic_export(120), 100, &LabelBlend::default()).unwrap();
        assert_eq!(dataset.len(), 120);
        assert_eq!(dataset.feature_names.len(), 14);
        assert!(dataset.features.iter().all(|r| r.len() == 14));
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let dataset = prepare_dataset(&synthetic_export(120), 100, &LabelBlend::default()).unwrap();
        let a = train_test_split(&dataset.features, &dataset.labels, 0.2, 42).unwrap();
        let b = train_test_split(&dataset.features, &dataset.labels, 0.2, 42).unwrap();

        assert_eq!(a.train_labels.len(), 96);
        assert_eq!(a.test_labels.len(), 24);
        assert_eq!(a.train_labels, b.train_labels);
        assert_eq!(a.test_features, b.test_features);
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let features: Vec<Vec<f64>> = (0..11).map(|i| vec![i as f64]).collect();
        let labels: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let split = train_test_split(&features, &labels, 0.2, 7).unwrap();
        assert_eq!(split.test_labels.len(), 3);
        assert_eq!(split.train_labels.len(), 8);

        let mut all: Vec<f64> = split.train_labels.iter().chain(&split.test_labels).copied().collect();
        all.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(all, labels);
    }

    #[test]
    fn test_split_rejects_mismatched_lengths() {
        let features = vec![vec![1.0], vec![2.0]];
        assert!(train_test_split(&features, &[1.0], 0.2, 42).is_err());
    }
}
