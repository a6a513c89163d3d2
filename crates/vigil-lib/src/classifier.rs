use crate::{
    distance::{normalize, ChannelComparison, NormalizeError, Normalization},
    io::sigtypes::ChannelTypes,
    labels::{arrhythmia_type, is_true_alarm, Arrhythmia},
    signal::Recording,
};
use anyhow::Context;
use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("no training data for type {0}")]
    NoTrainingData(Arrhythmia),
    #[error("cannot determine arrhythmia type: {0}")]
    UnknownType(String),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Labeled training recording.
#[derive(Debug, Clone, Copy)]
pub struct TrainingSample<'a> {
    pub id: &'a str,
    pub recording: &'a Recording,
    pub is_true_alarm: bool,
}

/// Training recordings grouped by arrhythmia type, in sample id order.
#[derive(Debug, Clone, Default)]
pub struct TrainingIndex<'a> {
    by_type: BTreeMap<Arrhythmia, Vec<TrainingSample<'a>>>,
}

impl<'a> TrainingIndex<'a> {
    /// Index the training set for the requested types. Every requested type gets
    /// an entry, even when no training recording carries it.
    pub fn build(
        training: &'a BTreeMap<String, Recording>,
        arrhythmias: &[Arrhythmia],
    ) -> anyhow::Result<Self> {
        let mut by_type: BTreeMap<Arrhythmia, Vec<TrainingSample<'a>>> = arrhythmias
            .iter()
            .map(|&a| (a, Vec::new()))
            .collect();
        for (id, recording) in training {
            let kind = match arrhythmia_type(&recording.meta) {
                Ok(kind) => kind,
                Err(err) => {
                    warn!("training sample {} left out: {}", id, err);
                    continue;
                }
            };
            let Some(samples) = by_type.get_mut(&kind) else {
                continue;
            };
            let is_true_alarm = is_true_alarm(&recording.meta)
                .with_context(|| format!("labeling training sample {}", id))?;
            samples.push(TrainingSample {
                id,
                recording,
                is_true_alarm,
            });
        }
        Ok(Self { by_type })
    }

    pub fn samples(&self, arrhythmia: Arrhythmia) -> Option<&[TrainingSample<'a>]> {
        self.by_type.get(&arrhythmia).map(Vec::as_slice)
    }

    pub fn types(&self) -> impl Iterator<Item = Arrhythmia> + '_ {
        self.by_type.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a nearest-neighbour search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub is_true_alarm: bool,
    pub distance: f64,
    pub matched: Option<String>,
}

impl Prediction {
    fn no_match() -> Self {
        Self {
            is_true_alarm: false,
            distance: f64::INFINITY,
            matched: None,
        }
    }
}

/// 1-nearest-neighbour classifier over DTW distances.
#[derive(Debug, Clone)]
pub struct NearestNeighbor {
    pub comparison: ChannelComparison,
    pub normalization: Normalization,
    pub channel_types: ChannelTypes,
}

impl NearestNeighbor {
    /// Normalized distance between two recordings.
    pub fn distance(&self, query: &Recording, candidate: &Recording) -> Result<f64, NormalizeError> {
        let per_channel = self.comparison.distances(query, candidate);
        normalize(&per_channel, self.normalization, &self.channel_types)
    }

    /// Closest training recording of the query's arrhythmia type.
    ///
    /// Candidates are scored in parallel and reduced in index order; the first
    /// minimum wins ties.
    pub fn predict(&self, query: &Recording, index: &TrainingIndex<'_>) -> Result<Prediction, ClassifyError> {
        let kind = arrhythmia_type(&query.meta)
            .map_err(|err| ClassifyError::UnknownType(err.to_string()))?;
        let candidates = index
            .samples(kind)
            .ok_or(ClassifyError::NoTrainingData(kind))?;

        let distances = candidates
            .par_iter()
            .map(|sample| self.distance(query, sample.recording))
            .collect::<Result<Vec<f64>, NormalizeError>>()?;

        let mut best = Prediction::no_match();
        for (sample, distance) in candidates.iter().zip(distances) {
            if distance < best.distance {
                best = Prediction {
                    is_true_alarm: sample.is_true_alarm,
                    distance,
                    matched: Some(sample.id.to_string()),
                };
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        distance::Alignment,
        signal::{AnalysisWindow, RecordMeta},
    };
    use approx::assert_relative_eq;

    fn recording(name: &str, label: &str, data: Vec<f64>) -> Recording {
        let meta = RecordMeta {
            name: name.into(),
            fs: 1.0,
            channels: vec!["II".into()],
            comments: vec![label.into()],
        };
        Recording::new(meta, vec![data]).unwrap()
    }

    fn classifier() -> NearestNeighbor {
        NearestNeighbor {
            comparison: ChannelComparison {
                window: AnalysisWindow {
                    alarm_time_s: 5.0,
                    duration_s: 5.0,
                },
                max_channels: 1,
                alignment: Alignment::Exact,
            },
            normalization: Normalization::EcgAverage,
            channel_types: ChannelTypes::default(),
        }
    }

    fn training() -> BTreeMap<String, Recording> {
        [
            recording("a001", "True alarm", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            recording("a002", "False alarm", vec![0.0, 0.0, 0.0, 0.0, 0.0]),
            recording("b001", "False alarm", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            recording("v001", "True alarm", vec![9.0, 9.0, 9.0, 9.0, 9.0]),
        ]
        .into_iter()
        .map(|r| (r.name().to_string(), r))
        .collect()
    }

    #[test]
    fn index_groups_requested_types() {
        let training = training();
        let index = TrainingIndex::build(&training, &[Arrhythmia::Asystole, Arrhythmia::ExtremeTachycardia]).unwrap();
        assert_eq!(index.samples(Arrhythmia::Asystole).unwrap().len(), 2);
        assert!(index.samples(Arrhythmia::ExtremeTachycardia).unwrap().is_empty());
        assert!(index.samples(Arrhythmia::ExtremeBradycardia).is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn index_requires_training_labels() {
        let mut training = training();
        training.insert(
            "a003".into(),
            recording("a003", "Asystole", vec![1.0]),
        );
        assert!(TrainingIndex::build(&training, &[Arrhythmia::Asystole]).is_err());
    }

    #[test]
    fn identical_recording_is_its_own_nearest_neighbour() {
        let training = training();
        let index = TrainingIndex::build(&training, &Arrhythmia::ALL).unwrap();
        let query = recording("a100", "True alarm", vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let prediction = classifier().predict(&query, &index).unwrap();
        assert!(prediction.is_true_alarm);
        assert_relative_eq!(prediction.distance, 0.0);
        assert_eq!(prediction.matched.as_deref(), Some("a001"));
    }

    #[test]
    fn search_is_restricted_to_the_query_type() {
        let training = training();
        let index = TrainingIndex::build(&training, &Arrhythmia::ALL).unwrap();
        let query = recording("b100", "True alarm", vec![0.0, 0.0, 0.0, 0.0, 0.0]);
        let prediction = classifier().predict(&query, &index).unwrap();
        assert_eq!(prediction.matched.as_deref(), Some("b001"));
        assert!(!prediction.is_true_alarm);
    }

    #[test]
    fn first_minimum_wins_ties() {
        let training: BTreeMap<String, Recording> = [
            recording("t001", "False alarm", vec![1.0, 1.0]),
            recording("t002", "True alarm", vec![1.0, 1.0]),
        ]
        .into_iter()
        .map(|r| (r.name().to_string(), r))
        .collect();
        let index = TrainingIndex::build(&training, &[Arrhythmia::ExtremeTachycardia]).unwrap();
        let query = recording("t100", "True alarm", vec![2.0, 2.0]);
        let prediction = classifier().predict(&query, &index).unwrap();
        assert_eq!(prediction.matched.as_deref(), Some("t001"));
        assert!(!prediction.is_true_alarm);
    }

    #[test]
    fn missing_type_is_an_error() {
        let training = training();
        let index = TrainingIndex::build(&training, &[Arrhythmia::Asystole]).unwrap();
        let query = recording("f100", "True alarm", vec![1.0]);
        assert_eq!(
            classifier().predict(&query, &index),
            Err(ClassifyError::NoTrainingData(Arrhythmia::VentricularFlutterFibrillation))
        );
        assert_eq!(
            ClassifyError::NoTrainingData(Arrhythmia::VentricularFlutterFibrillation).to_string(),
            "no training data for type f"
        );
    }

    #[test]
    fn empty_type_yields_no_match() {
        let training = training();
        let index = TrainingIndex::build(&training, &[Arrhythmia::ExtremeTachycardia]).unwrap();
        let query = recording("t100", "True alarm", vec![1.0]);
        let prediction = classifier().predict(&query, &index).unwrap();
        assert_eq!(prediction.distance, f64::INFINITY);
        assert!(prediction.matched.is_none());
        assert!(!prediction.is_true_alarm);
    }
}
