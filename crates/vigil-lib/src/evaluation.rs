use crate::{
    classifier::{ClassifyError, NearestNeighbor, Prediction, TrainingIndex},
    labels::is_true_alarm,
    signal::Recording,
};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A missed true alarm costs this many false alarms.
pub const FALSE_NEGATIVE_WEIGHT: usize = 5;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("empty test set")]
    EmptyTestSet,
    #[error("classifying {sample}: {source}")]
    Classify {
        sample: String,
        #[source]
        source: ClassifyError,
    },
    #[error("labeling {sample}: {message}")]
    Label { sample: String, message: String },
}

/// Test sample ids partitioned by prediction against ground truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    #[serde(rename = "TP")]
    pub true_positive: Vec<String>,
    #[serde(rename = "FP")]
    pub false_positive: Vec<String>,
    #[serde(rename = "TN")]
    pub true_negative: Vec<String>,
    #[serde(rename = "FN")]
    pub false_negative: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    #[serde(rename = "TP")]
    pub tp: usize,
    #[serde(rename = "FP")]
    pub fp: usize,
    #[serde(rename = "TN")]
    pub tn: usize,
    #[serde(rename = "FN")]
    pub fn_: usize,
}

impl BucketCounts {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

impl ConfusionMatrix {
    pub fn record(&mut self, sample: impl Into<String>, predicted: bool, actual: bool) {
        let bucket = match (predicted, actual) {
            (true, true) => &mut self.true_positive,
            (true, false) => &mut self.false_positive,
            (false, true) => &mut self.false_negative,
            (false, false) => &mut self.true_negative,
        };
        bucket.push(sample.into());
    }

    pub fn counts(&self) -> BucketCounts {
        BucketCounts {
            tp: self.true_positive.len(),
            fp: self.false_positive.len(),
            tn: self.true_negative.len(),
            fn_: self.false_negative.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.counts().total()
    }

    /// `(TP + TN) / total`.
    pub fn accuracy(&self) -> Result<f64, EvalError> {
        let c = self.counts();
        ratio(c.tp + c.tn, c.total())
    }

    /// `(TP + TN) / (TP + TN + FP + 5·FN)`.
    pub fn score(&self) -> Result<f64, EvalError> {
        let c = self.counts();
        let correct = c.tp + c.tn;
        ratio(correct, correct + c.fp + FALSE_NEGATIVE_WEIGHT * c.fn_)
    }

    pub fn summary(&self) -> Result<Summary, EvalError> {
        Ok(Summary {
            counts: self.counts(),
            accuracy: self.accuracy()?,
            score: self.score()?,
        })
    }
}

fn ratio(numerator: usize, denominator: usize) -> Result<f64, EvalError> {
    if denominator == 0 {
        return Err(EvalError::EmptyTestSet);
    }
    Ok(numerator as f64 / denominator as f64)
}

/// Bucket sizes with the two headline metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub counts: BucketCounts,
    pub accuracy: f64,
    pub score: f64,
}

/// `[distance, matched training id, prediction == ground truth]`.
///
/// JSON has no infinity, so an unmatched distance is written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceEntry(
    #[serde(with = "infinite_as_null")] pub f64,
    pub String,
    pub bool,
);

impl DistanceEntry {
    pub fn distance(&self) -> f64 {
        self.0
    }

    pub fn matched(&self) -> &str {
        &self.1
    }

    pub fn correct(&self) -> bool {
        self.2
    }
}

pub type DistanceReport = BTreeMap<String, DistanceEntry>;

mod infinite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// Everything one evaluation run produces.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub matrix: ConfusionMatrix,
    pub distances: DistanceReport,
    /// Test samples whose arrhythmia type had no training entry.
    pub skipped: Vec<String>,
}

struct SampleResult {
    id: String,
    outcome: Result<(Prediction, bool), EvalError>,
}

/// Classify every test sample and tally the confusion matrix.
///
/// Samples are classified in parallel and logged as each one finishes; results
/// are folded in sample id order.
/// With `skip_unknown_types`, a sample whose type has no training entry is
/// logged and left out instead of aborting the run.
pub fn evaluate(
    classifier: &NearestNeighbor,
    index: &TrainingIndex<'_>,
    testing: &BTreeMap<String, Recording>,
    skip_unknown_types: bool,
) -> Result<Evaluation, EvalError> {
    let results: Vec<SampleResult> = testing
        .par_iter()
        .map(|(id, recording)| {
            let outcome = classify_sample(classifier, index, id, recording);
            if let Ok((prediction, actual)) = &outcome {
                info!(
                    "sample: {} prediction: {} actual: {} distance: {} matched: {}",
                    id,
                    prediction.is_true_alarm,
                    actual,
                    prediction.distance,
                    prediction.matched.as_deref().unwrap_or("-")
                );
            }
            SampleResult {
                id: id.clone(),
                outcome,
            }
        })
        .collect();

    let mut evaluation = Evaluation::default();
    for SampleResult { id, outcome } in results {
        let (prediction, actual) = match outcome {
            Ok(pair) => pair,
            Err(EvalError::Classify {
                sample,
                source: ClassifyError::NoTrainingData(kind),
            }) if skip_unknown_types => {
                warn!("sample {} skipped: no training data for type {}", sample, kind);
                evaluation.skipped.push(sample);
                continue;
            }
            Err(err) => return Err(err),
        };
        evaluation.distances.insert(
            id.clone(),
            DistanceEntry(
                prediction.distance,
                prediction.matched.unwrap_or_default(),
                prediction.is_true_alarm == actual,
            ),
        );
        evaluation.matrix.record(id, prediction.is_true_alarm, actual);
    }
    Ok(evaluation)
}

fn classify_sample(
    classifier: &NearestNeighbor,
    index: &TrainingIndex<'_>,
    id: &str,
    recording: &Recording,
) -> Result<(Prediction, bool), EvalError> {
    let actual = is_true_alarm(&recording.meta).map_err(|err| EvalError::Label {
        sample: id.to_string(),
        message: err.to_string(),
    })?;
    let prediction = classifier
        .predict(recording, index)
        .map_err(|source| EvalError::Classify {
            sample: id.to_string(),
            source,
        })?;
    Ok((prediction, actual))
}
