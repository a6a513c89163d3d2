use crate::{
    classifier::TrainingIndex,
    config::EvaluationConfig,
    evaluation::{evaluate, Evaluation},
    io::{
        json::write_json,
        sigtypes::ChannelTypes,
        wfdb::{read_signals, split_dataset},
    },
    labels::Arrhythmia,
    signal::Recording,
};
use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::path::Path;

/// Inputs of one retrospective run.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub num_training: usize,
    pub arrhythmias: &'a [Arrhythmia],
    pub config: &'a EvaluationConfig,
    pub channel_types: ChannelTypes,
}

/// Read every record under `data_dir` and evaluate it.
pub fn run(data_dir: &Path, request: RunRequest<'_>) -> Result<Evaluation> {
    info!("Reading records from {}", data_dir.display());
    let records = read_signals(data_dir)?;
    run_on_records(records, request)
}

/// Split, index and evaluate records that are already in memory.
pub fn run_on_records(
    records: BTreeMap<String, Recording>,
    request: RunRequest<'_>,
) -> Result<Evaluation> {
    let RunRequest {
        num_training,
        arrhythmias,
        config,
        channel_types,
    } = request;
    config.validate()?;

    let total = records.len();
    let (training, testing) = split_dataset(records, num_training);
    info!(
        "{} records: {} training, {} testing",
        total,
        training.len(),
        testing.len()
    );
    let index = TrainingIndex::build(&training, arrhythmias)?;
    for kind in index.types() {
        info!(
            "type {}: {} training samples",
            kind,
            index.samples(kind).map(<[_]>::len).unwrap_or(0)
        );
    }

    let classifier = config.classifier(channel_types);
    info!("Calculating classification accuracy...");
    let evaluation = match config.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .context("building worker pool")?;
            pool.install(|| evaluate(&classifier, &index, &testing, config.skip_unknown_types))?
        }
        None => evaluate(&classifier, &index, &testing, config.skip_unknown_types)?,
    };
    Ok(evaluation)
}

/// Persist the confusion matrix and distances report.
pub fn write_artifacts(evaluation: &Evaluation, matrix_path: &Path, distances_path: &Path) -> Result<()> {
    write_json(matrix_path, &evaluation.matrix)?;
    write_json(distances_path, &evaluation.distances)?;
    info!(
        "Wrote {} and {}",
        matrix_path.display(),
        distances_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        distance::Alignment,
        evaluation::{ConfusionMatrix, DistanceReport},
        io::json::read_json,
        signal::RecordMeta,
    };
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn recording(name: &str, label: &str, data: Vec<f64>) -> Recording {
        let meta = RecordMeta {
            name: name.into(),
            fs: 2.0,
            channels: vec!["II".into(), "RESP".into()],
            comments: vec!["Asystole".into(), label.into()],
        };
        let resp = vec![0.0; data.len()];
        Recording::new(meta, vec![data, resp]).unwrap()
    }

    fn records() -> BTreeMap<String, Recording> {
        [
            recording("a001", "True alarm", vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0]),
            recording("a002", "False alarm", vec![0.0, 0.0, 9.0, 9.0, 9.0, 9.0]),
            recording("a100", "True alarm", vec![5.0, 5.0, 1.0, 2.0, 3.0, 4.0]),
            recording("a101", "False alarm", vec![0.0, 0.0, 9.0, 9.0, 8.0, 9.0]),
        ]
        .into_iter()
        .map(|r| (r.name().to_string(), r))
        .collect()
    }

    fn config() -> EvaluationConfig {
        EvaluationConfig {
            alarm_time_s: 3.0,
            window_s: 2.0,
            alignment: Alignment::Exact,
            threads: Some(2),
            ..EvaluationConfig::default()
        }
    }

    #[test]
    fn runs_end_to_end_in_memory() {
        let config = config();
        let evaluation = run_on_records(
            records(),
            RunRequest {
                num_training: 2,
                arrhythmias: &[Arrhythmia::Asystole],
                config: &config,
                channel_types: ChannelTypes::default(),
            },
        )
        .unwrap();
        assert_eq!(evaluation.matrix.true_positive, vec!["a100"]);
        assert_eq!(evaluation.matrix.true_negative, vec!["a101"]);
        assert_relative_eq!(evaluation.distances["a100"].distance(), 0.0);
        let summary = evaluation.matrix.summary().unwrap();
        assert_relative_eq!(summary.accuracy, 1.0);
        assert_relative_eq!(summary.score, 1.0);
    }

    #[test]
    fn writes_both_artifacts() {
        let config = config();
        let evaluation = run_on_records(
            records(),
            RunRequest {
                num_training: 2,
                arrhythmias: &Arrhythmia::ALL,
                config: &config,
                channel_types: ChannelTypes::default(),
            },
        )
        .unwrap();
        let dir = tempdir().unwrap();
        let matrix_path = dir.path().join("dtw.json");
        let distances_path = dir.path().join("dtw_distances.json");
        write_artifacts(&evaluation, &matrix_path, &distances_path).unwrap();

        let matrix: ConfusionMatrix = read_json(&matrix_path).unwrap();
        let distances: DistanceReport = read_json(&distances_path).unwrap();
        assert_eq!(matrix, evaluation.matrix);
        assert_eq!(distances.len(), 2);
        assert_eq!(distances["a101"].matched(), "a002");
    }

    #[test]
    fn all_training_leaves_nothing_to_score() {
        let config = config();
        let evaluation = run_on_records(
            records(),
            RunRequest {
                num_training: 10,
                arrhythmias: &[Arrhythmia::Asystole],
                config: &config,
                channel_types: ChannelTypes::default(),
            },
        )
        .unwrap();
        assert_eq!(evaluation.matrix.total(), 0);
        assert!(evaluation.matrix.summary().is_err());
    }
}
