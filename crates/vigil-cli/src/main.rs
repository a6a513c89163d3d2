use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};
use vigil_lib::{
    config::EvaluationConfig,
    evaluation::{ConfusionMatrix, DistanceReport},
    io::{json::read_json, sigtypes::ChannelTypes},
    labels::Arrhythmia,
    pipeline::{run, write_artifacts, RunRequest},
};

#[derive(Parser)]
#[command(
    name = "vigil",
    version,
    about = "Vigil: nearest-neighbour DTW classification of bedside monitor alarms"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Comma-separated arrhythmia tags, e.g. `a,b,t,v,f`.
#[derive(Clone, Debug)]
struct ArrhythmiaList(Vec<Arrhythmia>);

impl FromStr for ArrhythmiaList {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let tags = s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Arrhythmia>>>()?;
        if tags.is_empty() {
            anyhow::bail!("at least one arrhythmia tag is required");
        }
        Ok(Self(tags))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the test split of a WFDB record directory and write both JSON artifacts
    Run {
        /// Directory of WFDB records (`.hea` + data files)
        data_dir: PathBuf,
        /// Number of records (in record-name order) used as training data
        num_training: usize,
        /// Comma-separated arrhythmia tags to index, e.g. `a,b,t,v,f`
        arrhythmias: ArrhythmiaList,
        /// Confusion matrix output (`{"TP": [...], ...}`)
        matrix_out: PathBuf,
        /// Per-sample distances output
        distances_out: PathBuf,
        /// TOML file overriding window, channel cap, normalization and alignment
        #[arg(long)]
        config: Option<PathBuf>,
        /// Channel type table (`name<TAB>type` per line)
        #[arg(long)]
        sigtypes: Option<PathBuf>,
    },
    /// Print bucket sizes, accuracy and score from previously written artifacts
    Report {
        matrix: PathBuf,
        distances: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            data_dir,
            num_training,
            arrhythmias,
            matrix_out,
            distances_out,
            config,
            sigtypes,
        } => cmd_run(
            &data_dir,
            num_training,
            &arrhythmias.0,
            &matrix_out,
            &distances_out,
            config.as_deref(),
            sigtypes.as_deref(),
        )?,
        Commands::Report { matrix, distances } => cmd_report(&matrix, &distances)?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EvaluationConfig> {
    match path {
        Some(path) => EvaluationConfig::load(path),
        None => Ok(EvaluationConfig::default()),
    }
}

fn load_channel_types(path: Option<&Path>) -> Result<ChannelTypes> {
    match path {
        Some(path) => ChannelTypes::load(path),
        None => Ok(ChannelTypes::default()),
    }
}

fn cmd_run(
    data_dir: &Path,
    num_training: usize,
    arrhythmias: &[Arrhythmia],
    matrix_out: &Path,
    distances_out: &Path,
    config: Option<&Path>,
    sigtypes: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let channel_types = load_channel_types(sigtypes)?;
    info!("Generating training and testing sets...");
    let evaluation = run(
        data_dir,
        RunRequest {
            num_training,
            arrhythmias,
            config: &config,
            channel_types,
        },
    )?;
    write_artifacts(&evaluation, matrix_out, distances_out)?;
    let summary = evaluation.matrix.summary()?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_report(matrix: &Path, distances: &Path) -> Result<()> {
    let matrix: ConfusionMatrix = read_json(matrix)?;
    let distances: DistanceReport = read_json(distances)?;
    let correct = distances.values().filter(|entry| entry.correct()).count();
    info!(
        "{} of {} reported samples matched ground truth",
        correct,
        distances.len()
    );
    let summary = matrix.summary()?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
