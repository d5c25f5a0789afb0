//! The `split-dataset` subcommand.

use clap::Args;
use rand::{SeedableRng as _, rngs::StdRng};

use crate::{
    config::{Config, check_train_ratio},
    dataset::split::{SplitOutcome, SplitPaths, split_dataset},
    prelude::*,
};

/// Options for the `split-dataset` subcommand.
#[derive(Debug, Args)]
pub struct SplitDatasetOpts {
    /// Label file with every record, one per line.
    /// [default: ../data/processed/all_labels.txt]
    #[clap(long)]
    pub labels: Option<PathBuf>,

    /// Where to write the training records.
    /// [default: ../data/processed/train_labels.txt]
    #[clap(long)]
    pub train: Option<PathBuf>,

    /// Where to write the evaluation records.
    /// [default: ../data/processed/eval_labels.txt]
    #[clap(long)]
    pub eval: Option<PathBuf>,

    /// Portion of records to use for training, between 0.0 and 1.0.
    /// [default: 0.8]
    #[clap(long)]
    pub train_ratio: Option<f64>,

    /// Seed for the shuffle, to make the split reproducible.
    #[clap(long)]
    pub seed: Option<u64>,
}

/// Run the `split-dataset` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_split_dataset(config: &Config, opts: &SplitDatasetOpts) -> Result<()> {
    let train_ratio = opts.train_ratio.unwrap_or(config.train_ratio);
    check_train_ratio(train_ratio)?;
    let paths = SplitPaths {
        labels: opts.labels.as_deref().unwrap_or(&config.labels_path),
        train: opts.train.as_deref().unwrap_or(&config.train_labels_path),
        eval: opts.eval.as_deref().unwrap_or(&config.eval_labels_path),
    };
    let outcome = match opts.seed {
        Some(seed) => {
            split_dataset(paths, train_ratio, &mut StdRng::seed_from_u64(seed)).await?
        }
        None => split_dataset(paths, train_ratio, &mut rand::rng()).await?,
    };
    if let SplitOutcome::Written {
        train_count,
        eval_count,
    } = outcome
    {
        info!(
            "Dataset split: {} training, {} evaluation records",
            train_count, eval_count
        );
    }
    Ok(())
}
