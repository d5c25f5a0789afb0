//! Shuffle a label file and split it into training and evaluation sets.

use rand::{Rng, seq::SliceRandom as _};

use crate::{
    async_utils::io::{read_nonblank_lines, write_text_file},
    prelude::*,
};

/// Where to read and write label files.
#[derive(Clone, Copy, Debug)]
pub struct SplitPaths<'a> {
    /// Every label record.
    pub labels: &'a Path,
    /// Destination for the training records.
    pub train: &'a Path,
    /// Destination for the evaluation records.
    pub eval: &'a Path,
}

/// What [`split_dataset`] did.
#[derive(Debug, PartialEq, Eq)]
pub enum SplitOutcome {
    /// The label file was missing or empty, so nothing was written.
    Skipped,
    /// Both label files were written.
    Written { train_count: usize, eval_count: usize },
}

/// How many of `count` records go to the training set.
pub fn train_count(count: usize, train_ratio: f64) -> usize {
    (count as f64 * train_ratio).floor() as usize
}

/// Shuffle `records` and split them into `(train, eval)`.
pub fn split_records<R>(
    mut records: Vec<String>,
    train_ratio: f64,
    rng: &mut R,
) -> (Vec<String>, Vec<String>)
where
    R: Rng + ?Sized,
{
    records.shuffle(rng);
    let split_at = train_count(records.len(), train_ratio).min(records.len());
    let eval = records.split_off(split_at);
    (records, eval)
}

/// Split the label file at `paths.labels` into training and evaluation files.
///
/// A missing or empty label file is reported and skipped. Both output files
/// are always attempted, even if the first write fails. Any write failure is
/// returned as an error after both attempts.
#[instrument(level = "debug", skip(rng))]
pub async fn split_dataset<R>(
    paths: SplitPaths<'_>,
    train_ratio: f64,
    rng: &mut R,
) -> Result<SplitOutcome>
where
    R: Rng + ?Sized,
{
    info!("Reading labels from {:?}", paths.labels.display());
    let records = match read_nonblank_lines(paths.labels).await? {
        None => {
            warn!(
                "Label file {:?} not found. Create it and fill it with every record.",
                paths.labels.display()
            );
            return Ok(SplitOutcome::Skipped);
        }
        Some(records) if records.is_empty() => {
            warn!("Label file {:?} is empty", paths.labels.display());
            return Ok(SplitOutcome::Skipped);
        }
        Some(records) => records,
    };

    info!("Read {} records", records.len());
    let (train, eval) = split_records(records, train_ratio, rng);

    let mut failures = 0;
    for (path, records) in [(paths.train, &train), (paths.eval, &eval)] {
        match write_text_file(path, &records.join("\n")).await {
            Ok(()) => info!("Wrote {:?}", path.display()),
            Err(err) => {
                error!("{:#}", err);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        return Err(anyhow!("failed to write {} of 2 label files", failures));
    }

    Ok(SplitOutcome::Written {
        train_count: train.len(),
        eval_count: eval.len(),
    })
}
