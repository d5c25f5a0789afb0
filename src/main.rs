use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{config::Config, prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod config;
mod dataset;
mod engines;
mod extract;
mod prelude;
mod rasterize;
mod ui;

/// Recognize text in PDFs, and prepare OCR training data.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
External tools:
  - pdfinfo and pdftocairo (from poppler-utils) rasterize PDFs.
  - tesseract recognizes text. A fine-tuned model directory is passed to
    tesseract as its tessdata directory.

Environment Variables:
  - RUST_LOG (optional): Log filter, such as `debug` or `pdf_ocr=trace`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    /// A TOML or JSON file overriding the default paths and settings.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Recognize the text of every page in a PDF.
    Extract(cmd::extract::ExtractOpts),
    /// Convert a directory of PDFs into page images for labeling.
    PrepareImages(cmd::prepare_images::PrepareImagesOpts),
    /// Shuffle a label file and split it into training and evaluation sets.
    SplitDataset(cmd::split_dataset::SplitDatasetOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output_path.is_none(),
            Cmd::PrepareImages(_) | Cmd::SplitDataset(_) => false,
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace, and
/// exit with status 1.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Load environment variables from a `.env` file, if it exists, so that
    // `RUST_LOG` can be set there.
    dotenvy::dotenv().ok();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    let config = Config::load(opts.config.as_deref()).await?;

    // Hide the progress bars if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Extract(extract_opts) => {
            cmd::extract::cmd_extract(ui, &config, extract_opts).await?;
        }
        Cmd::PrepareImages(prepare_opts) => {
            cmd::prepare_images::cmd_prepare_images(&config, prepare_opts).await?;
        }
        Cmd::SplitDataset(split_opts) => {
            cmd::split_dataset::cmd_split_dataset(&config, split_opts).await?;
        }
    }
    Ok(())
}
