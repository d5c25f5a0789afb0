//! The `prepare-images` subcommand.

use clap::Args;

use super::RasterizeOpts;
use crate::{
    config::Config, dataset::images::prepare_images, prelude::*,
    rasterize::PopplerRasterizer,
};

/// Options for the `prepare-images` subcommand.
#[derive(Debug, Args)]
pub struct PrepareImagesOpts {
    /// Directory containing the source PDFs. [default: ../data/raw]
    #[clap(long)]
    pub raw_pdf_dir: Option<PathBuf>,

    /// Directory to write page images into.
    /// [default: ../data/processed/images]
    #[clap(long)]
    pub image_dir: Option<PathBuf>,

    #[clap(flatten)]
    pub rasterize: RasterizeOpts,
}

/// Run the `prepare-images` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_prepare_images(config: &Config, opts: &PrepareImagesOpts) -> Result<()> {
    let raw_pdf_dir = opts.raw_pdf_dir.as_deref().unwrap_or(&config.raw_pdf_dir);
    let image_dir = opts.image_dir.as_deref().unwrap_or(&config.image_dir);
    let rasterizer = PopplerRasterizer::new(opts.rasterize.dpi(config));
    prepare_images(&rasterizer, raw_pdf_dir, image_dir).await?;
    Ok(())
}
