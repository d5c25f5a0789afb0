//! Command-line entry points.

use clap::Args;

use crate::config::Config;

pub mod extract;
pub mod prepare_images;
pub mod split_dataset;

/// Options for subcommands that rasterize PDFs.
#[derive(Debug, Clone, Args)]
pub struct RasterizeOpts {
    /// DPI to rasterize PDF pages at. [default: 200]
    #[clap(long)]
    rasterize_dpi: Option<u32>,
}

impl RasterizeOpts {
    /// The DPI to use, falling back to the configured value.
    pub fn dpi(&self, config: &Config) -> u32 {
        self.rasterize_dpi.unwrap_or(config.rasterize_dpi)
    }
}
