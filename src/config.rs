//! Configuration with built-in defaults.
//!
//! Defaults live here and nowhere else. A config file may override them, and
//! command-line flags override the config file. Commands receive resolved
//! values explicitly.

use crate::{async_utils::io::read_json_or_toml, prelude::*};

/// Where the fine-tuned recognition model lives, relative to the working
/// directory.
pub const DEFAULT_MODEL_DIR: &str = "../PaddleOCR/output/cyrillic_tuned_recognizer/";

/// Where `prepare-images` looks for source PDFs.
pub const DEFAULT_RAW_PDF_DIR: &str = "../data/raw";

/// Root of the processed dataset.
pub const DEFAULT_PROCESSED_DIR: &str = "../data/processed";

/// DPI used when rasterizing PDF pages.
pub const DEFAULT_RASTERIZE_DPI: u32 = 200;

/// Portion of label records that go to the training set.
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

/// Resolved configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding a fine-tuned recognition model.
    pub model_dir: PathBuf,

    /// DPI for rasterizing PDFs.
    pub rasterize_dpi: u32,

    /// Directory of PDFs to convert into training images.
    pub raw_pdf_dir: PathBuf,

    /// Directory where training images are written.
    pub image_dir: PathBuf,

    /// Label file containing every record.
    pub labels_path: PathBuf,

    /// Output label file for the training split.
    pub train_labels_path: PathBuf,

    /// Output label file for the evaluation split.
    pub eval_labels_path: PathBuf,

    /// Portion of records assigned to the training split.
    pub train_ratio: f64,
}

impl Default for Config {
    fn default() -> Self {
        let processed = Path::new(DEFAULT_PROCESSED_DIR);
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            rasterize_dpi: DEFAULT_RASTERIZE_DPI,
            raw_pdf_dir: PathBuf::from(DEFAULT_RAW_PDF_DIR),
            image_dir: processed.join("images"),
            labels_path: processed.join("all_labels.txt"),
            train_labels_path: processed.join("train_labels.txt"),
            eval_labels_path: processed.join("eval_labels.txt"),
            train_ratio: DEFAULT_TRAIN_RATIO,
        }
    }
}

impl Config {
    /// Load a config file if one was given, or use the defaults.
    #[instrument(level = "debug", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => read_json_or_toml::<Config>(path)
                .await
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => Config::default(),
        };
        config.validate()?;
        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Check that our values make sense.
    pub fn validate(&self) -> Result<()> {
        check_train_ratio(self.train_ratio)?;
        if self.rasterize_dpi == 0 {
            return Err(anyhow!("rasterize_dpi must be greater than 0"));
        }
        Ok(())
    }
}

/// Make sure a train ratio lies in `[0.0, 1.0]`.
pub fn check_train_ratio(ratio: f64) -> Result<()> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(anyhow!("train ratio must be between 0.0 and 1.0, got {ratio}"))
    }
}
