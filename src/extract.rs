//! Page-by-page text extraction from PDFs.

use std::{error::Error as StdError, sync::Arc};

use serde::ser::SerializeMap as _;

use crate::{
    engines::{ModelSource, RecognitionEngine, TextRegion, load_engine},
    prelude::*,
    rasterize::{PopplerRasterizer, Rasterizer},
    ui::{ProgressConfig, Ui},
};

/// The separator between pages when extracted text is joined.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Errors that abort an extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The PDF could not be turned into page images.
    #[error(
        "failed to convert {path:?} into page images (is poppler installed, and is the file intact?)"
    )]
    Conversion {
        path: PathBuf,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// The recognition engine failed on a page.
    #[error("failed to recognize text on page {page}")]
    Recognition {
        page: usize,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

/// Recognized text for every page of a document, in page order.
///
/// Pages are addressed as `page_1`, `page_2`, and so on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Text for page `i + 1` lives at index `i`.
    pages: Vec<String>,
}

impl ExtractionResult {
    /// The number of pages.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Are there no pages?
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Look up a page by its key, like `page_3`.
    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        let number = key.strip_prefix("page_")?.parse::<usize>().ok()?;
        let index = number.checked_sub(1)?;
        self.pages.get(index).map(String::as_str)
    }

    /// Iterate over `(key, text)` pairs in page order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.pages
            .iter()
            .enumerate()
            .map(|(index, text)| (page_key(index + 1), text.as_str()))
    }

    /// All page texts, joined with a blank line.
    pub fn joined_text(&self) -> String {
        self.pages.join(PAGE_SEPARATOR)
    }

    fn push_page(&mut self, text: String) {
        self.pages.push(text);
    }
}

impl FromIterator<String> for ExtractionResult {
    /// Collect page texts, first page first.
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            pages: iter.into_iter().collect(),
        }
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.pages.len()))?;
        for (key, text) in self.iter() {
            map.serialize_entry(&key, text)?;
        }
        map.end()
    }
}

/// The key used for a 1-based page number.
pub fn page_key(number: usize) -> String {
    format!("page_{number}")
}

/// Join the regions of a page into the page's text.
fn page_text(regions: &[TextRegion]) -> String {
    regions
        .iter()
        .map(|region| region.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs a rasterizer and a recognition engine over documents.
///
/// The engine is loaded once and reused for every page.
pub struct Extractor {
    ui: Ui,
    rasterizer: Arc<dyn Rasterizer>,
    engine: Arc<dyn RecognitionEngine>,
}

impl Extractor {
    /// Create an extractor from existing parts.
    pub fn new(
        ui: Ui,
        rasterizer: Arc<dyn Rasterizer>,
        engine: Arc<dyn RecognitionEngine>,
    ) -> Self {
        Self {
            ui,
            rasterizer,
            engine,
        }
    }

    /// Load the standard engine with `model`, rasterizing at `dpi`.
    #[instrument(level = "debug", skip(ui))]
    pub async fn load(ui: Ui, model: ModelSource, dpi: u32) -> Result<Self> {
        let engine = load_engine(model).await?;
        Ok(Self::new(ui, Arc::new(PopplerRasterizer::new(dpi)), engine))
    }

    /// Extract the text of every page in the PDF at `path`.
    ///
    /// Pages are recognized one at a time, in order. The first failure aborts
    /// the whole extraction.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn extract_text(&self, path: &Path) -> Result<ExtractionResult> {
        let conversion_error = |source: anyhow::Error| ExtractError::Conversion {
            path: path.to_owned(),
            source: source.into(),
        };

        let mut document = self
            .rasterizer
            .rasterize(path)
            .await
            .map_err(conversion_error)?;
        let page_count = document.page_count();
        info!(
            "Found {} pages in {:?}, starting recognition",
            page_count,
            document.source().display()
        );

        let pb = self.ui.new_progress_bar(
            &ProgressConfig {
                emoji: "📄",
                msg: "Recognizing pages",
                done_msg: "Recognized pages",
            },
            u64::try_from(page_count).context("too many pages")?,
        );

        let mut result = ExtractionResult::default();
        while let Some(page) = document.next_page().await {
            let page = page.map_err(conversion_error)?;
            info!("Processing page {}/{}", page.number, page_count);
            let regions = self.engine.recognize(&page).await.map_err(|source| {
                ExtractError::Recognition {
                    page: page.number,
                    source: source.into(),
                }
            })?;
            if regions.is_empty() {
                debug!(page = page.number, "No text found on page");
            }
            for region in &regions {
                trace!(
                    page = page.number,
                    confidence = ?region.confidence,
                    bbox = ?region.bbox,
                    "Region: {:?}",
                    region.text
                );
            }
            result.push_page(page_text(&regions));
            pb.inc(1);
        }

        Ok(result)
    }
}
