//! Recognition engine interface.
//!
//! An engine takes one page image and returns the text regions it found, in
//! its own reading order. Everything about how it finds them (detection,
//! recognition, orientation correction) is the engine's business.

use std::sync::Arc;

use crate::{prelude::*, rasterize::Page};

pub mod tesseract;

/// The language every engine is configured to recognize.
pub const RECOGNITION_LANGUAGE: &str = "rus";

/// An axis-aligned box in page pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// The smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = (self.left + self.width).max(other.left + other.width);
        let bottom = (self.top + self.height).max(other.top + other.height);
        BoundingBox {
            left,
            top,
            width: right - left,
            height: bottom - top,
        }
    }
}

/// A detected text region on a page.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRegion {
    /// The recognized text.
    pub text: String,

    /// How sure the engine is about `text`, from 0.0 to 1.0.
    pub confidence: Option<f32>,

    /// Where the region is on the page.
    pub bbox: Option<BoundingBox>,
}

impl TextRegion {
    /// A region with text only.
    #[cfg(test)]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
            bbox: None,
        }
    }
}

/// Which recognition model to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    /// The model that ships with the engine.
    BuiltIn,
    /// A fine-tuned model stored in a directory.
    FineTuned(PathBuf),
}

/// Interface to a recognition engine.
#[async_trait]
pub trait RecognitionEngine: Send + Sync + 'static {
    /// Recognize the text on a single page. An empty list means the page has
    /// no text.
    async fn recognize(&self, page: &Page) -> Result<Vec<TextRegion>>;
}

/// Load the default recognition engine with the specified model.
pub async fn load_engine(model: ModelSource) -> Result<Arc<dyn RecognitionEngine>> {
    let engine = tesseract::TesseractEngine::load(model, RECOGNITION_LANGUAGE).await?;
    Ok(Arc::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_union_covers_both() {
        let a = BoundingBox {
            left: 10,
            top: 20,
            width: 30,
            height: 10,
        };
        let b = BoundingBox {
            left: 50,
            top: 15,
            width: 10,
            height: 10,
        };
        assert_eq!(
            a.union(&b),
            BoundingBox {
                left: 10,
                top: 15,
                width: 50,
                height: 15,
            }
        );
    }
}
