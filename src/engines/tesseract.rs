//! Tesseract recognition engine.

use std::ffi::{OsStr, OsString};

use super::{BoundingBox, ModelSource, RecognitionEngine, TextRegion};
use crate::{
    async_utils::{check_for_command_failure, run_command},
    prelude::*,
    rasterize::Page,
};

/// Page segmentation mode 1: automatic segmentation with orientation and
/// script detection, so rotated pages are straightened before recognition.
const PAGE_SEGMENTATION_MODE: &str = "1";

/// TSV `level` value for individual words.
const WORD_LEVEL: u32 = 5;

/// Engine wrapping the `tesseract` CLI tool.
#[derive(Debug)]
pub struct TesseractEngine {
    /// The `-l` language code.
    language: String,
    /// Directory with `<language>.traineddata`, if we're not using the
    /// system's models.
    tessdata_dir: Option<PathBuf>,
}

impl TesseractEngine {
    /// Load the engine, making sure `language` is available from `model`.
    #[instrument(level = "debug", skip_all, fields(model = ?model, language = %language))]
    pub async fn load(model: ModelSource, language: &str) -> Result<Self> {
        let tessdata_dir = match model {
            ModelSource::BuiltIn => {
                debug!("Using the built-in {} model", language);
                None
            }
            ModelSource::FineTuned(dir) => {
                debug!("Using the fine-tuned model in {:?}", dir.display());
                Some(dir)
            }
        };
        let engine = Self {
            language: language.to_owned(),
            tessdata_dir,
        };

        let mut args = engine.tessdata_args();
        args.push("--list-langs".into());
        let output = run_command("tesseract", &args).await?;
        check_for_command_failure("tesseract", &output, None)?;

        // Older releases print the list on stderr.
        let listing = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let languages = parse_language_list(&listing);
        if !languages.iter().any(|l| l == language) {
            return Err(anyhow!(
                "tesseract has no {:?} model{} (available: {})",
                language,
                match &engine.tessdata_dir {
                    Some(dir) => format!(" in {:?}", dir.display()),
                    None => String::new(),
                },
                languages.join(", ")
            ));
        }
        Ok(engine)
    }

    /// Arguments selecting our model directory, if any.
    fn tessdata_args(&self) -> Vec<OsString> {
        match &self.tessdata_dir {
            Some(dir) => vec!["--tessdata-dir".into(), dir.as_os_str().to_owned()],
            None => vec![],
        }
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    #[instrument(level = "debug", skip_all, fields(page = page.number))]
    async fn recognize(&self, page: &Page) -> Result<Vec<TextRegion>> {
        let extension = mime_guess::get_mime_extensions_str(&page.mime_type)
            .and_then(|o| o.first())
            .ok_or_else(|| anyhow!("cannot determine extension for {}", page.mime_type))?;

        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join(format!("input.{}", extension));
        tokio::fs::write(&input_path, &page.data)
            .await
            .context("cannot write tesseract input file")?;

        let mut args: Vec<OsString> = vec![input_path.into_os_string(), "stdout".into()];
        args.extend(self.tessdata_args());
        args.extend(
            ["-l", self.language.as_str(), "--psm", PAGE_SEGMENTATION_MODE, "tsv"]
                .map(|arg| OsStr::new(arg).to_owned()),
        );
        let output = run_command("tesseract", &args).await?;
        check_for_command_failure("tesseract", &output, None)?;

        let tsv = String::from_utf8(output.stdout)
            .context("tesseract output was not valid UTF-8")?;
        let regions = parse_tsv(&tsv)?;
        debug!(regions = regions.len(), "Recognized page");
        Ok(regions)
    }
}

/// Parse the output of `tesseract --list-langs`.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of"))
        .map(str::to_owned)
        .collect()
}

/// One row of tesseract's TSV output.
#[derive(Debug, Deserialize)]
struct TsvRow {
    level: u32,
    page_num: u32,
    block_num: u32,
    par_num: u32,
    line_num: u32,
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    conf: f32,
    text: String,
}

/// A text line being assembled from words.
struct LineBuilder {
    key: (u32, u32, u32, u32),
    words: Vec<String>,
    confidences: Vec<f32>,
    bbox: BoundingBox,
}

impl LineBuilder {
    fn into_region(self) -> TextRegion {
        let confidence = if self.confidences.is_empty() {
            None
        } else {
            let mean = self.confidences.iter().sum::<f32>() / self.confidences.len() as f32;
            Some((mean / 100.0).clamp(0.0, 1.0))
        };
        TextRegion {
            text: self.words.join(" "),
            confidence,
            bbox: Some(self.bbox),
        }
    }
}

/// Convert tesseract's TSV output into one region per text line, in the order
/// tesseract reports them.
fn parse_tsv(tsv: &str) -> Result<Vec<TextRegion>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(tsv.as_bytes());

    let headers = reader
        .headers()
        .context("cannot parse tesseract TSV header")?
        .clone();

    let mut regions = vec![];
    let mut current: Option<LineBuilder> = None;
    for record in reader.records() {
        let mut record = record.context("cannot parse tesseract TSV output")?;
        // Rows without text may omit the trailing `text` column entirely.
        while record.len() < headers.len() {
            record.push_field("");
        }
        let row = record
            .deserialize::<TsvRow>(Some(&headers))
            .context("cannot parse tesseract TSV row")?;
        let word = row.text.trim();
        if row.level != WORD_LEVEL || word.is_empty() {
            continue;
        }

        let key = (row.page_num, row.block_num, row.par_num, row.line_num);
        let bbox = BoundingBox {
            left: row.left,
            top: row.top,
            width: row.width,
            height: row.height,
        };
        let line = match current.take() {
            Some(mut line) if line.key == key => {
                line.bbox = line.bbox.union(&bbox);
                line
            }
            finished => {
                if let Some(line) = finished {
                    regions.push(line.into_region());
                }
                LineBuilder {
                    key,
                    words: vec![],
                    confidences: vec![],
                    bbox,
                }
            }
        };
        let line = current.insert(line);
        line.words.push(word.to_owned());
        if row.conf >= 0.0 {
            line.confidences.push(row.conf);
        }
    }
    if let Some(line) = current {
        regions.push(line.into_region());
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = HEADER.to_owned();
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out.push('\n');
        out
    }

    #[test]
    fn words_are_grouped_into_lines() -> Result<()> {
        let tsv = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t1000\t1000\t-1\t",
            "4\t1\t1\t1\t1\t0\t10\t10\t200\t20\t-1\t",
            "5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t90\tПривет",
            "5\t1\t1\t1\t1\t2\t100\t12\t110\t18\t80\tмир",
            "5\t1\t1\t1\t2\t1\t10\t40\t50\t20\t70\tвторая",
        ]);
        let regions = parse_tsv(&tsv)?;
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].text, "Привет мир");
        assert_eq!(regions[1].text, "вторая");
        assert_eq!(
            regions[0].bbox,
            Some(BoundingBox {
                left: 10,
                top: 10,
                width: 200,
                height: 20,
            })
        );
        let confidence = regions[0].confidence.expect("confidence");
        assert!((confidence - 0.85).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn blank_words_are_dropped() -> Result<()> {
        let tsv = tsv(&[
            "5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t95\t ",
            "5\t1\t1\t1\t1\t2\t10\t10\t80\t20\t95\t",
        ]);
        assert!(parse_tsv(&tsv)?.is_empty());
        Ok(())
    }

    #[test]
    fn rows_missing_the_text_column_are_skipped() -> Result<()> {
        let tsv = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t1000\t1000\t-1",
            "5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t95\tслово",
            "5\t1\t1\t1\t1\t2\t100\t10\t80\t20\t95",
        ]);
        let regions = parse_tsv(&tsv)?;
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "слово");
        Ok(())
    }

    #[test]
    fn empty_output_has_no_regions() -> Result<()> {
        assert!(parse_tsv(&tsv(&[]))?.is_empty());
        assert!(parse_tsv("")?.is_empty());
        Ok(())
    }

    #[test]
    fn same_line_number_in_new_block_is_a_new_region() -> Result<()> {
        let tsv = tsv(&[
            "5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t95\tone",
            "5\t1\t2\t1\t1\t1\t10\t50\t80\t20\t95\ttwo",
        ]);
        let texts = parse_tsv(&tsv)?
            .into_iter()
            .map(|r| r.text)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["one", "two"]);
        Ok(())
    }

    #[test]
    fn language_list_skips_the_heading() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nosd\nrus\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "osd", "rus"]);
    }

    #[tokio::test]
    #[ignore = "Requires tesseract with the rus model installed"]
    async fn built_in_model_loads() -> Result<()> {
        TesseractEngine::load(ModelSource::BuiltIn, "rus").await?;
        Ok(())
    }

    #[tokio::test]
    async fn missing_language_fails_to_load() -> Result<()> {
        // Either tesseract is missing, or it has no such model. Both are
        // load failures.
        let dir = tempfile::TempDir::with_prefix("tessdata")?;
        let result =
            TesseractEngine::load(ModelSource::FineTuned(dir.path().to_owned()), "zzz")
                .await;
        assert!(result.is_err());
        Ok(())
    }
}
