//! Turn PDFs into page images.

use std::{collections::BTreeMap, ffi::OsStr, vec};

use crate::{
    async_utils::{DEFAULT_ERROR_REGEX, check_for_command_failure, run_command},
    prelude::*,
};

/// The MIME type of the page images we produce.
pub const PAGE_MIME_TYPE: &str = "image/png";

/// The MIME type we require for input documents.
const PDF_MIME_TYPE: &str = "application/pdf";

/// Does this line of poppler output indicate a real error?
///
/// Damaged cross-reference tables are common and poppler recovers from them,
/// so we treat those as warnings.
fn is_error_line(line: &str) -> bool {
    DEFAULT_ERROR_REGEX.is_match(line)
        && !(line.contains("xref num") || line.contains("Couldn't find trailer"))
}

/// One rasterized page of a document.
#[derive(Debug)]
pub struct Page {
    /// 1-based position of this page within its document.
    pub number: usize,
    /// The MIME type of `data`.
    pub mime_type: String,
    /// The encoded image.
    pub data: Vec<u8>,
}

/// A rasterized document, yielding its pages in order.
///
/// Pages are stored as files in a temporary directory and read one at a time.
/// Each file is deleted once it has been read, and the directory is removed
/// when the document is dropped.
pub struct Document {
    /// The PDF this document came from.
    source: PathBuf,
    /// Holds our page files. Released by [`Drop`].
    tmpdir: Option<tempfile::TempDir>,
    /// Page files, in page order.
    page_paths: vec::IntoIter<PathBuf>,
    /// Total number of pages.
    page_count: usize,
    /// Number of the next page to return.
    next_number: usize,
}

impl Document {
    /// Build a document from a directory of page images named so that they
    /// sort lexically in page order.
    pub fn from_page_dir(source: &Path, tmpdir: tempfile::TempDir) -> Result<Self> {
        let dir = tmpdir.path();
        let mut page_paths = dir
            .read_dir()
            .with_context(|| format!("failed to read page directory {:?}", dir.display()))?
            .map(|entry| {
                let entry = entry.with_context(|| {
                    format!("failed to read entry in page directory {:?}", dir.display())
                })?;
                Ok(entry.path())
            })
            .collect::<Result<Vec<_>>>()?;
        page_paths.sort();
        Ok(Self {
            source: source.to_owned(),
            page_count: page_paths.len(),
            page_paths: page_paths.into_iter(),
            tmpdir: Some(tmpdir),
            next_number: 1,
        })
    }

    /// The PDF this document was rasterized from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// How many pages does this document have?
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Read the next page, or `None` once every page has been returned.
    pub async fn next_page(&mut self) -> Option<Result<Page>> {
        let path = self.page_paths.next()?;
        let number = self.next_number;
        self.next_number += 1;
        Some(read_page_file(&path, number).await)
    }
}

/// Read a page image, then delete it to recover space early.
async fn read_page_file(path: &Path, number: usize) -> Result<Page> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read page file {:?}", path.display()))?;
    tokio::fs::remove_file(path)
        .await
        .with_context(|| format!("failed to delete page file {:?}", path.display()))?;
    Ok(Page {
        number,
        mime_type: PAGE_MIME_TYPE.to_owned(),
        data,
    })
}

impl Drop for Document {
    fn drop(&mut self) {
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary directory: {}",
                    err
                );
            }
        }
    }
}

/// Something that can turn a PDF into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync + 'static {
    /// Rasterize every page of the PDF at `path`, in page order.
    async fn rasterize(&self, path: &Path) -> Result<Document>;
}

/// Rasterizer using Poppler's `pdfinfo` and `pdftocairo` CLI tools.
#[derive(Clone, Debug)]
pub struct PopplerRasterizer {
    dpi: u32,
}

impl PopplerRasterizer {
    /// Create a rasterizer producing PNGs at `dpi`.
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

#[async_trait]
impl Rasterizer for PopplerRasterizer {
    #[instrument(level = "debug", skip_all, fields(path = %path.display(), dpi = self.dpi))]
    async fn rasterize(&self, path: &Path) -> Result<Document> {
        let mime_type = get_mime_type(path)?;
        if mime_type != PDF_MIME_TYPE {
            return Err(anyhow!(
                "{:?} is not a PDF (detected {})",
                path.display(),
                mime_type
            ));
        }

        let total_pages = get_pdf_page_count(path).await?;

        // pdftocairo appends zero-padded page numbers to this name, so the
        // output files sort in page order.
        let tmpdir = tempfile::TempDir::with_prefix("pages")?;
        let out_root = tmpdir.path().join("page");
        let dpi = self.dpi.to_string();
        let output = run_command(
            "pdftocairo",
            [
                OsStr::new("-png"),
                OsStr::new("-r"),
                OsStr::new(&dpi),
                path.as_os_str(),
                out_root.as_os_str(),
            ],
        )
        .await?;
        check_for_command_failure("pdftocairo", &output, Some(&is_error_line))?;

        // Anything left on stderr is a warning.
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if !line.trim().is_empty() {
                warn!(path = %path.display(), "pdftocairo: {}", line.trim());
            }
        }

        let document = Document::from_page_dir(path, tmpdir)?;
        if document.page_count() != total_pages {
            return Err(anyhow!(
                "pdftocairo produced {} pages for {:?}, but pdfinfo reports {}",
                document.page_count(),
                path.display(),
                total_pages
            ));
        }
        Ok(document)
    }
}

/// Get the number of pages in a PDF file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn get_pdf_page_count(path: &Path) -> Result<usize> {
    let output = run_command("pdfinfo", [path]).await?;
    check_for_command_failure("pdfinfo", &output, None)?;

    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    let properties = parse_pdfinfo(&output);
    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str.parse::<usize>().with_context(|| {
        format!(
            "failed to parse page count for {:?} from pdfinfo output",
            path.display()
        )
    })
}

/// Parse `Key: value` lines from `pdfinfo`.
fn parse_pdfinfo(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_owned(), value.trim().to_owned()))
        })
        .collect()
}

/// Get the MIME type of a file from its contents.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown MIME type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}

/// Write some fake page files into a new temporary directory, for tests that
/// don't need real images.
#[cfg(test)]
pub fn fake_page_dir(page_count: usize) -> Result<tempfile::TempDir> {
    let tmpdir = tempfile::TempDir::with_prefix("fake-pages")?;
    for i in 1..=page_count {
        std::fs::write(
            tmpdir.path().join(format!("page-{i:03}.png")),
            format!("page {i}"),
        )?;
    }
    Ok(tmpdir)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    static TEST_PDF_PATH: &str = "tests/fixtures/two_pages.pdf";

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("Syntax Error: something went wrong"));
        assert!(is_error_line("ERROR: something went wrong"));
        assert!(!is_error_line("Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, document has changes, reconstruct aborted"
        ));
    }

    #[test]
    fn pdfinfo_output_is_parsed() {
        let properties = parse_pdfinfo(
            "Producer:       hand\nPages:          12\nPage size:      612 x 792 pts\n",
        );
        assert_eq!(properties.get("Pages").map(String::as_str), Some("12"));
        assert_eq!(
            properties.get("Page size").map(String::as_str),
            Some("612 x 792 pts")
        );
    }

    #[tokio::test]
    async fn document_yields_numbered_pages_in_order() -> Result<()> {
        let tmpdir = fake_page_dir(3)?;
        let mut document = Document::from_page_dir(Path::new("doc.pdf"), tmpdir)?;
        assert_eq!(document.page_count(), 3);
        assert_eq!(document.source(), Path::new("doc.pdf"));

        let mut seen = vec![];
        while let Some(page) = document.next_page().await {
            let page = page?;
            seen.push((page.number, String::from_utf8(page.data)?));
        }
        assert_eq!(
            seen,
            vec![
                (1, "page 1".to_owned()),
                (2, "page 2".to_owned()),
                (3, "page 3".to_owned()),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn pages_are_deleted_once_read() -> Result<()> {
        let tmpdir = fake_page_dir(1)?;
        let page_path = tmpdir.path().join("page-001.png");
        let mut document = Document::from_page_dir(Path::new("doc.pdf"), tmpdir)?;
        assert!(page_path.exists());
        document.next_page().await.expect("one page")?;
        assert!(!page_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn non_pdf_input_is_rejected() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("rasterize-test")?;
        let path = dir.path().join("fake.pdf");
        fs::write(&path, b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR")?;
        let err = PopplerRasterizer::new(72)
            .rasterize(&path)
            .await
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("is not a PDF"));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn page_count_returns_correct_number_of_pages() -> Result<()> {
        let page_count = get_pdf_page_count(Path::new(TEST_PDF_PATH)).await?;
        assert_eq!(page_count, 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn poppler_returns_one_png_per_page() -> Result<()> {
        let mut document = PopplerRasterizer::new(72)
            .rasterize(Path::new(TEST_PDF_PATH))
            .await?;
        assert_eq!(document.page_count(), 2);
        let mut count = 0;
        while let Some(page) = document.next_page().await {
            let page = page?;
            assert_eq!(page.mime_type, PAGE_MIME_TYPE);
            assert!(page.data.starts_with(b"\x89PNG"));
            count += 1;
        }
        assert_eq!(count, 2);
        Ok(())
    }
}
