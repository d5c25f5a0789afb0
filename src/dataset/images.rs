//! Convert a directory of PDFs into page images for labeling.

use tokio::fs;

use crate::{prelude::*, rasterize::Rasterizer};

/// What [`prepare_images`] did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PrepareSummary {
    /// How many PDFs were converted.
    pub pdf_count: usize,
    /// How many page images were written.
    pub image_count: usize,
}

/// The name of the image for a page of a PDF.
pub fn image_file_name(stem: &str, page_number: usize) -> String {
    format!("{stem}_page_{page_number:03}.png")
}

/// The part of a PDF's file name before its first `.`.
fn pdf_stem(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {:?}", path.display()))?
        .to_string_lossy();
    Ok(file_name
        .split('.')
        .next()
        .unwrap_or_default()
        .to_owned())
}

/// List the PDFs in `dir`, sorted by path. A missing directory has no PDFs.
async fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read directory {:?}", dir.display()));
        }
    };
    let mut pdfs = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to read entry in {:?}", dir.display()))?
    {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && entry.file_type().await?.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// Rasterize every PDF in `raw_pdf_dir`, writing one PNG per page into
/// `image_dir`.
///
/// Images are named `{stem}_page_{NNN}.png`. Existing files with the same
/// name are overwritten.
#[instrument(level = "debug", skip(rasterizer))]
pub async fn prepare_images(
    rasterizer: &dyn Rasterizer,
    raw_pdf_dir: &Path,
    image_dir: &Path,
) -> Result<PrepareSummary> {
    fs::create_dir_all(image_dir)
        .await
        .with_context(|| format!("failed to create {:?}", image_dir.display()))?;

    let pdfs = list_pdfs(raw_pdf_dir).await?;
    if pdfs.is_empty() {
        warn!("No PDF files found in {:?}", raw_pdf_dir.display());
        return Ok(PrepareSummary::default());
    }

    info!("Converting {} PDFs to images", pdfs.len());
    let mut summary = PrepareSummary::default();
    for pdf in &pdfs {
        let stem = pdf_stem(pdf)?;
        let mut document = rasterizer
            .rasterize(pdf)
            .await
            .with_context(|| format!("failed to rasterize {:?}", pdf.display()))?;
        while let Some(page) = document.next_page().await {
            let page = page?;
            let image_path = image_dir.join(image_file_name(&stem, page.number));
            fs::write(&image_path, &page.data)
                .await
                .with_context(|| format!("failed to write {:?}", image_path.display()))?;
            info!("Saved {:?}", image_path.display());
            summary.image_count += 1;
        }
        summary.pdf_count += 1;
    }
    info!(
        "Converted {} PDFs into {} images",
        summary.pdf_count, summary.image_count
    );
    Ok(summary)
}
