//! The `extract` subcommand.

use clap::{Args, ValueEnum};

use super::RasterizeOpts;
use crate::{
    async_utils::io::write_text_file,
    config::Config,
    engines::ModelSource,
    extract::{ExtractionResult, Extractor},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// Width of the banner lines around text printed to standard output.
const BANNER_WIDTH: usize = 60;

/// Title centered in the opening banner line.
const BANNER_TITLE: &str = " RECOGNITION RESULT ";

/// How to write the extracted text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Page texts separated by blank lines.
    #[default]
    Text,
    /// A JSON object mapping `page_N` to page text.
    Json,
}

/// Options for the `extract` subcommand.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// The PDF file to recognize.
    pub pdf_path: PathBuf,

    /// Directory containing the fine-tuned recognition model.
    /// [default: ../PaddleOCR/output/cyrillic_tuned_recognizer/]
    #[clap(short = 'm', long = "model_dir", alias = "model-dir")]
    pub model_dir: Option<PathBuf>,

    /// Use the engine's built-in model instead of the fine-tuned one.
    /// `--model_dir` is ignored.
    #[clap(long = "use_default_model", alias = "use-default-model")]
    pub use_default_model: bool,

    /// Write the result to this file instead of standard output.
    #[clap(short = 'o', long = "output_path", alias = "output-path")]
    pub output_path: Option<PathBuf>,

    /// Output format.
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[clap(flatten)]
    pub rasterize: RasterizeOpts,
}

/// Decide which model to load, checking that it exists.
fn choose_model(config: &Config, opts: &ExtractOpts) -> Result<ModelSource> {
    if opts.use_default_model {
        info!("Using the engine's built-in model");
        return Ok(ModelSource::BuiltIn);
    }
    let model_dir = opts
        .model_dir
        .clone()
        .unwrap_or_else(|| config.model_dir.clone());
    if !model_dir.exists() {
        return Err(anyhow!(
            "fine-tuned model directory not found: {:?}\n\
             Train a model first, or pass --use_default_model to use the built-in one.",
            model_dir.display()
        ));
    }
    info!("Using the fine-tuned model from {:?}", model_dir.display());
    Ok(ModelSource::FineTuned(model_dir))
}

/// Run the `extract` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_extract(ui: Ui, config: &Config, opts: &ExtractOpts) -> Result<()> {
    // Validate inputs before doing anything expensive.
    if !opts.pdf_path.exists() {
        return Err(anyhow!(
            "PDF file not found: {:?}",
            opts.pdf_path.display()
        ));
    }
    let model = choose_model(config, opts)?;

    // Load the engine.
    info!("Loading recognition engine. This may take a while.");
    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🧠",
        msg: "Loading recognition engine",
        done_msg: "Loaded recognition engine",
    });
    let extractor = ui
        .timed(
            "Recognition engine loaded",
            Extractor::load(ui.clone(), model, opts.rasterize.dpi(config)),
        )
        .await?;
    spinner.finish();

    // Extract the text.
    info!("Processing {:?}", opts.pdf_path.display());
    let result = ui
        .timed("File processed", extractor.extract_text(&opts.pdf_path))
        .await?;
    if result.is_empty() {
        warn!("{:?} has no pages", opts.pdf_path.display());
    }

    emit_result(&result, opts.format, opts.output_path.as_deref()).await
}

/// Render `result` in `format`. Text headed for standard output is framed by
/// banner lines; JSON never is, so it can be piped.
fn render_result(
    result: &ExtractionResult,
    format: OutputFormat,
    framed: bool,
) -> Result<String> {
    let text = match format {
        OutputFormat::Text => result.joined_text(),
        OutputFormat::Json => serde_json::to_string_pretty(result)
            .context("failed to serialize extracted text")?,
    };
    Ok(match format {
        OutputFormat::Text if framed => {
            let half = "=".repeat((BANNER_WIDTH - BANNER_TITLE.len()) / 2);
            format!(
                "{half}{BANNER_TITLE}{half}\n{text}\n{}\n",
                "=".repeat(BANNER_WIDTH)
            )
        }
        _ if framed => format!("{text}\n"),
        _ => text,
    })
}

/// Write `result` to `output_path`, or to standard output if there is none.
async fn emit_result(
    result: &ExtractionResult,
    format: OutputFormat,
    output_path: Option<&Path>,
) -> Result<()> {
    match output_path {
        Some(output_path) => {
            let text = render_result(result, format, false)?;
            write_text_file(output_path, &text).await.with_context(|| {
                format!("failed to save result to {:?}", output_path.display())
            })?;
            info!("Saved result to {:?}", output_path.display());
        }
        None => print!("{}", render_result(result, format, true)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(model_dir: Option<PathBuf>, use_default_model: bool) -> ExtractOpts {
        ExtractOpts {
            pdf_path: PathBuf::from("doc.pdf"),
            model_dir,
            use_default_model,
            output_path: None,
            format: OutputFormat::Text,
            rasterize: RasterizeOpts {
                rasterize_dpi: None,
            },
        }
    }

    #[test]
    fn default_model_skips_directory_check() -> Result<()> {
        let model = choose_model(
            &Config::default(),
            &opts(Some(PathBuf::from("/no/such/model")), true),
        )?;
        assert_eq!(model, ModelSource::BuiltIn);
        Ok(())
    }

    #[test]
    fn missing_model_directory_is_an_error() {
        let err = choose_model(
            &Config::default(),
            &opts(Some(PathBuf::from("/no/such/model")), false),
        )
        .unwrap_err();
        assert!(err.to_string().contains("--use_default_model"));
    }

    #[test]
    fn existing_model_directory_is_fine_tuned() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("model")?;
        let model = choose_model(
            &Config::default(),
            &opts(Some(dir.path().to_owned()), false),
        )?;
        assert_eq!(model, ModelSource::FineTuned(dir.path().to_owned()));
        Ok(())
    }

    #[test]
    fn configured_model_directory_is_the_fallback() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("model")?;
        let config = Config {
            model_dir: dir.path().to_owned(),
            ..Config::default()
        };
        let model = choose_model(&config, &opts(None, false))?;
        assert_eq!(model, ModelSource::FineTuned(dir.path().to_owned()));
        Ok(())
    }

    fn sample_result() -> ExtractionResult {
        ["первая строка\nвторая", "", "третья"]
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn stdout_text_is_framed_by_banners() -> Result<()> {
        let rendered = render_result(&sample_result(), OutputFormat::Text, true)?;
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(
            lines.first().copied(),
            Some("==================== RECOGNITION RESULT ====================")
        );
        assert_eq!(lines[0].chars().count(), BANNER_WIDTH);
        assert_eq!(lines.last().copied(), Some("=".repeat(BANNER_WIDTH).as_str()));
        assert_eq!(
            lines[1..lines.len() - 1].join("\n"),
            "первая строка\nвторая\n\n\n\nтретья"
        );
        Ok(())
    }

    #[test]
    fn stdout_json_is_bare_and_in_page_order() -> Result<()> {
        let rendered = render_result(&sample_result(), OutputFormat::Json, true)?;
        assert!(rendered.starts_with('{'));
        assert!(!rendered.contains("RECOGNITION RESULT"));
        let page_1 = rendered.find("\"page_1\"").expect("page_1");
        let page_2 = rendered.find("\"page_2\"").expect("page_2");
        let page_3 = rendered.find("\"page_3\"").expect("page_3");
        assert!(page_1 < page_2 && page_2 < page_3);
        let json: serde_json::Value = serde_json::from_str(&rendered)?;
        assert_eq!(json["page_3"], "третья");
        Ok(())
    }

    #[tokio::test]
    async fn file_output_is_unframed_utf8() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("extract-output")?;
        let path = dir.path().join("result.txt");
        emit_result(&sample_result(), OutputFormat::Text, Some(&path)).await?;
        assert_eq!(
            std::fs::read_to_string(&path)?,
            "первая строка\nвторая\n\n\n\nтретья"
        );
        Ok(())
    }

    #[tokio::test]
    async fn unwritable_output_path_is_an_error() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("extract-output")?;
        let path = dir.path().join("no/such/dir/result.json");
        let err = emit_result(&sample_result(), OutputFormat::Json, Some(&path))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to save result"));
        assert!(!path.exists());
        Ok(())
    }
}
