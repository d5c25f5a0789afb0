//! File I/O utilities.
//!
//! Every file we touch is opened, used, and closed inside a single call here.
//! Nothing holds a file handle open across an `await` in other modules.

use serde::de::DeserializeOwned;
use tokio::{fs, io::AsyncWriteExt as _};

use crate::prelude::*;

/// Read TOML or JSON from a file. Files ending in `.json` are parsed as JSON,
/// and everything else as TOML.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    if is_json {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Write UTF-8 text to a file, replacing anything already there.
pub async fn write_text_file(path: &Path, text: &str) -> Result<()> {
    let mut file = fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create file at path: {:?}", path))?;
    file.write_all(text.as_bytes())
        .await
        .with_context(|| format!("Failed to write to file at path: {:?}", path))?;
    file.flush()
        .await
        .with_context(|| format!("Failed to flush file at path: {:?}", path))?;
    Ok(())
}

/// Read a newline-delimited file, trimming each line and dropping blank ones.
///
/// Returns `Ok(None)` if the file does not exist.
pub async fn read_nonblank_lines(path: &Path) -> Result<Option<Vec<String>>> {
    let data = match fs::read_to_string(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read file at path: {:?}", path));
        }
    };
    Ok(Some(
        data.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Example {
        name: String,
    }

    #[tokio::test]
    async fn reads_json_and_toml_by_extension() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let json_path = dir.path().join("example.json");
        let toml_path = dir.path().join("example.toml");
        write_text_file(&json_path, r#"{"name": "json"}"#).await?;
        write_text_file(&toml_path, "name = \"toml\"\n").await?;

        let json: Example = read_json_or_toml(&json_path).await?;
        let toml: Example = read_json_or_toml(&toml_path).await?;
        assert_eq!(json.name, "json");
        assert_eq!(toml.name, "toml");
        Ok(())
    }

    #[tokio::test]
    async fn nonblank_lines_are_trimmed() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let path = dir.path().join("labels.txt");
        write_text_file(&path, "  a\tb  \n\n   \nc\td\n").await?;
        let lines = read_nonblank_lines(&path).await?;
        assert_eq!(lines, Some(vec!["a\tb".to_owned(), "c\td".to_owned()]));
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_has_no_lines() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let lines = read_nonblank_lines(&dir.path().join("missing.txt")).await?;
        assert_eq!(lines, None);
        Ok(())
    }
}
