//! Example datasets stored as JSON lines or a JSON array

pub mod error;

pub use error::{DatasetError, Result};

use serde_json::Value;
use std::path::Path;
use strum_macros::{Display, EnumString};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DatasetFormat {
    /// One JSON value per line
    Jsonl,
    /// A single top-level array
    Json,
    /// JSON lines first, then an array
    Auto,
}

impl DatasetFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jsonl") => Self::Jsonl,
            Some("json") => Self::Json,
            _ => Self::Auto,
        }
    }
}

/// Read a dataset file, choosing the format by extension
pub async fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(DatasetError::EmptyPath);
    }
    let text = tokio::fs::read_to_string(path).await?;
    let format = DatasetFormat::from_path(path);
    let examples = parse_dataset(&text, format)?;
    debug!(path = %path.display(), %format, count = examples.len(), "dataset loaded");
    Ok(examples)
}

pub fn parse_dataset(text: &str, format: DatasetFormat) -> Result<Vec<Value>> {
    let examples = match format {
        DatasetFormat::Jsonl => parse_lines(text)?,
        DatasetFormat::Json => parse_array(text)?,
        DatasetFormat::Auto => match parse_lines(text) {
            Ok(examples) if !examples.is_empty() => examples,
            _ => parse_array(text)?,
        },
    };
    if examples.is_empty() {
        return Err(DatasetError::Empty);
    }
    Ok(examples)
}

fn parse_lines(text: &str) -> Result<Vec<Value>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| DatasetError::InvalidLine {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

fn parse_array(text: &str) -> Result<Vec<Value>> {
    serde_json::from_str(text).map_err(DatasetError::InvalidArray)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::ErrorKind;

    #[test]
    fn test_jsonl_skips_blank_lines() {
        let text = "{\"q\": 1}\n\n   \n{\"q\": 2}\n";
        let examples = parse_dataset(text, DatasetFormat::Jsonl).unwrap();
        assert_eq!(examples, vec![json!({"q": 1}), json!({"q": 2})]);
    }

    #[test]
    fn test_jsonl_error_names_line() {
        let err = parse_dataset("{\"q\": 1}\n\n{oops", DatasetFormat::Jsonl).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidLine { line: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidDataset);
    }

    #[test]
    fn test_auto_falls_back_to_array() {
        let text = "[\n  {\"q\": 1},\n  {\"q\": 2}\n]";
        let examples = parse_dataset(text, DatasetFormat::Auto).unwrap();
        assert_eq!(examples.len(), 2);
    }

    #[test]
    fn test_empty_dataset() {
        assert!(matches!(
            parse_dataset("[]", DatasetFormat::Json),
            Err(DatasetError::Empty)
        ));
        assert!(matches!(
            parse_dataset("\n\n", DatasetFormat::Jsonl),
            Err(DatasetError::Empty)
        ));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(DatasetFormat::from_path(Path::new("a/b.JSONL")), DatasetFormat::Jsonl);
        assert_eq!(DatasetFormat::from_path(Path::new("b.json")), DatasetFormat::Json);
        assert_eq!(DatasetFormat::from_path(Path::new("b.txt")), DatasetFormat::Auto);
        assert_eq!("jsonl".parse::<DatasetFormat>().unwrap(), DatasetFormat::Jsonl);
    }

    #[tokio::test]
    async fn test_load_dataset_missing_file() {
        let err = load_dataset("/nonexistent/weft/data.jsonl").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
