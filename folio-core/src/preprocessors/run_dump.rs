//! JSON run dumps
//!
//! The extraction collaborator writes one JSON file per PDF. Two layouts are
//! accepted:
//!
//! - a flat array of runs (or `{"runs": [...]}`), one object per [`TextRun`]
//! - a PyMuPDF dump: `{"pages": [page.get_text("dict"), ...]}` with
//!   `blocks → lines → spans`
//!
//! ```text
//! { "pages": [ { "blocks": [ { "lines": [ { "spans": [
//!     { "text": "Democracy on Fire", "font": "Times-Italic",
//!       "flags": 2, "size": 24.0, "bbox": [72, 90, 400, 118] } ] } ] } ] } ] }
//! ```

use super::source::RunSource;
use crate::errors::ExtractionError;
use crate::types::{lenient_flags, TextRun};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Dump layouts, told apart by their top-level shape
#[derive(Debug)]
enum RunDump {
    Runs(Vec<TextRun>),
    PyMuPdf(Vec<PyMuPdfPage>),
}

impl RunDump {
    fn from_value(value: Value) -> Result<Self, String> {
        let layout_error = |layout: &str, e: serde_json::Error| format!("invalid {layout}: {e}");
        match value {
            Value::Array(_) => serde_json::from_value(value)
                .map(RunDump::Runs)
                .map_err(|e| layout_error("run array", e)),
            Value::Object(mut map) => {
                if let Some(runs) = map.remove("runs") {
                    serde_json::from_value(runs)
                        .map(RunDump::Runs)
                        .map_err(|e| layout_error("`runs` array", e))
                } else if let Some(pages) = map.remove("pages") {
                    serde_json::from_value(pages)
                        .map(RunDump::PyMuPdf)
                        .map_err(|e| layout_error("PyMuPDF `pages`", e))
                } else {
                    Err("expected a run array, `runs` or `pages`".to_string())
                }
            }
            _ => Err("expected a run array, `runs` or `pages`".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PyMuPdfPage {
    #[serde(default)]
    number: Option<u32>,
    #[serde(default)]
    blocks: Vec<PyMuPdfBlock>,
}

#[derive(Debug, Deserialize)]
struct PyMuPdfBlock {
    // Image blocks carry no lines
    #[serde(default)]
    lines: Vec<PyMuPdfLine>,
}

#[derive(Debug, Deserialize)]
struct PyMuPdfLine {
    #[serde(default)]
    spans: Vec<PyMuPdfSpan>,
}

#[derive(Debug, Deserialize)]
struct PyMuPdfSpan {
    text: String,
    #[serde(default)]
    font: String,
    #[serde(default, deserialize_with = "lenient_flags")]
    flags: i64,
    #[serde(default)]
    size: f32,
    #[serde(default)]
    bbox: [f32; 4],
}

/// Parse a dump into runs in reading order
pub fn parse_run_dump(source_id: &str, json: &str) -> Result<Vec<TextRun>, ExtractionError> {
    let malformed = |message: String| ExtractionError::new(source_id, format!("malformed run dump: {message}"));
    let value: Value = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
    let dump = RunDump::from_value(value).map_err(malformed)?;

    let runs = match dump {
        RunDump::Runs(runs) => runs,
        RunDump::PyMuPdf(pages) => pages
            .into_iter()
            .enumerate()
            .flat_map(|(index, page)| {
                let page_index = page.number.unwrap_or(index as u32);
                page.blocks
                    .into_iter()
                    .flat_map(|block| block.lines)
                    .flat_map(|line| line.spans)
                    .map(move |span| TextRun {
                        text: span.text,
                        font_name: span.font,
                        flags: span.flags,
                        font_size: span.size,
                        page: page_index,
                        y: span.bbox[1],
                        x: span.bbox[0],
                    })
            })
            .collect(),
    };

    Ok(runs)
}

/// A run dump stored on disk
#[derive(Debug, Clone)]
pub struct RunDumpFile {
    path: PathBuf,
    source_id: String,
}

impl RunDumpFile {
    /// Source id is the file name without its `.json` suffix, so
    /// `book.pdf.json` reports as `book.pdf`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown");
        let source_id = file_name.strip_suffix(".json").unwrap_or(file_name).to_string();
        Self { path, source_id }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn supports_file_type(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }

    /// All dumps in a directory, sorted by file name
    pub fn discover(dir: &Path) -> std::io::Result<Vec<RunDumpFile>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && Self::supports_file_type(path))
            .collect();
        paths.sort();
        Ok(paths.into_iter().map(RunDumpFile::new).collect())
    }
}

impl RunSource for RunDumpFile {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn load_runs(&self) -> Result<Vec<TextRun>, ExtractionError> {
        let json = fs::read_to_string(&self.path).map_err(|e| {
            ExtractionError::new(&self.source_id, format!("cannot read {}: {e}", self.path.display()))
        })?;
        parse_run_dump(&self.source_id, &json)
    }
}
