// Run source abstraction
//
// This is the boundary between the external extraction collaborator
// (PDF -> TextRuns) and the classification engine (TextRuns -> Record).
// The engine never opens PDFs itself; whatever produces the runs sits
// behind this trait.

use crate::errors::ExtractionError;
use crate::types::TextRun;

/// A document that can hand over its ordered text runs
pub trait RunSource {
    /// Identifier carried into the record's Source_File column and into
    /// error entries
    fn source_id(&self) -> &str;

    /// Produce the document's runs in reading order
    fn load_runs(&self) -> Result<Vec<TextRun>, ExtractionError>;
}

/// Runs that are already in memory
#[derive(Debug, Clone)]
pub struct InMemoryDocument {
    source_id: String,
    runs: Vec<TextRun>,
}

impl InMemoryDocument {
    pub fn new(source_id: impl Into<String>, runs: Vec<TextRun>) -> Self {
        Self {
            source_id: source_id.into(),
            runs,
        }
    }
}

impl RunSource for InMemoryDocument {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn load_runs(&self) -> Result<Vec<TextRun>, ExtractionError> {
        Ok(self.runs.clone())
    }
}
