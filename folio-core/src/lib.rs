// Folio Core Library
//
// Turns the styled text runs of a PDF into a structured bibliographic record.
// Main interface for classifying document fragments into record fields.

pub mod types;
pub mod errors;
pub mod text;
pub mod config;
pub mod preprocessors;
pub mod rules;
pub mod classifier;
pub mod assembler;
pub mod processor;
pub mod batch;

// Re-export main types and functions for easy use
pub use types::*;
pub use errors::{ConfigurationError, DocumentError, DocumentWarning, ExtractionError};
pub use config::ClassificationConfig;
pub use preprocessors::{InMemoryDocument, RunDumpFile, RunSource};
pub use rules::{DebugConfig, RuleSet};
pub use classifier::{classify, FragmentClassifier};
pub use assembler::{assemble, Assembly, RecordAssembler};
pub use processor::{DocumentProcessor, PipelineStages, ProcessedDocument, StepProfiler};
pub use batch::{BatchCoordinator, BatchEntry, BatchProgress, BatchResult, Table};
