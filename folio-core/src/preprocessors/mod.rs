//! Run Preprocessing
//!
//! This module turns the raw text runs handed over by the extraction
//! collaborator into styled line fragments that feed the classifier.
//!
//! ## Architecture
//!
//! ```text
//! RunSource (JSON dump, in-memory, ...)
//!     ↓
//! Vec<TextRun>
//!     ↓
//! [Style Resolver]        one StyledFragment per run
//!     ↓
//! [Line grouping]         contiguous runs of one visual line
//!     ↓
//! [Paragraph merging]     opt-in
//!     ↓
//! Vec<StyledFragment>  →  Fragment Classifier
//! ```

pub mod lines;
pub mod paragraphs;
pub mod run_dump;
pub mod source;
pub mod style;

pub use run_dump::{parse_run_dump, RunDumpFile};
pub use source::{InMemoryDocument, RunSource};
pub use style::{resolve, resolve_style, strip_markup, wrap};

use crate::config::ClassificationConfig;
use crate::types::{StyledFragment, TextRun};

/// Resolve styles, group runs into lines and optionally merge paragraphs
pub fn preprocess(runs: Vec<TextRun>, config: &ClassificationConfig) -> Vec<StyledFragment> {
    let styled: Vec<StyledFragment> = runs.into_iter().map(resolve).collect();
    let lines = lines::group_lines(styled, config.line_tolerance);

    if config.merge_paragraphs {
        paragraphs::merge_paragraphs(lines)
    } else {
        lines
    }
}
