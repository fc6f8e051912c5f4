// Batch coordination: many documents in, one ordered BatchResult out.
//
// Workers are scoped threads pulling indices from a shared counter; each
// outcome lands in the slot of its input index, so output order never
// depends on scheduling. Nothing is shared between workers except the
// read-only RuleSet and the progress atomics.

use crate::errors::{DocumentError, DocumentWarning};
use crate::preprocessors::RunSource;
use crate::processor::DocumentProcessor;
use crate::rules::{DebugConfig, RuleSet};
use crate::types::{Field, Record};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Default)]
struct ProgressState {
    completed: AtomicUsize,
    total: AtomicUsize,
    cancelled: AtomicBool,
}

/// Shared progress handle. Clones observe and control the same batch.
#[derive(Debug, Clone, Default)]
pub struct BatchProgress {
    state: Arc<ProgressState>,
}

impl BatchProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents finished so far, successful or not. Never decreases
    /// during a run.
    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.state.total.load(Ordering::SeqCst)
    }

    /// Ask workers to stop picking up new documents. Documents already
    /// being processed finish normally.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    fn start(&self, total: usize) {
        self.state.total.store(total, Ordering::SeqCst);
        self.state.completed.store(0, Ordering::SeqCst);
    }

    fn mark_completed(&self) {
        self.state.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Outcome for one input document
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub source_id: String,
    pub result: Result<Record, DocumentError>,
    pub warnings: Vec<DocumentWarning>,
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn record(&self) -> Option<&Record> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&DocumentError> {
        self.result.as_ref().err()
    }

    fn failed(source_id: &str, error: DocumentError) -> Self {
        Self {
            source_id: source_id.to_string(),
            result: Err(error),
            warnings: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct BatchEntryView<'a> {
    source_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "no_warnings")]
    warnings: &'a [DocumentWarning],
}

fn no_warnings(warnings: &&[DocumentWarning]) -> bool {
    warnings.is_empty()
}

impl Serialize for BatchEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BatchEntryView {
            source_id: &self.source_id,
            record: self.record(),
            error: self.error().map(|e| e.to_string()),
            warnings: &self.warnings,
        }
        .serialize(serializer)
    }
}

/// Flat tabular view: schema columns, then Source_File and Error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Ordered outcomes of a batch run, one entry per input document
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }

    /// Successful records in input order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().filter_map(BatchEntry::record)
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &DocumentError)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.error().map(|e| (entry.source_id.as_str(), e)))
    }

    pub fn to_table(&self) -> Table {
        let mut columns: Vec<String> = Field::ALL.iter().map(|f| f.column_name().to_string()).collect();
        columns.push("Source_File".to_string());
        columns.push("Error".to_string());

        let rows = self
            .entries
            .iter()
            .map(|entry| {
                let mut row: Vec<String> = match entry.record() {
                    Some(record) => record.values().map(|(_, value)| value.to_string()).collect(),
                    None => vec![String::new(); Field::ALL.len()],
                };
                row.push(entry.source_id.clone());
                row.push(entry.error().map(|e| e.to_string()).unwrap_or_default());
                row
            })
            .collect();

        Table { columns, rows }
    }
}

/// Runs documents through the pipeline on `workers` scoped threads
pub struct BatchCoordinator<'a> {
    rules: &'a RuleSet,
    workers: usize,
    progress: BatchProgress,
    debug_config: DebugConfig,
    profile: bool,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self {
            rules,
            workers: rules.config().workers.max(1),
            progress: BatchProgress::new(),
            debug_config: DebugConfig::disabled(),
            profile: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_debug_config(mut self, debug_config: DebugConfig) -> Self {
        self.debug_config = debug_config;
        self
    }

    /// Log per-step timings for every document
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profile = enabled;
        self
    }

    /// Handle for observing or cancelling the run from another thread
    pub fn progress(&self) -> BatchProgress {
        self.progress.clone()
    }

    pub fn run<D: RunSource + Sync>(&self, documents: &[D]) -> BatchResult {
        let started_at = Utc::now();
        self.progress.start(documents.len());

        let workers = self.workers.min(documents.len()).max(1);
        log::info!("🚀 Processing {} documents with {} workers", documents.len(), workers);

        let entries = if workers == 1 {
            documents.iter().map(|document| self.process_one(document)).collect()
        } else {
            self.run_parallel(documents, workers)
        };

        let result = BatchResult {
            entries,
            started_at,
            finished_at: Utc::now(),
        };
        log::info!(
            "✅ Batch finished: {} ok, {} failed",
            result.records().count(),
            result.errors().count()
        );
        result
    }

    fn run_parallel<D: RunSource + Sync>(&self, documents: &[D], workers: usize) -> Vec<BatchEntry> {
        let mut slots: Vec<Option<BatchEntry>> = Vec::with_capacity(documents.len());
        slots.resize_with(documents.len(), || None);
        let next = AtomicUsize::new(0);

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let next = &next;
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::SeqCst);
                            let Some(document) = documents.get(index) else {
                                break;
                            };
                            done.push((index, self.process_one(document)));
                        }
                        done
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(done) => {
                        for (index, entry) in done {
                            slots[index] = Some(entry);
                        }
                    }
                    Err(_) => log::error!("❌ Batch worker thread panicked"),
                }
            }
        });

        // Only reachable if a worker died outside of process_one
        slots
            .into_iter()
            .zip(documents)
            .map(|(slot, document)| {
                slot.unwrap_or_else(|| {
                    let error = DocumentError::Panicked {
                        source_id: document.source_id().to_string(),
                        message: "worker thread panicked".to_string(),
                    };
                    BatchEntry::failed(document.source_id(), error)
                })
            })
            .collect()
    }

    fn process_one<D: RunSource>(&self, document: &D) -> BatchEntry {
        let source_id = document.source_id();

        if self.progress.is_cancelled() {
            log::debug!("⏹️  Skipping {} (batch cancelled)", source_id);
            self.progress.mark_completed();
            return BatchEntry::failed(source_id, DocumentError::Cancelled(source_id.to_string()));
        }

        let processor = DocumentProcessor::new(self.rules).with_debug_config(self.debug_config.clone());
        // A panic inside one document's pipeline fails that document only
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            processor.process_with_profiling(document, self.profile)
        }));
        let entry = match outcome {
            Ok(Ok(processed)) => BatchEntry {
                source_id: source_id.to_string(),
                result: Ok(processed.record),
                warnings: processed.warnings,
            },
            Ok(Err(error)) => {
                log::warn!("❌ {}", error);
                BatchEntry::failed(source_id, error.into())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("💥 Processing {} panicked: {}", source_id, message);
                BatchEntry::failed(
                    source_id,
                    DocumentError::Panicked {
                        source_id: source_id.to_string(),
                        message,
                    },
                )
            }
        };

        self.progress.mark_completed();
        entry
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExtractionError;
    use crate::types::TextRun;

    struct FakeDocument {
        id: String,
        runs: Option<Vec<TextRun>>,
        panics: bool,
    }

    impl FakeDocument {
        fn ok(id: &str, title: &str) -> Self {
            Self {
                id: id.to_string(),
                runs: Some(vec![
                    TextRun::new(title, "Times-Italic", 2, 24.0).at(0, 50.0),
                    TextRun::new("A long description of the book.", "Times", 0, 11.0).at(0, 500.0),
                ]),
                panics: false,
            }
        }

        fn broken(id: &str) -> Self {
            Self {
                id: id.to_string(),
                runs: None,
                panics: false,
            }
        }

        fn panicking(id: &str) -> Self {
            Self {
                id: id.to_string(),
                runs: None,
                panics: true,
            }
        }
    }

    impl RunSource for FakeDocument {
        fn source_id(&self) -> &str {
            &self.id
        }

        fn load_runs(&self) -> Result<Vec<TextRun>, ExtractionError> {
            if self.panics {
                panic!("decoder crashed on {}", self.id);
            }
            self.runs
                .clone()
                .ok_or_else(|| ExtractionError::new(&self.id, "password protected"))
        }
    }

    fn corpus() -> Vec<FakeDocument> {
        vec![
            FakeDocument::ok("a.pdf", "First Book"),
            FakeDocument::broken("b.pdf"),
            FakeDocument::ok("c.pdf", "Third Book"),
        ]
    }

    #[test]
    fn failing_document_does_not_affect_others() {
        let rules = RuleSet::default();
        let result = BatchCoordinator::new(&rules).run(&corpus());

        assert_eq!(result.len(), 3);
        let ids: Vec<&str> = result.iter().map(|e| e.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.pdf", "b.pdf", "c.pdf"]);

        assert_eq!(result.entries[0].record().unwrap().title, "<i>First Book</i>");
        assert!(matches!(result.entries[1].error(), Some(DocumentError::Extraction(_))));
        assert_eq!(result.entries[2].record().unwrap().title, "<i>Third Book</i>");
        assert!(result.started_at <= result.finished_at);
    }

    fn with_panic(workers: usize) -> BatchResult {
        let rules = RuleSet::default();
        let documents = vec![
            FakeDocument::ok("a.pdf", "First Book"),
            FakeDocument::panicking("b.pdf"),
            FakeDocument::ok("c.pdf", "Third Book"),
            FakeDocument::ok("d.pdf", "Fourth Book"),
        ];
        BatchCoordinator::new(&rules).with_workers(workers).run(&documents)
    }

    fn assert_only_panicking_document_failed(result: &BatchResult) {
        assert_eq!(result.len(), 4);
        assert_eq!(result.entries[0].record().unwrap().title, "<i>First Book</i>");
        match result.entries[1].error() {
            Some(DocumentError::Panicked { source_id, message }) => {
                assert_eq!(source_id, "b.pdf");
                assert_eq!(message, "decoder crashed on b.pdf");
            }
            other => panic!("expected Panicked, got {other:?}"),
        }
        assert_eq!(result.entries[2].record().unwrap().title, "<i>Third Book</i>");
        assert_eq!(result.entries[3].record().unwrap().title, "<i>Fourth Book</i>");
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn panicking_document_is_isolated_when_sequential() {
        assert_only_panicking_document_failed(&with_panic(1));
    }

    #[test]
    fn panicking_document_is_isolated_when_parallel() {
        // Two workers: whichever takes b.pdf also processes later documents
        assert_only_panicking_document_failed(&with_panic(2));
    }

    #[test]
    fn parallel_run_preserves_input_order() {
        let rules = RuleSet::default();
        let documents: Vec<FakeDocument> = (0..20)
            .map(|i| FakeDocument::ok(&format!("doc{i}.pdf"), &format!("Book Number {i}")))
            .collect();

        let coordinator = BatchCoordinator::new(&rules).with_workers(4);
        let progress = coordinator.progress();
        let result = coordinator.run(&documents);

        assert_eq!(progress.completed(), 20);
        assert_eq!(progress.total(), 20);
        for (i, entry) in result.iter().enumerate() {
            assert_eq!(entry.source_id, format!("doc{i}.pdf"));
            assert_eq!(entry.record().unwrap().title, format!("<i>Book Number {i}</i>"));
        }
    }

    #[test]
    fn cancelled_batch_reports_unstarted_documents() {
        let rules = RuleSet::default();
        let coordinator = BatchCoordinator::new(&rules);
        coordinator.progress().cancel();
        let result = coordinator.run(&corpus());

        assert_eq!(result.len(), 3);
        assert!(result
            .iter()
            .all(|e| matches!(e.error(), Some(DocumentError::Cancelled(id)) if *id == e.source_id)));
    }

    #[test]
    fn table_has_schema_columns_and_error_column() {
        let rules = RuleSet::default();
        let table = BatchCoordinator::new(&rules).run(&corpus()).to_table();

        assert_eq!(table.columns.len(), Field::ALL.len() + 2);
        assert_eq!(table.columns[1], "中文書名");
        assert_eq!(table.columns[10], "Source_File");
        assert_eq!(table.columns[11], "Error");

        assert_eq!(table.rows[0][0], "<i>First Book</i>");
        assert_eq!(table.rows[0][11], "");
        assert_eq!(table.rows[1][10], "b.pdf");
        assert!(table.rows[1][11].contains("password protected"));
    }

    #[test]
    fn entries_serialize_record_or_error() {
        let rules = RuleSet::default();
        let result = BatchCoordinator::new(&rules).run(&corpus());
        let json = serde_json::to_value(&result).unwrap();

        let entries = json["entries"].as_array().unwrap();
        assert_eq!(entries[0]["record"]["Title"], "<i>First Book</i>");
        assert!(entries[0].get("error").is_none());
        assert!(entries[1].get("record").is_none());
        assert!(entries[1]["error"].as_str().unwrap().contains("b.pdf"));
    }
}
