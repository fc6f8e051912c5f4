use crate::assembler::RecordAssembler;
use crate::classifier::FragmentClassifier;
use crate::errors::{DocumentWarning, ExtractionError};
use crate::preprocessors::{self, RunSource};
use crate::rules::{debug_classified_fragments, DebugConfig, RuleSet};
use crate::types::*;
use std::time::{Duration, Instant};

/// Captured intermediate outputs from each pipeline stage
/// Used for testing and diagnostics; lets you inspect/compare each boundary
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStages {
    pub source_id: String,
    pub runs: Vec<TextRun>,
    pub fragments: Vec<StyledFragment>,
    pub classified: Vec<ClassifiedFragment>,
    pub record: Record,
    pub warnings: Vec<DocumentWarning>,
}

/// Record plus warnings for one successfully processed document
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProcessedDocument {
    pub record: Record,
    pub warnings: Vec<DocumentWarning>,
}

/// Simple profiler that collects timings for pipeline steps
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        self.timings.push((step_name.to_string(), elapsed));
        log::info!("⏱️  {}: {:.0}ms", step_name, elapsed.as_millis());

        result
    }

    pub fn timings(&self) -> &[(String, Duration)] {
        &self.timings
    }

    pub fn print_summary(&self) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        log::info!("📊 Performance Summary:");
        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();

        for (step, duration) in &self.timings {
            let percentage = if total.is_zero() {
                0.0
            } else {
                (duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            };
            log::info!("   {:.<35} {:.0}ms ({:.1}%)", step, duration.as_millis(), percentage);
        }
        log::info!("   {:.<35} {:.0}ms", "Total", total.as_millis());
    }
}

/// Runs one document through the pipeline:
/// runs → styled fragments → classified fragments → record.
///
/// Holds only a shared reference to the rule set, so one processor per
/// worker thread is cheap.
pub struct DocumentProcessor<'a> {
    rules: &'a RuleSet,
    debug_config: DebugConfig,
}

impl<'a> DocumentProcessor<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self {
            rules,
            debug_config: DebugConfig::disabled(),
        }
    }

    pub fn with_debug_config(mut self, debug_config: DebugConfig) -> Self {
        self.debug_config = debug_config;
        self
    }

    /// Process runs that are already in hand
    pub fn process_runs(&self, source_id: &str, runs: Vec<TextRun>) -> ProcessedDocument {
        self.process_runs_with_profiler(source_id, runs, &mut StepProfiler::new(false))
    }

    pub fn process_runs_with_profiler(
        &self,
        source_id: &str,
        runs: Vec<TextRun>,
        profiler: &mut StepProfiler,
    ) -> ProcessedDocument {
        let run_count = runs.len();
        let fragments = profiler.time_step("1. Runs → Fragments", || {
            preprocessors::preprocess(runs, self.rules.config())
        });
        log::debug!("📄 {}: {} runs grouped into {} fragments", source_id, run_count, fragments.len());

        let classified = profiler.time_step("2. Classification", || {
            FragmentClassifier::new(self.rules).classify_document(fragments)
        });
        debug_classified_fragments("classification", &classified, &self.debug_config);

        let assembly = profiler.time_step("3. Record Assembly", || {
            RecordAssembler::new(self.rules).assemble_with_warnings(&classified, source_id)
        });

        ProcessedDocument {
            record: assembly.record,
            warnings: assembly.warnings,
        }
    }

    /// Load runs from a source and process them
    pub fn process(&self, source: &dyn RunSource) -> Result<ProcessedDocument, ExtractionError> {
        self.process_with_profiling(source, false)
    }

    pub fn process_with_profiling(
        &self,
        source: &dyn RunSource,
        enable_profiling: bool,
    ) -> Result<ProcessedDocument, ExtractionError> {
        let start_time = Instant::now();
        let mut profiler = StepProfiler::new(enable_profiling);

        let runs = profiler.time_step("0. Load Runs", || source.load_runs())?;
        let processed = self.process_runs_with_profiler(source.source_id(), runs, &mut profiler);

        profiler.print_summary();
        log::info!(
            "✅ {} processed in {:.0}ms ({} warnings)",
            source.source_id(),
            start_time.elapsed().as_millis(),
            processed.warnings.len()
        );
        Ok(processed)
    }

    /// Process a document and capture all intermediate stage outputs
    pub fn capture_stages(&self, source: &dyn RunSource) -> Result<PipelineStages, ExtractionError> {
        let source_id = source.source_id().to_string();

        let runs = source.load_runs()?;
        log::info!("📋 Stage 1: {} runs captured", runs.len());

        let fragments = preprocessors::preprocess(runs.clone(), self.rules.config());
        log::info!("📋 Stage 2: {} fragments captured", fragments.len());

        let classified = FragmentClassifier::new(self.rules).classify_document(fragments.clone());
        debug_classified_fragments("classification", &classified, &self.debug_config);
        log::info!(
            "📋 Stage 3: {} classified fragments captured ({} unclassified)",
            classified.len(),
            classified.iter().filter(|c| !c.is_classified()).count()
        );

        let assembly = RecordAssembler::new(self.rules).assemble_with_warnings(&classified, &source_id);
        log::info!("📋 Stage 4: record captured ({} warnings)", assembly.warnings.len());

        Ok(PipelineStages {
            source_id,
            runs,
            fragments,
            classified,
            record: assembly.record,
            warnings: assembly.warnings,
        })
    }
}
