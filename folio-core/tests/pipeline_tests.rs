//! Pipeline boundary tests: run dumps in, records out.
//!
//! These tests load run dumps from `test_fixtures/runs/` (flat run arrays
//! and PyMuPDF page dumps) and assert the records at the end of the
//! pipeline, plus the batch-level guarantees:
//!
//! - Boundary 1 (run dumps): both dump layouts parse into ordered runs
//! - Boundary 2 (records): field values, markup and keyword stripping
//! - Batch: input order, error isolation, warnings
//!
//! Classification internals are covered by the unit tests next to the code.

use folio_core::{
    BatchCoordinator, ClassificationConfig, ConfigurationError, DocumentError, DocumentProcessor,
    DocumentWarning, Field, RunDumpFile, RunSource, RuleSet, TextRun,
};
use std::path::PathBuf;

// ============================================================================
// Fixture helpers
// ============================================================================

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_fixtures")
}

fn run_dump(name: &str) -> RunDumpFile {
    RunDumpFile::new(fixtures_dir().join("runs").join(name))
}

fn config_fixture(name: &str) -> PathBuf {
    fixtures_dir().join("configs").join(name)
}

// ============================================================================
// Boundary 1: run dumps
// ============================================================================

mod run_dump_boundary {
    use super::*;

    #[test]
    fn flat_dump_loads_every_run() {
        let runs = run_dump("democracy_on_fire.pdf.json").load_runs().unwrap();
        assert_eq!(runs.len(), 14);
        assert_eq!(runs[0].text, "Democracy");
        assert_eq!(runs[13].page, 1);
    }

    #[test]
    fn pymupdf_dump_flattens_spans() {
        let runs = run_dump("chinese_novel.pdf.json").load_runs().unwrap();
        assert_eq!(runs.len(), 6);
        assert_eq!(runs[0].text, "長夜將盡");
        assert_eq!(runs[0].flags, 16);
        assert_eq!(runs[2].y, 230.0);
        assert_eq!(runs[3].x, 136.0);
    }

    #[test]
    fn source_id_drops_json_suffix() {
        assert_eq!(run_dump("democracy_on_fire.pdf.json").source_id(), "democracy_on_fire.pdf");
    }

    /// Float, null and string flags degrade to "no style" instead of failing
    #[test]
    fn unreadable_flags_keep_the_document() {
        let runs = run_dump("loose_flags.pdf.json").load_runs().unwrap();
        let flags: Vec<i64> = runs.iter().map(|r| r.flags).collect();
        assert_eq!(flags, vec![2, 0, 0]);
    }

    #[test]
    fn malformed_dump_is_an_extraction_error() {
        let err = run_dump("broken.pdf.json").load_runs().unwrap_err();
        assert_eq!(err.source_id, "broken.pdf");
        assert!(err.message.contains("malformed run dump"));
    }
}

// ============================================================================
// Boundary 2: records
// ============================================================================

mod record_boundary {
    use super::*;

    #[test]
    fn english_cover_page_fills_every_field() {
        let rules = RuleSet::default();
        let processed = DocumentProcessor::new(&rules)
            .process(&run_dump("democracy_on_fire.pdf.json"))
            .unwrap();
        let record = processed.record;

        assert_eq!(record.title, "<i>Democracy on Fire</i>");
        assert_eq!(record.translated_title, "民主星火：1977 衝破戒嚴的枷鎖");
        assert_eq!(record.category, "Literary Fiction");
        assert_eq!(record.author, "Lin Yi-Han");
        assert_eq!(record.illustrator, "Ruan Guang-Min");
        assert_eq!(
            record.detail,
            "In 1977, Taiwan was under martial law. <i>As a spy, he met a promising young man named Ah Yu.</i>"
        );
        assert_eq!(record.rights_sold, "Japan, Korea");
        assert_eq!(record.more_info, "Published by Mirror Fiction, 2020 Pages: 320");
        assert_eq!(record.tags, "history, politics");
        assert_eq!(record.source_file, "democracy_on_fire.pdf");
        assert!(processed.warnings.is_empty());
    }

    /// Keyword prefixes are stripped from contributor names
    #[test]
    fn translator_prefix_is_stripped() {
        let rules = RuleSet::default();
        let record = DocumentProcessor::new(&rules)
            .process(&run_dump("democracy_on_fire.pdf.json"))
            .unwrap()
            .record;
        assert_eq!(record.translator, "Chen-Yu Chang");
    }

    #[test]
    fn chinese_cover_page_from_pymupdf_dump() {
        let rules = RuleSet::default();
        let record = DocumentProcessor::new(&rules)
            .process(&run_dump("chinese_novel.pdf.json"))
            .unwrap()
            .record;

        assert_eq!(record.title, "");
        assert_eq!(record.translated_title, "<b>長夜將盡</b>");
        assert_eq!(record.author, "吳明益");
        assert_eq!(record.translator, "張三");
        assert_eq!(record.detail, "一部關於戰後台灣的長篇小說，描寫三代人的命運。");
        assert_eq!(record.more_info, "ISBN 978-986-1234-56-7");
        // No category line; inferred from the description
        assert_eq!(record.category, "小說類");
    }

    #[test]
    fn title_containing_contributor_words() {
        let rules = RuleSet::default();
        let record = DocumentProcessor::new(&rules)
            .process(&run_dump("loose_flags.pdf.json"))
            .unwrap()
            .record;

        assert_eq!(record.title, "<i>Stand by Me Forever</i>");
        assert_eq!(record.detail, "The story of two brothers who never left home.");
        assert_eq!(record.author, "Ann Lee");
    }

    #[test]
    fn possessive_author_in_title_is_still_a_title() {
        let rules = RuleSet::default();
        let runs = vec![
            TextRun::new("The Author's Wife", "Times-Italic", 2, 24.0).at(0, 72.0),
            TextRun::new("Some long descriptive text about the book.", "Times-Roman", 0, 11.0).at(0, 600.0),
        ];
        let record = DocumentProcessor::new(&rules).process_runs("wife.pdf", runs).record;
        assert_eq!(record.title, "<i>The Author's Wife</i>");
        assert_eq!(record.author, "");
    }

    /// A small imprint line above the cover title does not take the Title
    #[test]
    fn largest_cover_line_is_the_title() {
        let rules = RuleSet::default();
        let runs = vec![
            TextRun::new("A Mirror Fiction Original", "Times-Roman", 0, 9.0).at(0, 40.0),
            TextRun::new("Democracy on Fire", "Times-Bold", 16, 28.0).at(0, 72.0),
            TextRun::new("Some long descriptive text about the book.", "Times-Roman", 0, 11.0).at(0, 600.0),
        ];
        let processed = DocumentProcessor::new(&rules).process_runs("cover.pdf", runs);
        assert_eq!(processed.record.title, "<b>Democracy on Fire</b>");
        assert_eq!(
            processed.warnings,
            vec![DocumentWarning::DiscardedFragment {
                field: Field::Title,
                preview: "A Mirror Fiction Original".to_string(),
            }]
        );
    }

    #[test]
    fn blank_document_yields_empty_record_with_warning() {
        let rules = RuleSet::default();
        let processed = DocumentProcessor::new(&rules)
            .process(&run_dump("blank.pdf.json"))
            .unwrap();
        assert!(processed.record.is_empty());
        assert_eq!(processed.record.source_file, "blank.pdf");
        assert_eq!(processed.warnings, vec![DocumentWarning::EmptyDocument]);
    }

    #[test]
    fn record_json_uses_column_names() {
        let rules = RuleSet::default();
        let record = DocumentProcessor::new(&rules)
            .process(&run_dump("democracy_on_fire.pdf.json"))
            .unwrap()
            .record;
        let json = serde_json::to_value(&record).unwrap();

        for field in Field::ALL {
            assert!(json.get(field.column_name()).is_some(), "missing column {field}");
        }
        assert_eq!(json["Rights Sold"], "Japan, Korea");
        assert_eq!(json["Source_File"], "democracy_on_fire.pdf");
    }

    #[test]
    fn stage_capture_agrees_with_processing() {
        let rules = RuleSet::default();
        let processor = DocumentProcessor::new(&rules);
        let document = run_dump("democracy_on_fire.pdf.json");

        let stages = processor.capture_stages(&document).unwrap();
        assert_eq!(stages.runs.len(), 14);
        // The two title spans share a line
        assert_eq!(stages.fragments.len(), 13);
        assert_eq!(stages.classified.iter().filter(|c| !c.is_classified()).count(), 1);
        assert_eq!(stages.record, processor.process(&document).unwrap().record);
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration {
    use super::*;

    #[test]
    fn configured_field_replaces_built_in_rules() {
        let config = ClassificationConfig::load_from_file(&config_fixture("custom_translator.yaml")).unwrap();
        assert_eq!(config.title_top_fraction, 0.25);

        let rules = RuleSet::load(&config).unwrap();
        let record = DocumentProcessor::new(&rules)
            .process(&run_dump("democracy_on_fire.pdf.json"))
            .unwrap()
            .record;

        // The built-in "translated by" rule is gone; the line is long enough for Detail
        assert_eq!(record.translator, "");
        assert!(record.detail.starts_with("translated by Chen-Yu Chang"));
        // Fields the file does not name keep their defaults
        assert_eq!(record.author, "Lin Yi-Han");
    }

    #[test]
    fn json_config_merges_wrapped_synopsis() {
        let config = ClassificationConfig::load_from_file(&config_fixture("merged_paragraphs.json")).unwrap();
        assert!(config.merge_paragraphs);
        assert_eq!(config.rules_for(Field::Tags).len(), 1);

        let rules = RuleSet::load(&config).unwrap();
        let record = DocumentProcessor::new(&rules)
            .process(&run_dump("wrapped_synopsis.pdf.json"))
            .unwrap()
            .record;

        assert_eq!(record.title, "<b>Night Train to Tainan</b>");
        assert_eq!(record.author, "Lin Yi-Han");
        assert_eq!(
            record.detail,
            "<i>In 1977, Ah Wen had been on the other side of history: recruited as a spy. \
             His assignment was to infiltrate the campaign headquarters of an independent candidate.</i>"
        );
        assert_eq!(record.tags, "trains, history");
    }

    #[test]
    fn without_merging_wrapped_lines_stay_apart() {
        let rules = RuleSet::default();
        let record = DocumentProcessor::new(&rules)
            .process(&run_dump("wrapped_synopsis.pdf.json"))
            .unwrap()
            .record;

        assert!(record.detail.contains("headquar-</i> <i>ters"));
        // "Themes:" is not a built-in Tags label
        assert_eq!(record.tags, "");
        assert!(record.detail.ends_with("Themes: trains, history"));
    }

    #[test]
    fn invalid_pattern_rejects_configuration() {
        let config = ClassificationConfig::load_from_file(&config_fixture("invalid_pattern.yaml")).unwrap();
        match RuleSet::load(&config) {
            Err(ConfigurationError::InvalidPattern { field, pattern, .. }) => {
                assert_eq!(field, Field::Tags);
                assert!(pattern.starts_with("(?i)^tags:"));
            }
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

mod batch {
    use super::*;

    #[test]
    fn directory_batch_keeps_order_and_isolates_failures() {
        let documents = RunDumpFile::discover(&fixtures_dir().join("runs")).unwrap();
        let rules = RuleSet::default();
        let result = BatchCoordinator::new(&rules).with_workers(3).run(&documents);

        let ids: Vec<&str> = result.iter().map(|e| e.source_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "blank.pdf",
                "broken.pdf",
                "chinese_novel.pdf",
                "democracy_on_fire.pdf",
                "loose_flags.pdf",
                "wrapped_synopsis.pdf",
            ]
        );

        assert!(result.entries[0].is_ok());
        assert_eq!(result.entries[0].warnings, vec![DocumentWarning::EmptyDocument]);
        assert!(matches!(result.entries[1].error(), Some(DocumentError::Extraction(_))));
        assert_eq!(result.entries[2].record().unwrap().author, "吳明益");
        assert_eq!(result.entries[3].record().unwrap().translator, "Chen-Yu Chang");
        assert_eq!(result.entries[4].record().unwrap().author, "Ann Lee");
        assert_eq!(result.entries[5].record().unwrap().title, "<b>Night Train to Tainan</b>");

        assert_eq!(result.records().count(), 5);
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn sequential_and_parallel_runs_agree() {
        let documents = RunDumpFile::discover(&fixtures_dir().join("runs")).unwrap();
        let rules = RuleSet::default();

        let sequential = BatchCoordinator::new(&rules).with_workers(1).run(&documents);
        let parallel = BatchCoordinator::new(&rules).with_workers(4).run(&documents);
        assert_eq!(sequential.entries, parallel.entries);
    }

    #[test]
    fn table_output_has_one_row_per_document() {
        let documents = RunDumpFile::discover(&fixtures_dir().join("runs")).unwrap();
        let rules = RuleSet::default();
        let table = BatchCoordinator::new(&rules).run(&documents).to_table();

        assert_eq!(table.rows.len(), 6);
        assert_eq!(table.columns.last().map(String::as_str), Some("Error"));
        assert_eq!(table.rows[3][0], "<i>Democracy on Fire</i>");
        assert!(!table.rows[1][11].is_empty());
    }
}
