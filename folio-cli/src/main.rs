use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

// Import from folio-core
use folio_core::{
    BatchCoordinator, BatchResult, ClassificationConfig, DebugConfig, DocumentProcessor, PipelineStages,
    RunDumpFile, RunSource, RuleSet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One entry per document: record or error, plus warnings
    Records,
    /// Columns + rows, one row per document
    Table,
}

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Extract bibliographic records from styled PDF text runs")]
struct Args {
    /// Run dump (.json) to process, or a directory of run dumps
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path to custom classification config (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file path (if not specified, auto-generated based on input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "records")]
    output_format: OutputFormat,

    /// Documents processed in parallel (overrides the config's `workers`)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    show_configs: bool,

    /// Dump all intermediate pipeline stage outputs to a directory
    /// Captures: runs, styled fragments, classified fragments and the record
    #[arg(long)]
    dump_stages: bool,

    /// Directory for stage dump output
    #[arg(long, default_value = "test_outputs/stages")]
    stages_dir: PathBuf,

    /// Enable detailed profiling of all pipeline steps
    #[arg(long)]
    profile: bool,

    /// Trace classification of fragments matching this pattern (repeatable)
    #[arg(long = "trace", value_name = "PATTERN")]
    trace: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    println!("📚 Folio Bibliographic Extractor");

    // A missing config file falls back to defaults; a broken one is fatal
    let mut config = ClassificationConfig::load_or_default(args.config.as_deref())?;
    match &args.config {
        Some(path) if path.exists() => println!("📋 Loaded config from: {}", path.display()),
        _ => println!("📋 Using default config"),
    }

    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    if args.show_configs {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let rules = RuleSet::load(&config).context("invalid classification config")?;
    log::debug!(
        "Effective config: title_top_fraction={}, chinese_density_threshold={}, workers={}, merge_paragraphs={}",
        config.title_top_fraction,
        config.chinese_density_threshold,
        config.workers,
        config.merge_paragraphs
    );

    let Some(input) = args.input.as_deref() else {
        bail!("no input given; pass --input <run dump or directory>");
    };
    let documents = collect_documents(input)?;
    println!("📄 Found {} document(s) in {}", documents.len(), input.display());

    let debug_config = DebugConfig::new(!args.trace.is_empty(), args.trace.clone());

    // Stage dump mode: capture and save all intermediates
    if args.dump_stages {
        println!("\n🔬 Pipeline stage dump mode");
        let processor = DocumentProcessor::new(&rules).with_debug_config(debug_config);
        for document in &documents {
            let stages = processor
                .capture_stages(document)
                .with_context(|| format!("stage dump failed for {}", document.source_id()))?;
            save_stages(&stages, &args.stages_dir.join(document.source_id()))?;
        }
        println!("\n✅ All stages dumped to: {}", args.stages_dir.display());
        return Ok(());
    }

    let coordinator = BatchCoordinator::new(&rules)
        .with_debug_config(debug_config)
        .with_profiling(args.profile);
    let result = coordinator.run(&documents);

    println!("✅ Processed {} document(s)", result.len());
    println!("📊 Batch summary:");
    println!("   - Records: {}", result.records().count());
    println!("   - Errors: {}", result.errors().count());
    for (source_id, error) in result.errors() {
        println!("   ❌ {}: {}", source_id, error);
    }
    for entry in result.iter().filter(|e| !e.warnings.is_empty()) {
        for warning in &entry.warnings {
            println!("   ⚠️  {}: {}", entry.source_id, warning);
        }
    }

    let output_path = args.output.clone().unwrap_or_else(|| default_output_path(input));
    save_result(&result, &output_path, args.output_format)?;

    Ok(())
}

fn collect_documents(input: &Path) -> Result<Vec<RunDumpFile>> {
    if input.is_dir() {
        let documents = RunDumpFile::discover(input)
            .with_context(|| format!("failed to list run dumps in {}", input.display()))?;
        if documents.is_empty() {
            bail!("no .json run dumps found in {}", input.display());
        }
        Ok(documents)
    } else if input.exists() {
        Ok(vec![RunDumpFile::new(input)])
    } else {
        bail!("input not found: {}", input.display())
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    if input.is_dir() {
        return PathBuf::from("folio_records.json");
    }
    let input_name = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    PathBuf::from(format!("{input_name}_folio.json"))
}

fn save_result(result: &BatchResult, output_path: &Path, format: OutputFormat) -> Result<()> {
    let json = match format {
        OutputFormat::Records => serde_json::to_string_pretty(result)?,
        OutputFormat::Table => serde_json::to_string_pretty(&result.to_table())?,
    };
    fs::write(output_path, json).with_context(|| format!("failed to write {}", output_path.display()))?;

    match format {
        OutputFormat::Records => println!("💾 Records saved to: {}", output_path.display()),
        OutputFormat::Table => println!("💾 Table saved to: {}", output_path.display()),
    }
    Ok(())
}

fn save_stages(stages: &PipelineStages, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)?;

    // Stage 1: Raw runs
    let runs_path = output_dir.join("stage1_runs.json");
    fs::write(&runs_path, serde_json::to_string_pretty(&stages.runs)?)?;
    println!("  💾 {} ({} runs)", runs_path.display(), stages.runs.len());

    // Stage 2: Styled fragments
    let fragments_path = output_dir.join("stage2_fragments.json");
    fs::write(&fragments_path, serde_json::to_string_pretty(&stages.fragments)?)?;
    println!("  💾 {} ({} fragments)", fragments_path.display(), stages.fragments.len());

    // Stage 3: Classified fragments
    let classified_path = output_dir.join("stage3_classified.json");
    fs::write(&classified_path, serde_json::to_string_pretty(&stages.classified)?)?;
    println!("  💾 {} ({} fragments)", classified_path.display(), stages.classified.len());

    // Stage 4: Record
    let record_path = output_dir.join("stage4_record.json");
    fs::write(&record_path, serde_json::to_string_pretty(&stages.record)?)?;
    println!("  💾 {}", record_path.display());

    // Summary file: quick reference for validation scripts
    let summary = serde_json::json!({
        "source_id": stages.source_id,
        "captured_at": chrono::Utc::now().to_rfc3339(),
        "stage_counts": {
            "runs": stages.runs.len(),
            "fragments": stages.fragments.len(),
            "classified": stages.classified.iter().filter(|c| c.is_classified()).count(),
            "unclassified": stages.classified.iter().filter(|c| !c.is_classified()).count(),
        },
        "warnings": stages.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
    });
    let summary_path = output_dir.join("summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    println!("  💾 {}", summary_path.display());

    Ok(())
}
