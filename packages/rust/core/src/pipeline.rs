//! End-to-end `run` pipeline: catalog → topics → batches → lessons → index.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use lessonforge_catalog::{check_unique_filenames, extract_file, partition};
use lessonforge_markdown::ContentRenderer;
use lessonforge_shared::{
    Batch, GenerateConfig, GenerationResult, IndexConfig, ModuleTable, NavigationIndex, Result,
};

use crate::index::{IndexBuilder, write_index};
use crate::orchestrator::{GenerationOrchestrator, GenerationSummary, sources_from_batches};
use crate::store::OutputStore;

/// Run summary written next to the lessons.
pub const SUMMARY_FILE: &str = "generation_summary.json";

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each batch is joined, in batch order.
    fn batch_finished(&self, result: &GenerationResult, done: usize, total: usize);
    /// Called once generation has been aggregated.
    fn generation_done(&self, summary: &GenerationSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_finished(&self, _result: &GenerationResult, _done: usize, _total: usize) {}
    fn generation_done(&self, _summary: &GenerationSummary) {}
}

/// Result of the full pipeline.
#[derive(Debug)]
pub struct PipelineResult {
    /// Topics extracted from the catalog.
    pub records: usize,
    pub summary: GenerationSummary,
    pub index: NavigationIndex,
    pub index_path: PathBuf,
    pub elapsed: std::time::Duration,
}

/// Extract a catalog, refuse filename collisions, and partition it.
#[instrument(skip_all, fields(catalog = %catalog.display(), batch_count))]
pub fn plan_batches(catalog: &Path, batch_count: usize, date_stamp: &str) -> Result<Vec<Batch>> {
    let records = extract_file(catalog, date_stamp)?;
    check_unique_filenames(&records)?;
    let total = records.len();
    let batches = partition(records, batch_count)?;
    info!(topics = total, batches = batches.len(), "catalog planned");
    Ok(batches)
}

/// Run everything in one process with in-memory batches.
#[instrument(skip_all, fields(catalog = %catalog.display()))]
pub async fn run_pipeline(
    catalog: &Path,
    generate: &GenerateConfig,
    index_config: &IndexConfig,
    table: Arc<ModuleTable>,
    renderer: Arc<dyn ContentRenderer>,
    progress: &dyn ProgressReporter,
) -> Result<PipelineResult> {
    let start = Instant::now();
    generate.validate()?;

    // --- Phase 1: Extract + partition ---
    progress.phase("Extracting topics");
    let batches = plan_batches(catalog, generate.batch_count, &generate.date_stamp)?;
    let records = batches.iter().map(Batch::len).sum();

    // --- Phase 2: Generate ---
    progress.phase("Generating lessons");
    let store = OutputStore::open(&generate.output_dir)?;
    let orchestrator =
        GenerationOrchestrator::new(store.clone(), renderer, table.clone(), generate.workers);
    let summary = orchestrator
        .run(sources_from_batches(batches), progress)
        .await?;
    store.write_json_atomic(SUMMARY_FILE, &summary)?;
    progress.generation_done(&summary);

    // --- Phase 3: Index ---
    progress.phase("Building navigation index");
    let index = IndexBuilder::new(index_config, table).build(&store).await?;
    write_index(&index_config.index_file, &index)?;

    let result = PipelineResult {
        records,
        summary,
        index,
        index_path: index_config.index_file.clone(),
        elapsed: start.elapsed(),
    };

    info!(
        records = result.records,
        succeeded = result.summary.total_succeeded,
        errors = result.summary.total_errors,
        lessons_indexed = result.index.lesson_count(),
        elapsed_ms = result.elapsed.as_millis(),
        "pipeline complete"
    );

    Ok(result)
}
