//! Concurrent lesson generation.
//!
//! One worker per batch, at most `workers` running at once. A worker walks
//! its batch in order on a blocking thread, rendering and writing each record.
//! Per-record failures become labelled error strings and the worker moves on;
//! each worker hands back its own [`GenerationResult`] and the orchestrator
//! combines them only after every handle has been joined.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use lessonforge_catalog::{batch_id_from_path, list_batch_files, parse_batch_line};
use lessonforge_markdown::{ContentRenderer, count_words};
use lessonforge_shared::{
    Batch, GeneratedDocument, GenerationResult, LessonForgeError, ModuleTable, Result,
    TopicRecord,
};

use crate::pipeline::ProgressReporter;
use crate::store::OutputStore;

/// Module id given to documents whose filename matches no table prefix.
pub const UNMAPPED_MODULE_ID: &str = "unmapped";

// ---------------------------------------------------------------------------
// Batch sources
// ---------------------------------------------------------------------------

/// Where a worker gets its records from.
#[derive(Debug, Clone)]
pub enum BatchSource {
    /// Records already in memory.
    Records(Batch),
    /// A `batch_NN.txt` file, read when the run starts.
    File { id: usize, path: PathBuf },
}

impl BatchSource {
    pub fn id(&self) -> usize {
        match self {
            Self::Records(batch) => batch.id,
            Self::File { id, .. } => *id,
        }
    }
}

/// Wrap in-memory batches.
pub fn sources_from_batches(batches: Vec<Batch>) -> Vec<BatchSource> {
    batches.into_iter().map(BatchSource::Records).collect()
}

/// Every `batch_NN.txt` in `dir`, in file-name order.
pub fn sources_from_dir(dir: &Path) -> Result<Vec<BatchSource>> {
    Ok(list_batch_files(dir)?
        .into_iter()
        .filter_map(|path| batch_id_from_path(&path).map(|id| BatchSource::File { id, path }))
        .collect())
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// How a generation run ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No records were attempted.
    NoWork,
    /// Records were attempted and none succeeded.
    Failed,
    /// Some records succeeded and some failed.
    CompletedWithErrors { succeeded: usize, errors: usize },
    /// Everything succeeded.
    Completed { succeeded: usize },
}

impl RunOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed { .. } => 0,
            Self::Failed => 1,
            Self::NoWork => 2,
            Self::CompletedWithErrors { .. } => 3,
        }
    }
}

/// Aggregate of every batch in a run. A report, not state.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub batches: Vec<GenerationResult>,
    pub total_succeeded: usize,
    pub total_errors: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub error_log: Option<PathBuf>,
}

impl GenerationSummary {
    fn from_results(mut batches: Vec<GenerationResult>, duration: Duration) -> Self {
        batches.sort_by_key(|r| r.batch_id);
        let total_succeeded = batches.iter().map(|r| r.success_count).sum();
        let total_errors = batches.iter().map(|r| r.errors.len()).sum();
        Self {
            batches,
            total_succeeded,
            total_errors,
            duration,
            error_log: None,
        }
    }

    pub fn attempted(&self) -> usize {
        self.total_succeeded + self.total_errors
    }

    /// Every recorded error, in batch order.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.batches
            .iter()
            .flat_map(|b| b.errors.iter().map(String::as_str))
    }

    pub fn outcome(&self) -> RunOutcome {
        match (self.total_succeeded, self.total_errors) {
            (0, 0) => RunOutcome::NoWork,
            (0, _) => RunOutcome::Failed,
            (succeeded, 0) => RunOutcome::Completed { succeeded },
            (succeeded, errors) => RunOutcome::CompletedWithErrors { succeeded, errors },
        }
    }

    /// Successful documents per second of wall time.
    pub fn documents_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_succeeded as f64 / secs
        } else {
            0.0
        }
    }
}

fn serialize_secs<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs batches concurrently against one output store.
pub struct GenerationOrchestrator {
    store: OutputStore,
    renderer: Arc<dyn ContentRenderer>,
    table: Arc<ModuleTable>,
    workers: usize,
}

impl GenerationOrchestrator {
    pub fn new(
        store: OutputStore,
        renderer: Arc<dyn ContentRenderer>,
        table: Arc<ModuleTable>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            renderer,
            table,
            workers: workers.max(1),
        }
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// Run every batch to completion and aggregate the results.
    ///
    /// Batch files are read up front so filenames can be claimed across the
    /// whole run: the first record (by batch id, then line) to derive a
    /// filename owns it and later ones are recorded as collisions.
    ///
    /// Only store-level failures (the error log cannot be touched) surface as
    /// `Err`; everything below that is recorded in the summary.
    #[instrument(skip_all, fields(batches = sources.len(), workers = self.workers))]
    pub async fn run(
        &self,
        sources: Vec<BatchSource>,
        progress: &dyn ProgressReporter,
    ) -> Result<GenerationSummary> {
        let start = Instant::now();
        let total_batches = sources.len();
        let semaphore = Arc::new(Semaphore::new(self.workers.min(total_batches.max(1))));

        let mut loaded = tokio::task::spawn_blocking(move || {
            sources.into_iter().map(load_batch).collect::<Vec<_>>()
        })
        .await
        .map_err(|e| LessonForgeError::Join(e.to_string()))?;
        loaded.sort_by_key(|b| b.id);
        let collisions = reject_duplicate_filenames(&mut loaded);

        info!(
            batches = total_batches,
            collisions,
            output = %self.store.root().display(),
            "starting generation"
        );

        let mut handles = Vec::with_capacity(total_batches);
        for batch in loaded {
            let id = batch.id;
            let sem = semaphore.clone();
            let store = self.store.clone();
            let renderer = self.renderer.clone();
            let table = self.table.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return GenerationResult {
                        batch_id: id,
                        success_count: 0,
                        errors: vec![format!("Batch {id} error: worker pool closed")],
                    };
                };
                let worker = tokio::task::spawn_blocking(move || {
                    process_batch(batch, &*renderer, &store, &table)
                });
                match worker.await {
                    Ok(result) => result,
                    Err(e) => worker_failed(id, e),
                }
            });
            handles.push((id, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (done, (id, handle)) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap_or_else(|e| worker_failed(id, e));
            progress.batch_finished(&result, done + 1, total_batches);
            results.push(result);
        }

        let mut summary = GenerationSummary::from_results(results, start.elapsed());

        if summary.total_errors > 0 {
            let errors: Vec<String> = summary.errors().map(str::to_string).collect();
            summary.error_log = Some(self.store.write_error_log(&errors)?);
        } else {
            self.store.clear_error_log()?;
        }

        info!(
            succeeded = summary.total_succeeded,
            errors = summary.total_errors,
            duration_ms = summary.duration.as_millis(),
            "generation complete"
        );

        Ok(summary)
    }
}

fn worker_failed(batch_id: usize, e: tokio::task::JoinError) -> GenerationResult {
    GenerationResult {
        batch_id,
        success_count: 0,
        errors: vec![format!(
            "Batch {batch_id} error: {}",
            LessonForgeError::Join(e.to_string())
        )],
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Numbered lines of one batch, or the reason its file could not be read.
type BatchItems = std::result::Result<Vec<(usize, Result<TopicRecord>)>, String>;

/// A batch with its lines read and parsed, ready for a worker.
#[derive(Debug)]
struct LoadedBatch {
    id: usize,
    items: BatchItems,
}

fn load_batch(source: BatchSource) -> LoadedBatch {
    let id = source.id();
    let items: BatchItems = match source {
        BatchSource::Records(batch) => Ok(batch
            .records
            .into_iter()
            .enumerate()
            .map(|(i, r)| (i + 1, Ok(r)))
            .collect()),
        BatchSource::File { path, .. } => match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| (i + 1, parse_batch_line(line)))
                .collect()),
            Err(e) => {
                warn!(batch_id = id, path = %path.display(), error = %e, "batch file unreadable");
                Err(format!("Batch {id} file error: {}: {e}", path.display()))
            }
        },
    };
    LoadedBatch { id, items }
}

/// Turn every record whose filename was already claimed by an earlier record
/// into a collision error. Expects `batches` sorted by id. Returns how many
/// records were rejected.
fn reject_duplicate_filenames(batches: &mut [LoadedBatch]) -> usize {
    let mut claimed: HashMap<String, String> = HashMap::new();
    let mut rejected = 0;

    for batch in batches.iter_mut() {
        let batch_id = batch.id;
        let Ok(items) = &mut batch.items else {
            continue;
        };
        for (line, item) in items.iter_mut() {
            let Ok(record) = &*item else {
                continue;
            };
            let owner = format!("{} / {}", record.module, record.topic);
            match claimed.get(&record.filename) {
                Some(first) => {
                    warn!(
                        batch_id,
                        line = *line,
                        filename = %record.filename,
                        first = %first,
                        "filename collision"
                    );
                    let collision = LessonForgeError::Collision {
                        filename: record.filename.clone(),
                        first: first.clone(),
                        second: owner,
                    };
                    *item = Err(collision);
                    rejected += 1;
                }
                None => {
                    claimed.insert(
                        record.filename.clone(),
                        format!("{owner} (Batch {batch_id}, Line {line})"),
                    );
                }
            }
        }
    }

    rejected
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Process one batch sequentially. Never fails as a whole: an unreadable
/// batch file is a single aggregate error with zero successes.
fn process_batch(
    batch: LoadedBatch,
    renderer: &dyn ContentRenderer,
    store: &OutputStore,
    table: &ModuleTable,
) -> GenerationResult {
    let batch_id = batch.id;
    let mut result = GenerationResult {
        batch_id,
        ..GenerationResult::default()
    };

    let items = match batch.items {
        Ok(items) => items,
        Err(message) => {
            result.errors.push(message);
            return result;
        }
    };

    for (line, item) in items {
        match item.and_then(|record| generate_one(&record, renderer, store, table)) {
            Ok(()) => result.success_count += 1,
            Err(e) => {
                warn!(batch_id, line, error = %e, "record failed");
                result.errors.push(format!("Batch {batch_id}, Line {line}: {e}"));
            }
        }
    }

    debug!(
        batch_id,
        succeeded = result.success_count,
        errors = result.errors.len(),
        "batch finished"
    );
    result
}

fn generate_one(
    record: &TopicRecord,
    renderer: &dyn ContentRenderer,
    store: &OutputStore,
    table: &ModuleTable,
) -> Result<()> {
    let content = renderer.render(record)?;
    let (module_id, module_name) = match table.resolve(&record.filename) {
        Some(entry) => (entry.id.clone(), entry.name.clone()),
        None => (UNMAPPED_MODULE_ID.to_string(), record.module.clone()),
    };

    let doc = GeneratedDocument {
        filename: record.filename.clone(),
        content,
        module_id,
        module_name,
    };
    let stored = store.write_document(&doc)?;
    debug!(
        filename = %stored.filename,
        module = %doc.module_id,
        words = count_words(&doc.content),
        "lesson generated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use lessonforge_markdown::LessonTemplate;
    use lessonforge_shared::Complexity;

    fn temp_store() -> OutputStore {
        let dir = std::env::temp_dir().join(format!("lf-gen-{}", uuid::Uuid::now_v7()));
        OutputStore::open(dir).unwrap()
    }

    fn record(topic: &str) -> TopicRecord {
        TopicRecord {
            module: "Data Modeling".into(),
            topic: topic.into(),
            complexity: Complexity::Intermediate,
            filename: format!("Data-Modeling--{}--2024-10-30.md", topic.to_lowercase()),
        }
    }

    fn orchestrator(store: &OutputStore, workers: usize) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            store.clone(),
            Arc::new(LessonTemplate::new()),
            Arc::new(ModuleTable::builtin()),
            workers,
        )
    }

    /// Fails on one topic, renders the rest.
    struct FailOn(&'static str);

    impl ContentRenderer for FailOn {
        fn render(&self, record: &TopicRecord) -> Result<String> {
            if record.topic == self.0 {
                Err(LessonForgeError::Render(format!("cannot render {}", record.topic)))
            } else {
                LessonTemplate::new().render(record)
            }
        }
    }

    #[tokio::test]
    async fn one_bad_record_does_not_stop_its_batch() {
        let store = temp_store();
        let orch = GenerationOrchestrator::new(
            store.clone(),
            Arc::new(FailOn("bad")),
            Arc::new(ModuleTable::builtin()),
            4,
        );
        let batch = Batch {
            id: 1,
            records: vec![record("a"), record("bad"), record("b"), record("c")],
        };

        let summary = orch
            .run(sources_from_batches(vec![batch]), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.total_succeeded, 3);
        assert_eq!(summary.total_errors, 1);
        assert!(summary.batches[0].errors[0].starts_with("Batch 1, Line 2: "));
        assert_eq!(
            summary.outcome(),
            RunOutcome::CompletedWithErrors { succeeded: 3, errors: 1 }
        );
        assert_eq!(summary.outcome().exit_code(), 3);
        assert!(summary.error_log.as_ref().is_some_and(|p| p.exists()));
        assert_eq!(store.list_documents().unwrap().len(), 3);

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn malformed_batch_line_is_one_error() {
        let store = temp_store();
        let dir = store.root().join("batches");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("batch_01.txt"),
            "Data Modeling|Keys|F|Data-Modeling--keys--2024-10-30.md\n\
             not a record\n\
             \n\
             Data Modeling|Facts|I|Data-Modeling--facts--2024-10-30.md\n",
        )
        .unwrap();

        let summary = orchestrator(&store, 2)
            .run(sources_from_dir(&dir).unwrap(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.total_succeeded, 2);
        assert_eq!(summary.batches[0].errors.len(), 1);
        assert!(summary.batches[0].errors[0].starts_with("Batch 1, Line 2: "));

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn missing_batch_file_isolated() {
        let store = temp_store();
        let dir = store.root().join("batches");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("batch_01.txt"),
            "Data Modeling|Keys|F|Data-Modeling--keys--2024-10-30.md\n",
        )
        .unwrap();

        let sources = vec![
            BatchSource::File { id: 1, path: dir.join("batch_01.txt") },
            BatchSource::File { id: 2, path: dir.join("batch_02.txt") },
        ];
        let summary = orchestrator(&store, 2).run(sources, &SilentProgress).await.unwrap();

        assert_eq!(summary.batches[0].success_count, 1);
        assert_eq!(summary.batches[1].success_count, 0);
        assert_eq!(summary.batches[1].errors.len(), 1);
        assert!(summary.batches[1].errors[0].starts_with("Batch 2 file error"));

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn empty_batches_are_no_work() {
        let store = temp_store();
        let batches = vec![Batch { id: 1, records: vec![] }, Batch { id: 2, records: vec![] }];
        let summary = orchestrator(&store, 2)
            .run(sources_from_batches(batches), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.outcome(), RunOutcome::NoWork);
        assert_eq!(summary.outcome().exit_code(), 2);
        assert!(summary.error_log.is_none());

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn all_failures_is_failed_outcome() {
        let store = temp_store();
        let orch = GenerationOrchestrator::new(
            store.clone(),
            Arc::new(FailOn("bad")),
            Arc::new(ModuleTable::builtin()),
            1,
        );
        let summary = orch
            .run(
                sources_from_batches(vec![Batch { id: 1, records: vec![record("bad")] }]),
                &SilentProgress,
            )
            .await
            .unwrap();

        assert_eq!(summary.outcome(), RunOutcome::Failed);
        assert_eq!(summary.outcome().exit_code(), 1);

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn results_are_ordered_by_batch_id() {
        let store = temp_store();
        let batches: Vec<Batch> = (1..=6)
            .map(|id| Batch { id, records: vec![record(&format!("t{id}"))] })
            .collect();
        let summary = orchestrator(&store, 3)
            .run(sources_from_batches(batches), &SilentProgress)
            .await
            .unwrap();

        let ids: Vec<usize> = summary.batches.iter().map(|b| b.batch_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(summary.outcome(), RunOutcome::Completed { succeeded: 6 });

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn clean_run_removes_stale_error_log() {
        let store = temp_store();
        store.write_error_log(&["old".into()]).unwrap();

        orchestrator(&store, 1)
            .run(
                sources_from_batches(vec![Batch { id: 1, records: vec![record("a")] }]),
                &SilentProgress,
            )
            .await
            .unwrap();

        assert!(!store.root().join(crate::store::ERROR_LOG_FILE).exists());
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn duplicate_filename_across_batch_files_is_a_collision() {
        let store = temp_store();
        let dir = store.root().join("batches");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("batch_01.txt"),
            "Data Modeling|Star Schema|F|Data-Modeling--star-schema--2024-10-30.md\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("batch_02.txt"),
            "Data Modeling|Keys|F|Data-Modeling--keys--2024-10-30.md\n\
             Data Modeling|Star Schema!|I|Data-Modeling--star-schema--2024-10-30.md\n",
        )
        .unwrap();

        let summary = orchestrator(&store, 2)
            .run(sources_from_dir(&dir).unwrap(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(
            summary.outcome(),
            RunOutcome::CompletedWithErrors { succeeded: 2, errors: 1 }
        );
        assert!(summary.batches[0].errors.is_empty());
        let error = &summary.batches[1].errors[0];
        assert!(error.starts_with("Batch 2, Line 2: filename collision"), "{error}");
        assert!(error.contains("Star Schema (Batch 1, Line 1)"), "{error}");

        let docs = store.list_documents().unwrap();
        assert_eq!(docs.len(), 2);
        let body = store
            .read_document("Data-Modeling--star-schema--2024-10-30.md")
            .unwrap();
        assert!(body.starts_with("# Star Schema\n"));

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn duplicate_filename_within_one_batch_keeps_first() {
        let store = temp_store();
        let mut dup = record("a");
        dup.topic = "A again".into();
        let batch = Batch { id: 1, records: vec![record("a"), dup] };

        let summary = orchestrator(&store, 1)
            .run(sources_from_batches(vec![batch]), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.total_succeeded, 1);
        assert!(summary.batches[0].errors[0].starts_with("Batch 1, Line 2: filename collision"));
        assert_eq!(store.list_documents().unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(store.root());
    }

    struct Panics;

    impl ContentRenderer for Panics {
        fn render(&self, _record: &TopicRecord) -> Result<String> {
            panic!("renderer blew up");
        }
    }

    #[tokio::test]
    async fn panicking_worker_is_a_batch_error() {
        let store = temp_store();
        let orch = GenerationOrchestrator::new(
            store.clone(),
            Arc::new(Panics),
            Arc::new(ModuleTable::builtin()),
            1,
        );
        let summary = orch
            .run(
                sources_from_batches(vec![Batch { id: 4, records: vec![record("a")] }]),
                &SilentProgress,
            )
            .await
            .unwrap();

        assert_eq!(summary.outcome(), RunOutcome::Failed);
        assert!(summary.batches[0].errors[0].starts_with("Batch 4 error: worker failed: "));

        let _ = std::fs::remove_dir_all(store.root());
    }
}
