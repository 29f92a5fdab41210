//! Generation, indexing, and pipeline orchestration for lessonforge.
//!
//! This crate ties the catalog and markdown crates together into the
//! end-to-end workflow (see [`pipeline::run_pipeline`]).

pub mod index;
pub mod orchestrator;
pub mod pipeline;
pub mod stats;
pub mod store;

pub use index::{IndexBuilder, load_index, slug_from_filename, write_index};
pub use orchestrator::{
    BatchSource, GenerationOrchestrator, GenerationSummary, RunOutcome, UNMAPPED_MODULE_ID,
    sources_from_batches, sources_from_dir,
};
pub use pipeline::{
    PipelineResult, ProgressReporter, SUMMARY_FILE, SilentProgress, plan_batches, run_pipeline,
};
pub use stats::{IndexReport, ModuleCounts, count_by_module};
pub use store::{OutputStore, StoredDocument, write_json};
