//! Shared types, error model, and configuration for lessonforge.
//!
//! This crate is the foundation depended on by all other lessonforge crates.
//! It provides:
//! - [`LessonForgeError`]: the unified error type
//! - Domain types ([`TopicRecord`], [`Batch`], [`NavigationIndex`], ...)
//! - The module identity table ([`ModuleTable`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod fs;
pub mod modules;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DATE_STAMP_FORMAT, DefaultsConfig, GenerateConfig, IndexConfig, IndexSection,
    ValidateConfig, ValidationSection, config_dir, config_file_path, init_config, load_config,
    load_config_from, today_stamp, validate_date_stamp,
};
pub use error::{LessonForgeError, Result};
pub use fs::write_atomic;
pub use modules::{ModuleEntry, ModuleTable, clean_segment};
pub use types::{
    Batch, Complexity, GeneratedDocument, GenerationResult, ModuleNav, NavigationEntry,
    NavigationIndex, TopicRecord, UNKNOWN_COMPLEXITY_RANK,
};
