//! Application configuration for lessonforge.
//!
//! User config lives at `~/.lessonforge/lessonforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LessonForgeError, Result};
use crate::modules::{ModuleEntry, ModuleTable};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lessonforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lessonforge";

/// Date format used in generated filenames.
pub const DATE_STAMP_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Config structs (matching lessonforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Navigation index settings.
    #[serde(default)]
    pub index: IndexSection,

    /// Viewer validation settings.
    #[serde(default)]
    pub validation: ValidationSection,

    /// Module table override. Empty means the built-in curriculum.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleEntry>,
}

impl AppConfig {
    /// The module table this config selects.
    pub fn module_table(&self) -> ModuleTable {
        if self.modules.is_empty() {
            ModuleTable::builtin()
        } else {
            ModuleTable::new(self.modules.clone())
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory generated lessons are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory holding `batch_NN.txt` files.
    #[serde(default = "default_batch_dir")]
    pub batch_dir: String,

    /// Number of batches the catalog is split into.
    #[serde(default = "default_batch_count")]
    pub batch_count: usize,

    /// Maximum batches generated at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Fixed `YYYY-MM-DD` stamp for filenames; today's UTC date when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_stamp: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            batch_dir: default_batch_dir(),
            batch_count: default_batch_count(),
            workers: default_workers(),
            date_stamp: None,
        }
    }
}

fn default_output_dir() -> String {
    "lessons".into()
}
fn default_batch_dir() -> String {
    "lessons/batch_processing".into()
}
fn default_batch_count() -> usize {
    20
}
fn default_workers() -> usize {
    20
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSection {
    /// Navigation index artifact path.
    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// URL prefix lessons are served under.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,

    /// Concurrent document reads while indexing.
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,

    /// Title used when a lesson has no top-level heading.
    #[serde(default = "default_untitled_title")]
    pub untitled_title: String,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            index_file: default_index_file(),
            url_prefix: default_url_prefix(),
            read_concurrency: default_read_concurrency(),
            untitled_title: default_untitled_title(),
        }
    }
}

fn default_index_file() -> String {
    "lesson_navigation_map.json".into()
}
fn default_url_prefix() -> String {
    "/lessons".into()
}
fn default_read_concurrency() -> usize {
    20
}
fn default_untitled_title() -> String {
    "Untitled Lesson".into()
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Base URL of the running lesson viewer.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Maximum checks in flight.
    #[serde(default = "default_validation_concurrency")]
    pub concurrency: usize,

    /// Upper bound for loading one page.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Upper bound for the primary heading to appear.
    #[serde(default = "default_element_wait_timeout_ms")]
    pub element_wait_timeout_ms: u64,

    /// Delay between re-polls while waiting for the heading.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lessons sampled per module.
    #[serde(default = "default_lessons_per_module")]
    pub lessons_per_module: usize,

    /// Href fragment identifying the link back to a module page.
    #[serde(default = "default_module_link_prefix")]
    pub module_link_prefix: String,

    /// Directory quality reports are written to.
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            concurrency: default_validation_concurrency(),
            render_timeout_ms: default_render_timeout_ms(),
            element_wait_timeout_ms: default_element_wait_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            lessons_per_module: default_lessons_per_module(),
            module_link_prefix: default_module_link_prefix(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3002".into()
}
fn default_validation_concurrency() -> usize {
    15
}
fn default_render_timeout_ms() -> u64 {
    30_000
}
fn default_element_wait_timeout_ms() -> u64 {
    15_000
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_lessons_per_module() -> usize {
    3
}
fn default_module_link_prefix() -> String {
    "/learning-path/".into()
}
fn default_report_dir() -> String {
    ".".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime generation configuration.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub output_dir: PathBuf,
    pub batch_dir: PathBuf,
    pub batch_count: usize,
    pub workers: usize,
    /// `YYYY-MM-DD` stamp embedded in filenames.
    pub date_stamp: String,
}

impl From<&AppConfig> for GenerateConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.defaults.output_dir),
            batch_dir: PathBuf::from(&config.defaults.batch_dir),
            batch_count: config.defaults.batch_count,
            workers: config.defaults.workers,
            date_stamp: config
                .defaults
                .date_stamp
                .clone()
                .unwrap_or_else(today_stamp),
        }
    }
}

impl GenerateConfig {
    /// Reject settings no run could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.batch_count == 0 {
            return Err(LessonForgeError::config("batch_count must be at least 1"));
        }
        if self.workers == 0 {
            return Err(LessonForgeError::config("workers must be at least 1"));
        }
        validate_date_stamp(&self.date_stamp)
    }
}

/// Runtime index configuration.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub output_dir: PathBuf,
    pub index_file: PathBuf,
    pub url_prefix: String,
    pub read_concurrency: usize,
    pub untitled_title: String,
}

impl From<&AppConfig> for IndexConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.defaults.output_dir),
            index_file: PathBuf::from(&config.index.index_file),
            url_prefix: config.index.url_prefix.clone(),
            read_concurrency: config.index.read_concurrency.max(1),
            untitled_title: config.index.untitled_title.clone(),
        }
    }
}

/// Runtime validation configuration.
#[derive(Debug, Clone)]
pub struct ValidateConfig {
    pub base_url: String,
    pub concurrency: usize,
    pub render_timeout: Duration,
    pub element_wait_timeout: Duration,
    pub poll_interval: Duration,
    pub lessons_per_module: usize,
    pub module_link_prefix: String,
    pub report_dir: PathBuf,
}

impl From<&AppConfig> for ValidateConfig {
    fn from(config: &AppConfig) -> Self {
        let v = &config.validation;
        Self {
            base_url: v.base_url.clone(),
            concurrency: v.concurrency.max(1),
            render_timeout: Duration::from_millis(v.render_timeout_ms),
            element_wait_timeout: Duration::from_millis(v.element_wait_timeout_ms),
            poll_interval: Duration::from_millis(v.poll_interval_ms),
            lessons_per_module: v.lessons_per_module,
            module_link_prefix: v.module_link_prefix.clone(),
            report_dir: PathBuf::from(&v.report_dir),
        }
    }
}

/// Today's UTC date as a filename stamp.
pub fn today_stamp() -> String {
    chrono::Utc::now().format(DATE_STAMP_FORMAT).to_string()
}

/// Check that a stamp is a real `YYYY-MM-DD` date.
pub fn validate_date_stamp(stamp: &str) -> Result<()> {
    chrono::NaiveDate::parse_from_str(stamp, DATE_STAMP_FORMAT)
        .map(|_| ())
        .map_err(|e| LessonForgeError::config(format!("invalid date stamp '{stamp}': {e}")))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lessonforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LessonForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lessonforge/lessonforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LessonForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LessonForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LessonForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LessonForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LessonForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("lesson_navigation_map.json"));
        assert!(toml_str.contains("http://localhost:3002"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.batch_count, 20);
        assert_eq!(parsed.validation.concurrency, 15);
        assert!(parsed.modules.is_empty());
    }

    #[test]
    fn config_with_module_override() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/lessons"
date_stamp = "2024-10-30"

[[modules]]
prefix = "Cooking-Basics"
id = "module-1"
name = "Module 1: Cooking Basics"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let table = config.module_table();
        assert_eq!(table.entries().len(), 1);
        assert_eq!(
            table.resolve("Cooking-Basics--eggs--2024-10-30.md").map(|m| m.id.as_str()),
            Some("module-1")
        );

        let generate = GenerateConfig::from(&config);
        assert_eq!(generate.date_stamp, "2024-10-30");
        assert_eq!(generate.output_dir, PathBuf::from("/tmp/lessons"));
    }

    #[test]
    fn runtime_configs_from_defaults() {
        let app = AppConfig::default();

        let validate = ValidateConfig::from(&app);
        assert_eq!(validate.render_timeout, Duration::from_secs(30));
        assert_eq!(validate.element_wait_timeout, Duration::from_secs(15));
        assert_eq!(validate.lessons_per_module, 3);

        let index = IndexConfig::from(&app);
        assert_eq!(index.url_prefix, "/lessons");
        assert_eq!(index.untitled_title, "Untitled Lesson");
    }

    #[test]
    fn generate_config_validation() {
        let mut config = GenerateConfig::from(&AppConfig::default());
        assert!(config.validate().is_ok());

        config.workers = 0;
        assert!(config.validate().unwrap_err().to_string().contains("workers"));

        config.workers = 4;
        config.date_stamp = "2024-13-45".into();
        assert!(config.validate().is_err());
    }
}
