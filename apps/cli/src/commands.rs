//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use lessonforge_catalog::{extract_file, write_batch_files};
use lessonforge_core::{
    GenerationOrchestrator, GenerationSummary, IndexBuilder, IndexReport, OutputStore,
    ProgressReporter, RunOutcome, SUMMARY_FILE, count_by_module, load_index, plan_batches,
    run_pipeline, sources_from_dir, write_index, write_json,
};
use lessonforge_crawler::{HttpProbe, QualityReport, ValidationHarness};
use lessonforge_markdown::{ContentRenderer, LessonTemplate};
use lessonforge_shared::{
    AppConfig, GenerateConfig, GenerationResult, IndexConfig, ValidateConfig, init_config,
    load_config, load_config_from, today_stamp, validate_date_stamp,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// lessonforge: turn a course catalog into lessons and check them in a viewer.
#[derive(Parser)]
#[command(
    name = "lessonforge",
    version,
    about = "Generate a Markdown lesson per catalog topic, index them, and validate the rendered pages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.lessonforge/lessonforge.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the topics found in a catalog.
    Extract {
        /// Catalog text file.
        catalog: PathBuf,

        /// Date stamp for filenames (YYYY-MM-DD, defaults to today).
        #[arg(long)]
        date: Option<String>,

        /// How many topics to print.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Extract, check filenames, partition, and write batch files.
    Plan {
        /// Catalog text file.
        catalog: PathBuf,

        /// Number of batches.
        #[arg(short, long)]
        batches: Option<usize>,

        /// Directory for batch_NN.txt files.
        #[arg(long)]
        batch_dir: Option<PathBuf>,

        /// Date stamp for filenames (YYYY-MM-DD, defaults to today).
        #[arg(long)]
        date: Option<String>,
    },

    /// Generate lessons from batch files on disk.
    Generate {
        /// Directory holding batch_NN.txt files.
        #[arg(long)]
        batch_dir: Option<PathBuf>,

        /// Output directory for lessons.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Concurrent batch workers.
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Extract, partition, generate, and index in one process.
    Run {
        /// Catalog text file.
        catalog: PathBuf,

        /// Number of batches.
        #[arg(short, long)]
        batches: Option<usize>,

        /// Output directory for lessons.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Concurrent batch workers.
        #[arg(short, long)]
        workers: Option<usize>,

        /// Date stamp for filenames (YYYY-MM-DD, defaults to today).
        #[arg(long)]
        date: Option<String>,
    },

    /// Build the navigation index from generated lessons.
    Index {
        /// Directory holding generated lessons.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Where to write the index JSON.
        #[arg(long)]
        index_file: Option<PathBuf>,

        /// Also write a per-module analysis report here.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Count generated lessons per module.
    Count {
        /// Directory holding generated lessons.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check a sample of lessons in a running viewer.
    Validate {
        /// Navigation index to sample from.
        #[arg(long)]
        index_file: Option<PathBuf>,

        /// Viewer base URL.
        #[arg(long)]
        base_url: Option<String>,

        /// Concurrent page checks.
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Directory for the JSON quality report.
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default config file.
    Init,
    /// Print the effective configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lessonforge=info",
        1 => "lessonforge=debug",
        _ => "lessonforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command and map its outcome to a process exit status.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Extract {
            catalog,
            date,
            limit,
        } => cmd_extract(config_path, &catalog, date, limit),
        Command::Plan {
            catalog,
            batches,
            batch_dir,
            date,
        } => cmd_plan(config_path, &catalog, batches, batch_dir, date),
        Command::Generate {
            batch_dir,
            out,
            workers,
        } => cmd_generate(config_path, batch_dir, out, workers).await,
        Command::Run {
            catalog,
            batches,
            out,
            workers,
            date,
        } => cmd_run(config_path, &catalog, batches, out, workers, date).await,
        Command::Index {
            out,
            index_file,
            report,
        } => cmd_index(config_path, out, index_file, report).await,
        Command::Count { out } => cmd_count(config_path, out),
        Command::Validate {
            index_file,
            base_url,
            concurrency,
            report_dir,
        } => cmd_validate(config_path, index_file, base_url, concurrency, report_dir).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn exit_with(outcome: RunOutcome) -> ExitCode {
    ExitCode::from(outcome.exit_code())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_extract(
    config_path: Option<&Path>,
    catalog: &Path,
    date: Option<String>,
    limit: usize,
) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let date_stamp = date
        .or_else(|| config.defaults.date_stamp.clone())
        .unwrap_or_else(today_stamp);
    validate_date_stamp(&date_stamp)?;

    let records = extract_file(catalog, &date_stamp)?;

    println!();
    println!("  Topics: {}", records.len());
    for record in records.iter().take(limit) {
        println!(
            "  [{}] {} :: {} -> {}",
            record.complexity.code(),
            record.module,
            record.topic,
            record.filename
        );
    }
    if records.len() > limit {
        println!("  ... {} more", records.len() - limit);
    }
    println!();

    Ok(if records.is_empty() {
        exit_with(RunOutcome::NoWork)
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_plan(
    config_path: Option<&Path>,
    catalog: &Path,
    batches: Option<usize>,
    batch_dir: Option<PathBuf>,
    date: Option<String>,
) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let mut generate = GenerateConfig::from(&config);
    if let Some(n) = batches {
        generate.batch_count = n;
    }
    if let Some(dir) = batch_dir {
        generate.batch_dir = dir;
    }
    if let Some(d) = date {
        generate.date_stamp = d;
    }
    generate.validate()?;

    let planned = plan_batches(catalog, generate.batch_count, &generate.date_stamp)?;
    let written = write_batch_files(&generate.batch_dir, &planned)?;

    println!();
    for batch in &planned {
        println!("  Batch {:02}: {} topics", batch.id, batch.len());
    }
    println!(
        "  Wrote {} batch files to {}",
        written.len(),
        generate.batch_dir.display()
    );
    println!();

    let topics: usize = planned.iter().map(|b| b.len()).sum();
    Ok(if topics == 0 {
        exit_with(RunOutcome::NoWork)
    } else {
        ExitCode::SUCCESS
    })
}

async fn cmd_generate(
    config_path: Option<&Path>,
    batch_dir: Option<PathBuf>,
    out: Option<PathBuf>,
    workers: Option<usize>,
) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let mut generate = GenerateConfig::from(&config);
    if let Some(dir) = batch_dir {
        generate.batch_dir = dir;
    }
    if let Some(dir) = out {
        generate.output_dir = dir;
    }
    if let Some(w) = workers {
        generate.workers = w;
    }
    generate.validate()?;

    let sources = sources_from_dir(&generate.batch_dir)?;
    if sources.is_empty() {
        warn!(dir = %generate.batch_dir.display(), "no batch files found");
    }

    info!(
        batches = sources.len(),
        workers = generate.workers,
        out = %generate.output_dir.display(),
        "generating lessons"
    );

    let store = OutputStore::open(&generate.output_dir)?;
    let renderer: Arc<dyn ContentRenderer> = Arc::new(LessonTemplate::new());
    let orchestrator = GenerationOrchestrator::new(
        store.clone(),
        renderer,
        Arc::new(config.module_table()),
        generate.workers,
    );

    let reporter = CliProgress::new();
    reporter.phase("Generating lessons");
    let summary = orchestrator.run(sources, &reporter).await?;
    store.write_json_atomic(SUMMARY_FILE, &summary)?;
    reporter.generation_done(&summary);
    reporter.finish();

    print_generation_summary(&summary);
    Ok(exit_with(summary.outcome()))
}

async fn cmd_run(
    config_path: Option<&Path>,
    catalog: &Path,
    batches: Option<usize>,
    out: Option<PathBuf>,
    workers: Option<usize>,
    date: Option<String>,
) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let mut generate = GenerateConfig::from(&config);
    let mut index_config = IndexConfig::from(&config);
    if let Some(n) = batches {
        generate.batch_count = n;
    }
    if let Some(dir) = out {
        index_config.output_dir = dir.clone();
        generate.output_dir = dir;
    }
    if let Some(w) = workers {
        generate.workers = w;
    }
    if let Some(d) = date {
        generate.date_stamp = d;
    }

    info!(
        catalog = %catalog.display(),
        batches = generate.batch_count,
        workers = generate.workers,
        "running full pipeline"
    );

    let reporter = CliProgress::new();
    let result = run_pipeline(
        catalog,
        &generate,
        &index_config,
        Arc::new(config.module_table()),
        Arc::new(LessonTemplate::new()),
        &reporter,
    )
    .await;
    reporter.finish();
    let result = result?;

    print_generation_summary(&result.summary);
    println!("  Topics:   {}", result.records);
    println!(
        "  Index:    {} lessons in {} modules -> {}",
        result.index.lesson_count(),
        result.index.modules.len(),
        result.index_path.display()
    );
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(exit_with(result.summary.outcome()))
}

async fn cmd_index(
    config_path: Option<&Path>,
    out: Option<PathBuf>,
    index_file: Option<PathBuf>,
    report: Option<PathBuf>,
) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let mut index_config = IndexConfig::from(&config);
    if let Some(dir) = out {
        index_config.output_dir = dir;
    }
    if let Some(path) = index_file {
        index_config.index_file = path;
    }

    let table = Arc::new(config.module_table());
    let store = OutputStore::existing(&index_config.output_dir)?;
    let index = IndexBuilder::new(&index_config, table.clone())
        .build(&store)
        .await?;
    write_index(&index_config.index_file, &index)?;

    println!();
    for module in index.modules.values() {
        println!(
            "  {:<12} {:>4} lessons  {}",
            module.module_id, module.lesson_count, module.module_name
        );
    }
    println!(
        "  Indexed {} lessons -> {}",
        index.lesson_count(),
        index_config.index_file.display()
    );

    if let Some(path) = report {
        let analysis = IndexReport::from_index(&index, &table);
        write_json(&path, &analysis)?;
        println!("  Report:  {}", path.display());
    }
    println!();

    Ok(if index.is_empty() {
        exit_with(RunOutcome::NoWork)
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_count(config_path: Option<&Path>, out: Option<PathBuf>) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let dir = out.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));
    let store = OutputStore::existing(&dir)?;
    let counts = count_by_module(&store, &config.module_table())?;

    println!();
    for module in &counts.modules {
        println!(
            "  {:<12} {:>4}  {}",
            module.module_id, module.count, module.module_name
        );
    }
    if !counts.unknown.is_empty() {
        println!("  {:<12} {:>4}", "unknown", counts.unknown.len());
    }
    println!("  Total: {}", counts.total());
    println!();

    Ok(ExitCode::SUCCESS)
}

async fn cmd_validate(
    config_path: Option<&Path>,
    index_file: Option<PathBuf>,
    base_url: Option<String>,
    concurrency: Option<usize>,
    report_dir: Option<PathBuf>,
) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let mut validate = ValidateConfig::from(&config);
    if let Some(url) = base_url {
        validate.base_url = url;
    }
    if let Some(c) = concurrency {
        validate.concurrency = c.max(1);
    }
    if let Some(dir) = report_dir {
        validate.report_dir = dir;
    }
    let index_path = index_file.unwrap_or_else(|| IndexConfig::from(&config).index_file);

    if !index_path.exists() {
        return Err(eyre!(
            "navigation index not found at {}: run `lessonforge index` first",
            index_path.display()
        ));
    }
    let index = load_index(&index_path)?;

    let probe = Arc::new(HttpProbe::new(&validate)?);
    let harness = ValidationHarness::new(&validate, probe)?;

    let cancel = harness.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling pending checks");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    info!(
        base_url = %validate.base_url,
        concurrency = harness.concurrency(),
        "validating rendered lessons"
    );

    let report = harness.run(&index).await;
    let report_path = report.write(&validate.report_dir)?;

    print_quality_report(&report);
    println!("  Report:   {}", report_path.display());
    println!();

    let summary = &report.test_summary;
    let outcome = match (summary.successful, summary.failed) {
        (0, 0) => RunOutcome::NoWork,
        (0, _) => RunOutcome::Failed,
        (succeeded, 0) => RunOutcome::Completed { succeeded },
        (succeeded, errors) => RunOutcome::CompletedWithErrors { succeeded, errors },
    };
    Ok(exit_with(outcome))
}

fn cmd_config_init() -> Result<ExitCode> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = load_app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_generation_summary(summary: &GenerationSummary) {
    println!();
    println!("  Batches:  {}", summary.batches.len());
    println!("  Lessons:  {}", summary.total_succeeded);
    println!("  Errors:   {}", summary.total_errors);
    println!("  Rate:     {:.1} lessons/s", summary.documents_per_second());
    if let Some(log) = &summary.error_log {
        println!("  Log:      {}", log.display());
        for error in summary.errors().take(5) {
            println!("    {error}");
        }
    }
}

fn print_quality_report(report: &QualityReport) {
    let summary = &report.test_summary;
    let quality = &report.enhancement_quality;
    println!();
    println!(
        "  Checked:  {} ({} ok, {} failed, {:.1}%)",
        summary.total_tested, summary.successful, summary.failed, summary.success_rate
    );
    println!(
        "  Prose:    {:.1}%  Enhanced: {:.1}%",
        quality.typography.typography_success_rate, quality.typography.enhancement_success_rate
    );
    println!(
        "  Clean:    {:.1}%  Nav: {:.1}%",
        quality.rendering.rendering_success_rate, quality.rendering.navigation_success_rate
    );
    println!("  Score:    {:.1}", quality.overall_quality_score);
    println!("  Time:     {:.1}s", summary.duration_seconds);
    for (id, module) in &report.module_breakdown {
        println!("  {:<12} {}/{}", id, module.successful, module.tests);
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_finished(&self, result: &GenerationResult, done: usize, total: usize) {
        self.spinner.set_message(format!(
            "Generating [{done}/{total}] batch {:02}: {} ok, {} errors",
            result.batch_id,
            result.success_count,
            result.errors.len()
        ));
    }

    fn generation_done(&self, summary: &GenerationSummary) {
        self.spinner.set_message(format!(
            "Generated {} lessons ({} errors)",
            summary.total_succeeded, summary.total_errors
        ));
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
