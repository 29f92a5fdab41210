//! Topic catalog extractor.
//!
//! The catalog is plain text:
//! - `Module <n>: <name>` sets the module for the lines that follow
//! - `• <topic> [<code>]` is a topic with a trailing complexity code
//! - everything else (intro prose, legends, blank lines) is ignored
//!
//! Extraction is a left fold over the lines where the only state is the
//! current module name.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use lessonforge_shared::{Complexity, LessonForgeError, Result, TopicRecord, clean_segment};

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches `Module 3: Data Warehousing Principles`.
static MODULE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Module\s+\d+\s*:\s*(.+)$").expect("module header regex")
});

/// Matches `• Topic text [F-I]`. The greedy body splits at the last `[`.
static TOPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[•●▪◦*-]\s*(.+)\[([^\[\]]+)\]\s*$").expect("topic regex")
});

/// Valid complexity codes inside the brackets.
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[FIAE](?:\s*-\s*[FIAE])?$").expect("complexity code regex")
});

/// Legend rows: `Foundational [F]`, `Expert - deep dives [E]`, `F = Foundational [F]`.
static LEGEND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:\[|(?i:foundational|intermediate|advanced|expert)\b\s*(?:$|[=:(]|[-–]\s)|[FIAE](?:-[FIAE])?\s*(?:[=:]|[-–]\s))",
    )
    .expect("legend regex")
});

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// What a single catalog line means on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLine {
    /// `Module <n>: <name>`.
    ModuleHeader(String),
    /// A bulleted topic with its complexity code.
    Topic { topic: String, complexity: Complexity },
    /// A legend row that looks like a topic.
    Legend,
    /// Anything else.
    Other,
}

/// Classify one line without any surrounding context.
pub fn classify_line(line: &str) -> CatalogLine {
    let trimmed = line.trim();

    if let Some(caps) = MODULE_HEADER_RE.captures(trimmed) {
        return CatalogLine::ModuleHeader(caps[1].trim().to_string());
    }

    let Some(caps) = TOPIC_RE.captures(trimmed) else {
        return CatalogLine::Other;
    };

    let topic = caps[1].trim();
    let code = caps[2].trim();
    if topic.is_empty() || !CODE_RE.is_match(code) {
        return CatalogLine::Other;
    }
    if LEGEND_RE.is_match(topic) {
        return CatalogLine::Legend;
    }

    CatalogLine::Topic {
        topic: topic.to_string(),
        complexity: Complexity::parse(code),
    }
}

/// Advance the fold by one line. Returns a record when the line is a topic
/// under a known module.
fn step(current_module: &mut Option<String>, line: &str, date_stamp: &str) -> Option<TopicRecord> {
    match classify_line(line) {
        CatalogLine::ModuleHeader(name) => {
            *current_module = Some(name);
            None
        }
        CatalogLine::Topic { topic, complexity } => match current_module {
            Some(module) => Some(TopicRecord {
                filename: create_filename(module, &topic, date_stamp),
                module: module.clone(),
                topic,
                complexity,
            }),
            None => {
                debug!(%topic, "topic before any module header, dropped");
                None
            }
        },
        CatalogLine::Legend | CatalogLine::Other => None,
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Lazily extract topic records from catalog text.
///
/// The iterator holds no state beyond the current module, so calling this
/// again on the same text yields the same sequence.
pub fn extract_topics<'a>(
    text: &'a str,
    date_stamp: &'a str,
) -> impl Iterator<Item = TopicRecord> + 'a {
    text.lines()
        .scan(None::<String>, move |module, line| {
            Some(step(module, line, date_stamp))
        })
        .flatten()
}

/// Read a catalog file and extract every record.
///
/// A missing or unreadable catalog is fatal for the run.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn extract_file(path: &Path, date_stamp: &str) -> Result<Vec<TopicRecord>> {
    let text = std::fs::read_to_string(path).map_err(|e| LessonForgeError::io(path, e))?;
    let records: Vec<TopicRecord> = extract_topics(&text, date_stamp).collect();
    debug!(records = records.len(), "catalog extracted");
    Ok(records)
}

/// Standardized lesson filename: `{Module-Name}--{topic-slug}--{date}.md`.
pub fn create_filename(module: &str, topic: &str, date_stamp: &str) -> String {
    let module_clean = clean_segment(module);
    let topic_clean = clean_segment(topic).to_lowercase();
    format!("{module_clean}--{topic_clean}--{date_stamp}.md")
}

// ---------------------------------------------------------------------------
// Filename uniqueness
// ---------------------------------------------------------------------------

/// Two records that derive the same filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameCollision {
    pub filename: String,
    pub first: String,
    pub second: String,
}

/// Every filename shared by more than one record, in input order.
pub fn find_collisions(records: &[TopicRecord]) -> Vec<FilenameCollision> {
    let mut seen: HashMap<&str, &TopicRecord> = HashMap::with_capacity(records.len());
    let mut collisions = Vec::new();

    for record in records {
        if let Some(first) = seen.get(record.filename.as_str()) {
            collisions.push(FilenameCollision {
                filename: record.filename.clone(),
                first: format!("{} / {}", first.module, first.topic),
                second: format!("{} / {}", record.module, record.topic),
            });
        } else {
            seen.insert(&record.filename, record);
        }
    }

    collisions
}

/// Fail on the first filename collision after logging all of them.
pub fn check_unique_filenames(records: &[TopicRecord]) -> Result<()> {
    let collisions = find_collisions(records);
    for c in &collisions {
        warn!(filename = %c.filename, first = %c.first, second = %c.second, "filename collision");
    }

    match collisions.into_iter().next() {
        Some(c) => Err(LessonForgeError::Collision {
            filename: c.filename,
            first: c.first,
            second: c.second,
        }),
        None => Ok(()),
    }
}
