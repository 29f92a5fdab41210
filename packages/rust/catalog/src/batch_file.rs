//! Pipe-delimited batch files (`batch_NN.txt`).
//!
//! One record per line: `module|topic|complexity|filename`.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use lessonforge_shared::{Batch, Complexity, LessonForgeError, Result, TopicRecord, write_atomic};

const FIELD_SEPARATOR: char = '|';
const BATCH_PREFIX: &str = "batch_";
const BATCH_SUFFIX: &str = ".txt";

/// File name for a 1-based batch id.
pub fn batch_file_name(id: usize) -> String {
    format!("{BATCH_PREFIX}{id:02}{BATCH_SUFFIX}")
}

/// Batch id encoded in a `batch_NN.txt` path.
pub fn batch_id_from_path(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix(BATCH_PREFIX)?
        .strip_suffix(BATCH_SUFFIX)?
        .parse()
        .ok()
}

/// Encode one record. Fields that would break the line format are rejected.
pub fn format_batch_line(record: &TopicRecord) -> Result<String> {
    let code = record.complexity.code();
    let fields = [
        record.module.as_str(),
        record.topic.as_str(),
        code,
        record.filename.as_str(),
    ];
    if let Some(bad) = fields
        .iter()
        .find(|f| f.contains(FIELD_SEPARATOR) || f.contains('\n'))
    {
        return Err(LessonForgeError::validation(format!(
            "field cannot be stored in a batch file: {bad:?}"
        )));
    }
    Ok(fields.join("|"))
}

/// Decode one line. Anything other than four non-empty fields is an error.
pub fn parse_batch_line(line: &str) -> Result<TopicRecord> {
    let fields: Vec<&str> = line.trim().split(FIELD_SEPARATOR).map(str::trim).collect();

    let [module, topic, complexity, filename] = fields.as_slice() else {
        return Err(LessonForgeError::parse(format!(
            "expected 4 fields, found {}",
            fields.len()
        )));
    };
    if [module, topic, complexity, filename].iter().any(|f| f.is_empty()) {
        return Err(LessonForgeError::parse("empty field in batch line"));
    }

    Ok(TopicRecord {
        module: module.to_string(),
        topic: topic.to_string(),
        complexity: Complexity::parse(complexity),
        filename: filename.to_string(),
    })
}

/// Encode a whole batch, one line per record, newline-terminated.
pub fn format_batch(batch: &Batch) -> Result<String> {
    let mut out = String::new();
    for record in &batch.records {
        out.push_str(&format_batch_line(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// All `batch_*.txt` files in `dir`, sorted by name.
pub fn list_batch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| LessonForgeError::io(dir, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && batch_id_from_path(p).is_some())
        .collect();
    files.sort();
    Ok(files)
}

/// Write every batch to `dir`, replacing any batch files left by earlier runs.
#[instrument(skip_all, fields(dir = %dir.display(), batches = batches.len()))]
pub fn write_batch_files(dir: &Path, batches: &[Batch]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| LessonForgeError::io(dir, e))?;

    for stale in list_batch_files(dir)? {
        std::fs::remove_file(&stale).map_err(|e| LessonForgeError::io(&stale, e))?;
        debug!(path = %stale.display(), "removed stale batch file");
    }

    let mut written = Vec::with_capacity(batches.len());
    for batch in batches {
        let path = dir.join(batch_file_name(batch.id));
        write_atomic(&path, format_batch(batch)?)?;
        debug!(path = %path.display(), records = batch.len(), "batch file written");
        written.push(path);
    }

    info!(count = written.len(), "batch files written");
    Ok(written)
}
