//! Lesson counts and index analysis reports.

use serde::Serialize;
use tracing::instrument;

use lessonforge_shared::{ModuleTable, NavigationEntry, NavigationIndex, Result};

use crate::store::OutputStore;

/// Lessons listed per module in an [`IndexReport`].
pub const SAMPLE_LESSONS: usize = 3;

// ---------------------------------------------------------------------------
// Counting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCount {
    pub module_id: String,
    pub module_name: String,
    pub count: usize,
}

/// Per-module document counts, in module table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCounts {
    pub modules: Vec<ModuleCount>,
    /// Filenames no module prefix matched.
    pub unknown: Vec<String>,
}

impl ModuleCounts {
    pub fn total(&self) -> usize {
        self.modules.iter().map(|m| m.count).sum::<usize>() + self.unknown.len()
    }
}

/// Count the documents in a store by module.
#[instrument(skip_all, fields(store = %store.root().display()))]
pub fn count_by_module(store: &OutputStore, table: &ModuleTable) -> Result<ModuleCounts> {
    let mut modules: Vec<ModuleCount> = table
        .entries()
        .iter()
        .map(|e| ModuleCount {
            module_id: e.id.clone(),
            module_name: e.name.clone(),
            count: 0,
        })
        .collect();
    let mut unknown = Vec::new();

    for filename in store.list_documents()? {
        let slot = table
            .resolve(&filename)
            .and_then(|entry| table.position(&entry.id));
        match slot {
            Some(i) => modules[i].count += 1,
            None => unknown.push(filename),
        }
    }

    Ok(ModuleCounts { modules, unknown })
}

// ---------------------------------------------------------------------------
// Index report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub total_modules: usize,
    pub total_lessons: usize,
    /// Rounded to one decimal.
    pub avg_lessons_per_module: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatistics {
    pub module_id: String,
    pub module_name: String,
    pub lesson_count: usize,
    pub sample_lessons: Vec<NavigationEntry>,
}

/// Shape of a navigation index, for humans.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub summary: IndexSummary,
    pub module_statistics: Vec<ModuleStatistics>,
}

impl IndexReport {
    /// Summarize `index`. Modules are listed in table order; modules missing
    /// from the table go last, by id.
    pub fn from_index(index: &NavigationIndex, table: &ModuleTable) -> Self {
        let total_modules = index.modules.len();
        let total_lessons = index.lesson_count();
        let avg_lessons_per_module = if total_modules == 0 {
            0.0
        } else {
            (total_lessons as f64 / total_modules as f64 * 10.0).round() / 10.0
        };

        let mut modules: Vec<_> = index.modules.values().collect();
        modules.sort_by_key(|m| {
            let position = table.position(&m.module_id).unwrap_or(usize::MAX);
            (position, m.module_id.clone())
        });

        let module_statistics = modules
            .into_iter()
            .map(|m| ModuleStatistics {
                module_id: m.module_id.clone(),
                module_name: m.module_name.clone(),
                lesson_count: m.lessons.len(),
                sample_lessons: m.lessons.iter().take(SAMPLE_LESSONS).cloned().collect(),
            })
            .collect();

        Self {
            summary: IndexSummary {
                total_modules,
                total_lessons,
                avg_lessons_per_module,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            module_statistics,
        }
    }
}
