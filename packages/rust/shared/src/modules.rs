//! Module identity table.
//!
//! A single ordered list of `(prefix, id, name)` tuples maps generated
//! filenames back to the curriculum module they belong to. Every component
//! that needs module identity goes through [`ModuleTable`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static NON_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("non-filename regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Reduce a catalog string to a filename segment: drop everything except
/// word characters, whitespace and hyphens, then join words with `-`.
///
/// Case is preserved; callers lowercase where needed.
pub fn clean_segment(raw: &str) -> String {
    let stripped = NON_FILENAME_RE.replace_all(raw, "");
    WHITESPACE_RE.replace_all(stripped.trim(), "-").into_owned()
}

/// One row of the module table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Filename prefix, e.g. `Data-Database-Fundamentals`.
    pub prefix: String,
    /// Stable id, e.g. `module-1`.
    pub id: String,
    /// Display name, e.g. `Module 1: Data & Database Fundamentals`.
    pub name: String,
}

/// Ordered prefix → module lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTable {
    entries: Vec<ModuleEntry>,
}

#[rustfmt::skip]
const BUILTIN_MODULES: &[(&str, &str, &str)] = &[
    ("Data-Database-Fundamentals", "module-1", "Module 1: Data & Database Fundamentals"),
    ("SQL-ELT-Concepts", "module-2", "Module 2: SQL & ELT Concepts"),
    ("Data-Warehousing-Principles", "module-3", "Module 3: Data Warehousing Principles"),
    ("Data-Modeling", "module-4", "Module 4: Data Modeling"),
    ("Snowflake-Specific-Knowledge", "module-5", "Module 5: Snowflake-Specific Knowledge"),
    ("ETLELT-Design-Best-Practices", "module-6", "Module 6: ETL/ELT Design & Best Practices"),
    ("Data-Governance-Quality-Metadata", "module-7", "Module 7: Data Governance, Quality & Metadata"),
    ("Snowflake-Security-Access-Control", "module-8", "Module 8: Snowflake Security & Access Control"),
    ("Reporting-BI-Concepts", "module-9", "Module 9: Reporting & BI Concepts"),
    ("UnixLinux-File-Handling", "module-10", "Module 10: Unix/Linux & File Handling"),
    ("Version-Control-Team-Collaboration", "module-11", "Module 11: Version Control & Team Collaboration"),
    ("Performance-Optimization-Troubleshooting", "module-12", "Module 12: Performance Optimization & Troubleshooting"),
    ("CICD-Deployment-Practices", "module-13", "Module 13: CI/CD & Deployment Practices"),
    ("Monitoring-Observability", "module-14", "Module 14: Monitoring & Observability"),
    ("Orchestration-Scheduling-Tools", "module-15", "Module 15: Orchestration & Scheduling Tools"),
    ("Data-Transformation-with-dbt-Optional-but-Recommended", "module-16", "Module 16: Data Transformation with dbt"),
    ("Soft-Skills-Professional-Practices", "module-17", "Module 17: Soft Skills & Professional Practices"),
    ("Business-Domain-Knowledge", "module-18", "Module 18: Business & Domain Knowledge"),
    ("Additional-Technical-Skills", "module-19", "Module 19: Additional Technical Skills"),
    ("Emerging-Topics-Advanced-Concepts", "module-20", "Module 20: Emerging Topics & Advanced Concepts"),
];

impl ModuleTable {
    /// Build a table from explicit entries, preserving their order.
    pub fn new(entries: Vec<ModuleEntry>) -> Self {
        Self { entries }
    }

    /// The 20-module data engineering curriculum.
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_MODULES
                .iter()
                .map(|(prefix, id, name)| ModuleEntry {
                    prefix: (*prefix).to_string(),
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }

    /// Resolve a filename to its module. The longest matching prefix wins;
    /// on equal length the earlier entry wins.
    pub fn resolve(&self, filename: &str) -> Option<&ModuleEntry> {
        let mut best: Option<&ModuleEntry> = None;
        for entry in &self.entries {
            if entry.prefix.is_empty() || !filename.starts_with(&entry.prefix) {
                continue;
            }
            if best.is_none_or(|b| entry.prefix.len() > b.prefix.len()) {
                best = Some(entry);
            }
        }
        best
    }

    /// Filename prefix a catalog module name produces.
    pub fn prefix_for_name(name: &str) -> String {
        clean_segment(name)
    }

    /// Position of a module id in table order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}
