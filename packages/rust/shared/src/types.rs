//! Core domain types for lessonforge runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Rank given to complexity codes outside the known table.
pub const UNKNOWN_COMPLEXITY_RANK: u32 = 999;

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

/// Topic difficulty code from the catalog (`F`, `F-I`, `I`, ... `E`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Complexity {
    Foundational,
    FoundationalIntermediate,
    Intermediate,
    IntermediateAdvanced,
    Advanced,
    AdvancedExpert,
    Expert,
    /// Any code not in the table; kept verbatim, ranked last.
    Other(String),
}

impl Complexity {
    /// Parse a catalog code. Whitespace around the hyphen is ignored.
    pub fn parse(code: &str) -> Self {
        let normalized: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        match normalized.as_str() {
            "F" => Self::Foundational,
            "F-I" => Self::FoundationalIntermediate,
            "I" => Self::Intermediate,
            "I-A" => Self::IntermediateAdvanced,
            "A" => Self::Advanced,
            "A-E" => Self::AdvancedExpert,
            "E" => Self::Expert,
            _ => Self::Other(code.trim().to_string()),
        }
    }

    /// Catalog code for this complexity.
    pub fn code(&self) -> &str {
        match self {
            Self::Foundational => "F",
            Self::FoundationalIntermediate => "F-I",
            Self::Intermediate => "I",
            Self::IntermediateAdvanced => "I-A",
            Self::Advanced => "A",
            Self::AdvancedExpert => "A-E",
            Self::Expert => "E",
            Self::Other(code) => code,
        }
    }

    /// Ordering rank; lower is simpler.
    pub fn rank(&self) -> u32 {
        match self {
            Self::Foundational => 1,
            Self::FoundationalIntermediate => 2,
            Self::Intermediate => 3,
            Self::IntermediateAdvanced => 4,
            Self::Advanced => 5,
            Self::AdvancedExpert => 6,
            Self::Expert => 7,
            Self::Other(_) => UNKNOWN_COMPLEXITY_RANK,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<String> for Complexity {
    fn from(code: String) -> Self {
        Self::parse(&code)
    }
}

impl From<Complexity> for String {
    fn from(complexity: Complexity) -> Self {
        complexity.code().to_string()
    }
}

// ---------------------------------------------------------------------------
// TopicRecord / Batch
// ---------------------------------------------------------------------------

/// One catalog topic to be turned into a lesson document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    /// Module name as written in the catalog header.
    pub module: String,
    /// Topic title.
    pub topic: String,
    /// Difficulty code.
    pub complexity: Complexity,
    /// Output filename, `{module}--{topic}--{date}.md`.
    pub filename: String,
}

/// A contiguous slice of the ordered topic list handled by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based batch number.
    pub id: usize,
    pub records: Vec<TopicRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// A rendered lesson ready to be written to the output store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub filename: String,
    pub content: String,
    pub module_id: String,
    pub module_name: String,
}

/// Per-batch outcome reported by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub batch_id: usize,
    pub success_count: usize,
    /// Labelled messages, e.g. `Batch 3, Line 7: ...`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Navigation index
// ---------------------------------------------------------------------------

/// One lesson in the navigation index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEntry {
    pub slug: String,
    pub title: String,
    pub module_id: String,
    pub module_name: String,
    pub url: String,
}

/// All lessons of one module, in store enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNav {
    pub module_id: String,
    pub module_name: String,
    pub lesson_count: usize,
    pub lessons: Vec<NavigationEntry>,
}

/// Derived directory of generated lessons, keyed by module id.
///
/// Rebuilt wholesale from the output store; never authoritative for
/// document existence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NavigationIndex {
    pub modules: BTreeMap<String, ModuleNav>,
}

impl NavigationIndex {
    /// Total number of lessons across all modules.
    pub fn lesson_count(&self) -> usize {
        self.modules.values().map(|m| m.lessons.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Append an entry to its module, creating the module on first use.
    pub fn push(&mut self, entry: NavigationEntry) {
        let module = self
            .modules
            .entry(entry.module_id.clone())
            .or_insert_with(|| ModuleNav {
                module_id: entry.module_id.clone(),
                module_name: entry.module_name.clone(),
                lesson_count: 0,
                lessons: Vec::new(),
            });
        module.lessons.push(entry);
        module.lesson_count = module.lessons.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(module_id: &str, slug: &str) -> NavigationEntry {
        NavigationEntry {
            slug: slug.into(),
            title: slug.to_uppercase(),
            module_id: module_id.into(),
            module_name: format!("Module for {module_id}"),
            url: format!("/lessons/{slug}"),
        }
    }

    #[test]
    fn complexity_codes_and_ranks() {
        assert_eq!(Complexity::parse("F"), Complexity::Foundational);
        assert_eq!(Complexity::parse("I - A"), Complexity::IntermediateAdvanced);
        assert_eq!(Complexity::parse("A-E").code(), "A-E");
        assert!(Complexity::parse("F").rank() < Complexity::parse("F-I").rank());
        assert!(Complexity::parse("A-E").rank() < Complexity::parse("E").rank());

        let odd = Complexity::parse("X");
        assert_eq!(odd, Complexity::Other("X".into()));
        assert_eq!(odd.rank(), UNKNOWN_COMPLEXITY_RANK);
    }

    #[test]
    fn complexity_serializes_as_code() {
        let json = serde_json::to_string(&Complexity::FoundationalIntermediate).expect("serialize");
        assert_eq!(json, "\"F-I\"");
        let parsed: Complexity = serde_json::from_str("\"E\"").expect("deserialize");
        assert_eq!(parsed, Complexity::Expert);
    }

    #[test]
    fn navigation_index_groups_and_counts() {
        let mut index = NavigationIndex::default();
        index.push(entry("module-2", "joins"));
        index.push(entry("module-1", "keys"));
        index.push(entry("module-2", "ctes"));

        assert_eq!(index.modules.len(), 2);
        assert_eq!(index.lesson_count(), 3);

        let m2 = &index.modules["module-2"];
        assert_eq!(m2.lesson_count, 2);
        let slugs: Vec<_> = m2.lessons.iter().map(|l| l.slug.as_str()).collect();
        assert_eq!(slugs, ["joins", "ctes"]);
    }

    #[test]
    fn navigation_index_is_keyed_by_module_id() {
        let mut index = NavigationIndex::default();
        index.push(entry("module-1", "keys"));

        let value = serde_json::to_value(&index).expect("serialize");
        assert_eq!(value["module-1"]["lesson_count"], 1);
        assert_eq!(value["module-1"]["lessons"][0]["url"], "/lessons/keys");

        let parsed: NavigationIndex = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed, index);
    }
}
