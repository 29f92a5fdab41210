//! Topic record → lesson document rendering.

use tracing::debug;

use lessonforge_shared::{Complexity, LessonForgeError, Result, TopicRecord};

/// Turns one topic record into the full text of its lesson document.
///
/// Implementations must be pure: the same record always renders to the same
/// text, so re-running generation converges on identical files.
pub trait ContentRenderer: Send + Sync {
    fn render(&self, record: &TopicRecord) -> Result<String>;
}

/// Human label for a complexity code, keyed on its simplest level.
pub fn complexity_label(complexity: &Complexity) -> &'static str {
    let code = complexity.code();
    if code.contains('F') {
        "Foundational concepts"
    } else if code.contains('I') {
        "Intermediate application"
    } else if code.contains('A') {
        "Advanced implementation"
    } else {
        "Expert-level knowledge"
    }
}

/// Built-in Markdown lesson layout.
#[derive(Debug, Clone, Default)]
pub struct LessonTemplate;

impl LessonTemplate {
    pub fn new() -> Self {
        Self
    }
}

impl ContentRenderer for LessonTemplate {
    fn render(&self, record: &TopicRecord) -> Result<String> {
        let topic = record.topic.trim();
        let module = record.module.trim();
        if topic.is_empty() {
            return Err(LessonForgeError::Render(format!(
                "empty topic for {}",
                record.filename
            )));
        }
        if module.is_empty() {
            return Err(LessonForgeError::Render(format!(
                "empty module for {}",
                record.filename
            )));
        }

        // "Normalization (1NF, 2NF)" is asked about as "Normalization"
        let short = topic.split('(').next().unwrap_or(topic).trim();
        let code = record.complexity.code();
        let label = complexity_label(&record.complexity);

        let doc = format!(
            "# {topic}

## **What is {short}?**

{topic} is a core concept for data warehouse and reporting engineers.

**Key Importance:**
- Essential for data engineering workflows
- Critical for data quality and integrity
- Required knowledge for {module_lower} expertise

**Complexity Level:** [{code}] - {label}

------

## **Core Concepts**

### Theory

{topic} shows up in dimensional modeling, ELT pipelines, data quality checks and query tuning.

### Real-World Applications

**Scenario 1: Data Warehouse Implementation**
```sql
-- Example implementation showing {topic} in practice
CREATE TABLE example_table (
    id INTEGER PRIMARY KEY,
    name VARCHAR(255),
    created_date TIMESTAMP
);
```

**Scenario 2: ETL Pipeline Context**
```sql
-- Step 1: Extract
-- Step 2: Transform
-- Step 3: Load
```

------

## **Best Practices**

✅ **Do:**
- Follow platform documentation guidelines
- Monitor performance metrics
- Document implementation decisions

❌ **Avoid:**
- Common antipatterns
- Unbounded full-table scans

------

## **Hands-On Exercises**

### Exercise 1: Basic Implementation
Apply {short} to a small sample dataset and verify the result.

### Exercise 2: Advanced Application
Combine {short} with another technique from {module}.

### Exercise 3: Troubleshooting
Diagnose a failing pipeline step caused by a misuse of {short}.

------

## **Key Takeaways**

- {topic} is part of the {module} module
- Practice on realistic data before production use
- Revisit this lesson after the related topics in the module
",
            module_lower = module.to_lowercase(),
        );

        debug!(filename = %record.filename, bytes = doc.len(), "rendered lesson");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract_title;

    fn record(topic: &str, code: &str) -> TopicRecord {
        TopicRecord {
            module: "Data & Database Fundamentals".into(),
            topic: topic.into(),
            complexity: Complexity::parse(code),
            filename: "Data-Database-Fundamentals--x--2024-10-30.md".into(),
        }
    }

    #[test]
    fn first_line_is_topic_heading() {
        let doc = LessonTemplate::new().render(&record("Normalization (1NF, 2NF)", "I")).unwrap();
        assert_eq!(doc.lines().next(), Some("# Normalization (1NF, 2NF)"));
        assert_eq!(extract_title(&doc).as_deref(), Some("Normalization (1NF, 2NF)"));
        assert!(doc.contains("## **What is Normalization?**"));
        assert!(doc.contains("[I] - Intermediate application"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let r = record("Window Functions", "I-A");
        let t = LessonTemplate::new();
        assert_eq!(t.render(&r).unwrap(), t.render(&r).unwrap());
    }

    #[test]
    fn empty_fields_fail() {
        let t = LessonTemplate::new();
        assert!(matches!(t.render(&record("  ", "F")), Err(LessonForgeError::Render(_))));

        let mut r = record("Keys", "F");
        r.module.clear();
        assert!(t.render(&r).is_err());
    }

    #[test]
    fn labels_follow_simplest_level() {
        assert_eq!(complexity_label(&Complexity::Foundational), "Foundational concepts");
        assert_eq!(
            complexity_label(&Complexity::FoundationalIntermediate),
            "Foundational concepts"
        );
        assert_eq!(complexity_label(&Complexity::IntermediateAdvanced), "Intermediate application");
        assert_eq!(complexity_label(&Complexity::AdvancedExpert), "Advanced implementation");
        assert_eq!(complexity_label(&Complexity::Expert), "Expert-level knowledge");
    }
}
