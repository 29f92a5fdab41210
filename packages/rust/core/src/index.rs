//! Navigation index builder.
//!
//! Scans the output store, maps each lesson filename to its module through
//! the module table, reads the first `# heading` as the title, and groups the
//! results by module. The index is rebuilt from scratch every time and
//! written as a single file with an atomic replace.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use lessonforge_markdown::extract_title;
use lessonforge_shared::{
    IndexConfig, LessonForgeError, ModuleTable, NavigationEntry, NavigationIndex, Result,
};

use crate::store::{OutputStore, write_json};

const SEGMENT_SEPARATOR: &str = "--";

/// Slug of a `{module}--{slug}--{date}.md` filename.
///
/// With three or more segments the slug is everything between the first and
/// the last segment, rejoined with `--`. With exactly two it is the second.
/// Anything else falls back to the whole stem.
pub fn slug_from_filename(filename: &str) -> String {
    let stem = filename.strip_suffix(".md").unwrap_or(filename);
    let parts: Vec<&str> = stem.split(SEGMENT_SEPARATOR).collect();

    match parts.len() {
        0 | 1 => stem.to_string(),
        2 => parts[1].to_string(),
        n => parts[1..n - 1].join(SEGMENT_SEPARATOR),
    }
}

/// Builds a [`NavigationIndex`] from an [`OutputStore`].
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    table: Arc<ModuleTable>,
    url_prefix: String,
    read_concurrency: usize,
    untitled_title: String,
}

impl IndexBuilder {
    pub fn new(config: &IndexConfig, table: Arc<ModuleTable>) -> Self {
        Self {
            table,
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
            read_concurrency: config.read_concurrency.max(1),
            untitled_title: config.untitled_title.clone(),
        }
    }

    fn lesson_url(&self, slug: &str) -> String {
        format!("{}/{slug}", self.url_prefix)
    }

    /// Build the index. Only an unlistable store is an error; unmatched or
    /// unreadable documents are skipped.
    #[instrument(skip_all, fields(store = %store.root().display()))]
    pub async fn build(&self, store: &OutputStore) -> Result<NavigationIndex> {
        let filenames = store.list_documents()?;
        let semaphore = Arc::new(Semaphore::new(self.read_concurrency));

        let mut unmatched = 0usize;
        let mut handles = Vec::with_capacity(filenames.len());

        for filename in filenames {
            let Some(module) = self.table.resolve(&filename) else {
                debug!(%filename, "no module prefix matches, excluded");
                unmatched += 1;
                continue;
            };
            let module_id = module.id.clone();
            let module_name = module.name.clone();

            let path = store.path_of(&filename);
            let sem = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
                tokio::fs::read_to_string(&path).await
            });
            handles.push((filename, module_id, module_name, handle));
        }

        // Joined in enumeration order, so entry order never depends on
        // which read finished first.
        let mut index = NavigationIndex::default();
        let mut skipped = 0usize;
        for (filename, module_id, module_name, handle) in handles {
            let content = match handle.await {
                Ok(Ok(content)) => content,
                Ok(Err(e)) => {
                    warn!(%filename, error = %e, "unreadable document, skipped");
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(%filename, error = %e, "read task failed, skipped");
                    skipped += 1;
                    continue;
                }
            };

            let slug = slug_from_filename(&filename);
            let title = extract_title(&content).unwrap_or_else(|| self.untitled_title.clone());
            index.push(NavigationEntry {
                url: self.lesson_url(&slug),
                slug,
                title,
                module_id,
                module_name,
            });
        }

        info!(
            modules = index.modules.len(),
            lessons = index.lesson_count(),
            unmatched,
            skipped,
            "navigation index built"
        );
        Ok(index)
    }
}

/// Replace the index artifact at `path`.
pub fn write_index(path: &Path, index: &NavigationIndex) -> Result<()> {
    write_json(path, index)?;
    debug!(path = %path.display(), "navigation index written");
    Ok(())
}

/// Load a previously written index artifact.
pub fn load_index(path: &Path) -> Result<NavigationIndex> {
    let content = std::fs::read_to_string(path).map_err(|e| LessonForgeError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        LessonForgeError::parse(format!("invalid navigation index {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessonforge_shared::{AppConfig, GeneratedDocument};

    fn temp_store() -> OutputStore {
        let dir = std::env::temp_dir().join(format!("lf-index-{}", uuid::Uuid::now_v7()));
        OutputStore::open(dir).unwrap()
    }

    fn builder() -> IndexBuilder {
        let config = IndexConfig::from(&AppConfig::default());
        IndexBuilder::new(&config, Arc::new(ModuleTable::builtin()))
    }

    fn put(store: &OutputStore, filename: &str, content: &str) {
        store
            .write_document(&GeneratedDocument {
                filename: filename.into(),
                content: content.into(),
                module_id: String::new(),
                module_name: String::new(),
            })
            .unwrap();
    }

    #[test]
    fn slug_rules() {
        assert_eq!(slug_from_filename("Data-Modeling--star-schema--2024-10-30.md"), "star-schema");
        assert_eq!(
            slug_from_filename("Data-Modeling--scd--type-2--2024-10-30.md"),
            "scd--type-2"
        );
        assert_eq!(slug_from_filename("Data-Modeling--keys.md"), "keys");
        assert_eq!(slug_from_filename("overview.md"), "overview");
        assert_eq!(slug_from_filename("overview"), "overview");
    }

    #[tokio::test]
    async fn groups_by_module_in_filename_order() {
        let store = temp_store();
        put(&store, "Data-Modeling--star-schema--2024-10-30.md", "# Star Schema\n");
        put(&store, "Data-Modeling--keys--2024-10-30.md", "# Keys\n");
        put(&store, "SQL-ELT-Concepts--joins--2024-10-30.md", "# Joins\n");

        let index = builder().build(&store).await.unwrap();
        assert_eq!(index.modules.len(), 2);

        let modeling = &index.modules["module-4"];
        assert_eq!(modeling.module_name, "Module 4: Data Modeling");
        assert_eq!(modeling.lesson_count, 2);
        let slugs: Vec<&str> = modeling.lessons.iter().map(|l| l.slug.as_str()).collect();
        assert_eq!(slugs, vec!["keys", "star-schema"]);
        assert_eq!(modeling.lessons[0].url, "/lessons/keys");
        assert_eq!(modeling.lessons[0].title, "Keys");

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn unknown_prefix_is_excluded() {
        let store = temp_store();
        put(&store, "Cooking-Basics--knife-skills--2024-10-30.md", "# Knives\n");
        put(&store, "Data-Modeling--keys--2024-10-30.md", "# Keys\n");

        let index = builder().build(&store).await.unwrap();
        assert_eq!(index.lesson_count(), 1);
        assert!(index.modules.values().all(|m| m.module_id != "unmapped"));

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn missing_heading_gets_placeholder() {
        let store = temp_store();
        put(&store, "Data-Modeling--keys--2024-10-30.md", "no heading here\n## Sub\n");

        let index = builder().build(&store).await.unwrap();
        assert_eq!(index.modules["module-4"].lessons[0].title, "Untitled Lesson");

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn unreadable_document_is_skipped() {
        let store = temp_store();
        put(&store, "Data-Modeling--keys--2024-10-30.md", "# Keys\n");
        std::fs::write(
            store.path_of("Data-Modeling--binary--2024-10-30.md"),
            [0xff, 0xfe, 0x00, 0x80],
        )
        .unwrap();

        let index = builder().build(&store).await.unwrap();
        assert_eq!(index.lesson_count(), 1);
        assert_eq!(index.modules["module-4"].lessons[0].slug, "keys");

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn rebuild_is_identical_and_round_trips() {
        let store = temp_store();
        for i in 0..12 {
            put(
                &store,
                &format!("Reporting-BI-Concepts--topic-{i:02}--2024-10-30.md"),
                &format!("# Topic {i}\n"),
            );
        }

        let first = builder().build(&store).await.unwrap();
        let second = builder().build(&store).await.unwrap();
        assert_eq!(first, second);

        let path = store.root().join("lesson_navigation_map.json");
        write_index(&path, &first).unwrap();
        assert_eq!(load_index(&path).unwrap(), first);

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn load_missing_index_fails() {
        let path = std::env::temp_dir().join(format!("lf-no-index-{}.json", uuid::Uuid::now_v7()));
        assert!(load_index(&path).is_err());
    }
}
