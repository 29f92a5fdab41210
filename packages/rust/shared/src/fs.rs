//! Filesystem helpers shared by every writer in the workspace.

use std::path::Path;

use crate::error::{LessonForgeError, Result};

/// Write `contents` to `path` via a sibling temp file and a rename, so a
/// reader sees either the old file or the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            LessonForgeError::validation(format!("not a file path: {}", path.display()))
        })?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| LessonForgeError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        LessonForgeError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_and_leaves_no_temp_file() {
        let dir = std::env::temp_dir().join(format!("lf-fs-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("index.json");

        write_atomic(&target, "first").unwrap();
        write_atomic(&target, "second").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        assert!(!dir.join(".index.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_paths_without_file_name() {
        assert!(write_atomic(Path::new("/"), "x").is_err());
    }
}
