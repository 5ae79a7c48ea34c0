//! Scratch directories for analyzers that shell out to external tools.

use crate::models::WorkUnit;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

/// Write every file of the unit below a fresh temporary directory.
///
/// Returns the directory handle (removed on drop) and the relative paths
/// that were written, in unit order. Two files landing on the same
/// relative path is an `AlreadyExists` error.
pub(crate) fn materialize(unit: &WorkUnit) -> io::Result<(TempDir, Vec<PathBuf>)> {
    let dir = tempfile::Builder::new().prefix("reviewgate-").tempdir()?;
    let mut written = Vec::with_capacity(unit.files.len());

    for file in &unit.files {
        let relative = PathBuf::from(file.normalized_path());
        if relative.as_os_str().is_empty() {
            continue;
        }
        if written.contains(&relative) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} collides with an earlier file", file.path),
            ));
        }
        let target = dir.path().join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &file.content)?;
        written.push(relative);
    }

    Ok((dir, written))
}

/// Keep only normal path components so nothing escapes the scratch dir.
fn confine(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Map a tool-reported path back to the unit's path, if it is one of ours.
pub(crate) fn unit_path(unit: &WorkUnit, reported: &str) -> Option<String> {
    let reported = confine(reported);
    unit.files
        .iter()
        .find(|f| confine(&f.path) == reported)
        .map(|f| f.path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepoId, SourceFile};

    fn unit() -> WorkUnit {
        WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![
                SourceFile::new("pkg/app.py", "print('hi')\n"),
                SourceFile::new("../escape.py", "x = 1\n"),
            ],
        )
    }

    #[test]
    fn test_materialize_writes_files_inside_dir() {
        let (dir, written) = materialize(&unit()).unwrap();

        assert_eq!(written, vec![PathBuf::from("pkg/app.py"), PathBuf::from("escape.py")]);
        let content = fs::read_to_string(dir.path().join("pkg/app.py")).unwrap();
        assert_eq!(content, "print('hi')\n");
        assert!(dir.path().join("escape.py").exists());
    }

    #[test]
    fn test_materialize_rejects_colliding_paths() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![SourceFile::new("a.py", "x = 1\n"), SourceFile::new("./a.py", "x = 2\n")],
        );

        let err = materialize(&unit).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_unit_path_lookup() {
        let unit = unit();
        assert_eq!(unit_path(&unit, "./pkg/app.py"), Some("pkg/app.py".to_string()));
        assert_eq!(unit_path(&unit, "other.py"), None);
    }
}
