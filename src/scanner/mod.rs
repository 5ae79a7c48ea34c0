//! File scanner for discovering and filtering change-set files.
//!
//! Walks a directory tree and keeps files whose extension, size and path
//! pass the configured filters. Hidden entries and excluded directory names
//! are never descended into.

use crate::error::SourceError;
use crate::models::{SkipReason, SkippedFile, SourceFile};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for file scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// File extensions to include, without the dot.
    pub extensions: Vec<String>,
    /// File or directory names to skip (e.g. `__pycache__`, `.venv`).
    pub excludes: Vec<String>,
    /// Maximum file size in bytes.
    pub max_file_size: u64,
    /// Maximum number of files to collect.
    pub max_files: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            excludes: vec![
                ".git",
                "__pycache__",
                ".venv",
                "venv",
                ".tox",
                ".mypy_cache",
                ".pytest_cache",
                "build",
                "dist",
                "node_modules",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_file_size: 1024 * 1024, // 1MB
            max_files: None,
        }
    }
}

impl From<&crate::config::ScannerConfig> for ScanConfig {
    fn from(config: &crate::config::ScannerConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
            max_file_size: config.max_file_size,
            max_files: Some(config.max_files),
        }
    }
}

/// A file that passed the filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to the scan root, `/`-separated.
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

/// Files that passed the filters, plus the wanted files that did not fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Source files read from disk, plus every wanted file left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedFiles {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<SkippedFile>,
}

/// File scanner for discovering source files.
pub struct FileScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Scan for all matching files, sorted by path. Wanted files that are
    /// too large, over the count limit or cannot be stat'ed are reported
    /// in `skipped`.
    pub fn scan(&self) -> Result<ScanResult, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::NotFound(self.root.display().to_string()));
        }

        let mut result = ScanResult::default();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.has_wanted_extension(entry.path()) {
                continue;
            }
            let Some(path) = relative_path(&self.root, entry.path()) else {
                continue;
            };

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    debug!("Cannot stat {}: {}", path, e);
                    result.skipped.push(SkippedFile::new(
                        path,
                        SkipReason::Unreadable { error: e.to_string() },
                    ));
                    continue;
                }
            };
            if size > self.config.max_file_size {
                debug!("Skipping {} ({} bytes)", path, size);
                result.skipped.push(SkippedFile::new(
                    path,
                    SkipReason::TooLarge {
                        size,
                        limit: self.config.max_file_size,
                    },
                ));
                continue;
            }

            result.files.push(ScannedFile { path, size });
        }

        result.files.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(max) = self.config.max_files {
            if result.files.len() > max {
                warn!(
                    "Change set has {} files, keeping the first {}",
                    result.files.len(),
                    max
                );
                let dropped = result.files.split_off(max);
                result.skipped.extend(
                    dropped
                        .into_iter()
                        .map(|f| SkippedFile::new(f.path, SkipReason::OverFileLimit { limit: max })),
                );
            }
        }
        result.skipped.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(result)
    }

    /// Scan and read every matching file. Unreadable or non-UTF-8 files
    /// are skipped with a warning and listed alongside the scan's skips.
    pub fn collect_files(&self) -> Result<CollectedFiles, SourceError> {
        let scanned = self.scan()?;
        let mut collected = CollectedFiles {
            files: Vec::with_capacity(scanned.files.len()),
            skipped: scanned.skipped,
        };

        for file in scanned.files {
            let full_path = self.root.join(&file.path);
            match fs::read_to_string(&full_path) {
                Ok(content) => collected.files.push(SourceFile::new(file.path, content)),
                Err(e) => {
                    warn!("Failed to read {}: {}", file.path, e);
                    collected.skipped.push(SkippedFile::new(
                        file.path,
                        SkipReason::Unreadable { error: e.to_string() },
                    ));
                }
            }
        }
        collected.skipped.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(collected)
    }

    /// Check if a path would be picked up by the extension filter.
    pub fn has_wanted_extension(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.config.extensions.iter().any(|wanted| wanted == ext)
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.config.excludes.iter().any(|pattern| name == pattern.as_str())
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.py", "x = 1\n");
        write(dir.path(), "pkg/models.py", "class A:\n    pass\n");
        write(dir.path(), "pkg/README.md", "# docs\n");
        write(dir.path(), "__pycache__/app.cpython-311.py", "junk");
        write(dir.path(), ".venv/lib/site.py", "junk");
        write(dir.path(), ".hidden.py", "junk");
        dir
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = fixture();
        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());

        let result = scanner.scan().unwrap();
        let paths: Vec<String> = result.files.into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["app.py", "pkg/models.py"]);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_collect_files_reads_content() {
        let dir = fixture();
        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());

        let collected = scanner.collect_files().unwrap();
        assert_eq!(collected.files.len(), 2);
        assert_eq!(
            collected.files[1],
            SourceFile::new("pkg/models.py", "class A:\n    pass\n")
        );
    }

    #[test]
    fn test_size_and_count_limits() {
        let dir = fixture();
        write(dir.path(), "big.py", &"#".repeat(2048));

        let config = ScanConfig {
            max_file_size: 1024,
            ..ScanConfig::default()
        };
        let scanner = FileScanner::new(dir.path().to_path_buf(), config.clone());
        let result = scanner.scan().unwrap();
        assert!(result.files.iter().all(|f| f.path != "big.py"));
        assert_eq!(
            result.skipped,
            vec![SkippedFile::new(
                "big.py",
                SkipReason::TooLarge {
                    size: 2048,
                    limit: 1024
                }
            )]
        );

        let scanner = FileScanner::new(
            dir.path().to_path_buf(),
            ScanConfig {
                max_files: Some(1),
                ..config
            },
        );
        let result = scanner.scan().unwrap();
        assert_eq!(result.files.len(), 1);
        let skipped: Vec<(&str, &SkipReason)> = result
            .skipped
            .iter()
            .map(|s| (s.path.as_str(), &s.reason))
            .collect();
        assert_eq!(
            skipped,
            vec![
                (
                    "big.py",
                    &SkipReason::TooLarge {
                        size: 2048,
                        limit: 1024
                    }
                ),
                ("pkg/models.py", &SkipReason::OverFileLimit { limit: 1 }),
            ]
        );
    }

    #[test]
    fn test_non_utf8_file_is_listed_as_skipped() {
        let dir = fixture();
        fs::write(dir.path().join("latin1.py"), [b'#', b' ', 0xE9, b'\n']).unwrap();

        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let collected = scanner.collect_files().unwrap();

        assert_eq!(collected.files.len(), 2);
        assert_eq!(collected.skipped.len(), 1);
        assert_eq!(collected.skipped[0].path, "latin1.py");
        assert!(matches!(
            collected.skipped[0].reason,
            SkipReason::Unreadable { .. }
        ));
    }

    #[test]
    fn test_hidden_root_is_still_scanned() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".checkout/app.py", "x = 1\n");

        let scanner = FileScanner::new(dir.path().join(".checkout"), ScanConfig::default());
        assert_eq!(scanner.scan().unwrap().files.len(), 1);
    }

    #[test]
    fn test_missing_root() {
        let scanner = FileScanner::new(PathBuf::from("/definitely/not/here"), ScanConfig::default());
        assert!(matches!(scanner.scan(), Err(SourceError::NotFound(_))));
    }
}
