//! Where change sets come from.

use crate::error::SourceError;
use crate::models::{ChangeId, RepoId, WorkUnit};
use crate::scanner::{FileScanner, ScanConfig};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Fetches the files of a change as a [`WorkUnit`].
#[async_trait]
pub trait ChangeSetProvider: Send + Sync {
    async fn fetch_change_set(&self, repo: &RepoId, change: &ChangeId) -> Result<WorkUnit, SourceError>;
}

/// Treats a local directory as the change set.
#[derive(Debug, Clone)]
pub struct LocalDirectoryProvider {
    root: PathBuf,
    scan: ScanConfig,
}

impl LocalDirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scan: ScanConfig::default(),
        }
    }

    pub fn with_scan_config(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }
}

#[async_trait]
impl ChangeSetProvider for LocalDirectoryProvider {
    async fn fetch_change_set(&self, repo: &RepoId, change: &ChangeId) -> Result<WorkUnit, SourceError> {
        let scanner = FileScanner::new(self.root.clone(), self.scan.clone());
        let collected = tokio::task::spawn_blocking(move || scanner.collect_files())
            .await
            .map_err(|e| SourceError::Scan(e.to_string()))??;

        info!(
            "Collected {} files from {} ({} skipped)",
            collected.files.len(),
            self.root.display(),
            collected.skipped.len()
        );
        Ok(WorkUnit::new(repo.clone(), change.clone(), collected.files)
            .with_skipped(collected.skipped))
    }
}
