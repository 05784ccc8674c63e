use crate::error::{OrchestratorError, Result};
use crate::process::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::cell::Cell;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Resolved source reference, built by the orchestrator from the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Repository { url: String, branch: Option<String> },
    Archive { path: PathBuf },
}

/// Source acquisition capability: reference in, local directory out
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn acquire(&self, execution_id: &str, source: &SourceRef) -> Result<PathBuf>;
}

/// Shallow-clones repositories into `<root>/<execution_id>/repo` and accepts
/// already-extracted archive directories as-is.
pub struct SourceAcquirer {
    runner: Arc<dyn CommandRunner>,
    workspace_root: PathBuf,
    clone_timeout: Duration,
}

impl SourceAcquirer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspace_root: impl Into<PathBuf>,
        clone_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            workspace_root: workspace_root.into(),
            clone_timeout,
        }
    }

    pub fn clone_dir(&self, execution_id: &str) -> PathBuf {
        self.workspace_root.join(execution_id).join("repo")
    }

    async fn clone_repository(
        &self,
        execution_id: &str,
        url: &str,
        branch: Option<&str>,
    ) -> Result<PathBuf> {
        let dest = self.clone_dir(execution_id);
        if dest.exists() {
            tokio::fs::remove_dir_all(&dest).await?;
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut spec = CommandSpec::new("git").args(["clone", "--depth", "1"]);
        if let Some(branch) = branch.filter(|b| !b.trim().is_empty()) {
            spec = spec.arg("--branch").arg(branch);
        }
        let spec = spec
            .arg(url)
            .arg(dest.to_string_lossy())
            .timeout(self.clone_timeout);

        info!("[{}] Cloning {}", execution_id, url);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            warn!("[{}] git clone exited with {:?}", execution_id, output.exit_code);
            return Err(OrchestratorError::SourceAcquisition(format!(
                "git clone failed: {}",
                output.diagnostic()
            )));
        }
        Ok(dest)
    }
}

#[async_trait]
impl SourceProvider for SourceAcquirer {
    async fn acquire(&self, execution_id: &str, source: &SourceRef) -> Result<PathBuf> {
        match source {
            SourceRef::Repository { url, branch } => {
                self.clone_repository(execution_id, url, branch.as_deref())
                    .await
            }
            SourceRef::Archive { path } => {
                let is_dir = tokio::fs::metadata(path)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if !is_dir {
                    return Err(OrchestratorError::SourceAcquisition(format!(
                        "invalid source path: {}",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
        }
    }
}

/// Default cap on the decompressed size of one uploaded archive (2 GiB)
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Unpack a gzip-compressed tar archive into `dest`.
///
/// The archive is streamed; reading stops once more than
/// `max_extracted_bytes` of tar data has been decompressed. Entries that would
/// land outside `dest` are rejected. When `dest` is created here it is removed
/// again on any failure, so no partial tree is left behind.
///
/// Returns the single top-level directory when the archive has one, otherwise
/// `dest`.
pub fn extract_archive(bytes: &[u8], dest: &Path, max_extracted_bytes: u64) -> Result<PathBuf> {
    let created = !dest.exists();
    std::fs::create_dir_all(dest)?;

    let result = unpack_capped(bytes, dest, max_extracted_bytes);
    if result.is_err() && created {
        if let Err(e) = std::fs::remove_dir_all(dest) {
            warn!("Failed to remove partial extraction {}: {}", dest.display(), e);
        }
    }
    result
}

fn unpack_capped(bytes: &[u8], dest: &Path, max_extracted_bytes: u64) -> Result<PathBuf> {
    let tripped = Cell::new(false);
    let reader = CappedReader {
        inner: flate2::read::MultiGzDecoder::new(bytes),
        remaining: max_extracted_bytes,
        tripped: &tripped,
    };
    let archive_error = |context: &str, e: std::io::Error| {
        if tripped.get() {
            OrchestratorError::Archive(format!(
                "archive exceeds {} bytes when extracted",
                max_extracted_bytes
            ))
        } else {
            OrchestratorError::Archive(format!("{}: {}", context, e))
        }
    };

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| archive_error("invalid tar data", e))?;

    let mut unpacked = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| archive_error("invalid tar entry", e))?;
        let path = entry
            .path()
            .map_err(|e| archive_error("invalid entry path", e))?
            .into_owned();
        if escapes_root(&path) {
            return Err(OrchestratorError::Archive(format!(
                "entry escapes extraction directory: {}",
                path.display()
            )));
        }
        entry
            .unpack_in(dest)
            .map_err(|e| archive_error(&format!("failed to unpack {}", path.display()), e))?;
        unpacked += 1;
    }
    if unpacked == 0 {
        return Err(OrchestratorError::Archive("archive has no entries".to_string()));
    }

    single_top_level_dir(dest)
}

/// Fails the read once more than `remaining` bytes have come through
struct CappedReader<'a, R> {
    inner: R,
    remaining: u64,
    tripped: &'a Cell<bool>,
}

impl<R: Read> Read for CappedReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        match self.remaining.checked_sub(n as u64) {
            Some(left) => {
                self.remaining = left;
                Ok(n)
            }
            None => {
                self.tripped.set(true);
                Err(std::io::Error::other("extraction size limit exceeded"))
            }
        }
    }
}

fn escapes_root(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

fn single_top_level_dir(dest: &Path) -> Result<PathBuf> {
    let mut children = std::fs::read_dir(dest)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect::<Vec<_>>();
    if children.len() == 1 && children[0].is_dir() {
        return Ok(children.remove(0));
    }
    Ok(dest.to_path_buf())
}
