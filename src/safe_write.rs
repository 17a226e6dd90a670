use crate::backup::{backup_path, BackupRotator};
use crate::errors::{AppError, AppResult};
use crate::file_ops::{FileOps, RetryableFileOps, TokioFileOps};
use crate::models::{SafeWriteResult, WriteOptions};
use crate::path_guard::{check_path_length, is_within_root, normalize_path};
use crate::retry::RetryPolicy;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Staging file for `target`, always in the same directory so the final copy
/// never crosses volumes.
pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|value| value.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Resolves `path` against `vault_root` and refuses anything outside it.
/// Relative paths are taken relative to the vault root, not the process.
pub fn resolve_target(path: &Path, vault_root: &Path) -> AppResult<PathBuf> {
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        vault_root.join(path)
    };
    let root = normalize_path(vault_root);
    let target = normalize_path(&candidate);

    if !is_within_root(&target, &root) {
        return Err(AppError::Traversal(format!(
            "Path traversal blocked: '{}' resolves to {} outside vault root {}",
            path.to_string_lossy(),
            target,
            root
        )));
    }
    if target.to_lowercase() == root.to_lowercase() {
        return Err(AppError::Traversal(format!(
            "Refusing to write over the vault root itself: {}",
            root
        )));
    }
    Ok(PathBuf::from(target))
}

struct StagedWrite {
    target: PathBuf,
    temp: PathBuf,
    existed: bool,
    backup: Option<PathBuf>,
    promoting: bool,
}

impl StagedWrite {
    fn new(target: PathBuf) -> Self {
        Self {
            temp: temp_path(&target),
            target,
            existed: false,
            backup: None,
            promoting: false,
        }
    }
}

/// The one durable write path for vault mutation.
///
/// The new content is staged in `<target>.tmp`, the previous version is
/// rotated into the backup chain, and the staged file is then *copied* over
/// the target. Rename is not used: on the synced drive it is not reliably
/// atomic, while copy composes with the backup step and can be undone by
/// copying the backup back.
#[derive(Clone, Default)]
pub struct SafeWriter {
    files: RetryableFileOps,
    rotator: BackupRotator,
}

impl SafeWriter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_file_ops(Arc::new(TokioFileOps), policy)
    }

    pub fn with_file_ops(ops: Arc<dyn FileOps>, policy: RetryPolicy) -> Self {
        let files = RetryableFileOps::new(ops, policy);
        Self {
            rotator: BackupRotator::new(files.clone()),
            files,
        }
    }

    pub fn rotator(&self) -> &BackupRotator {
        &self.rotator
    }

    pub async fn write(&self, path: impl AsRef<Path>, content: &str, options: &WriteOptions) -> SafeWriteResult {
        let path = path.as_ref();
        let target = match resolve_target(path, &options.vault_root) {
            Ok(target) => target,
            Err(error) => {
                tracing::warn!(path = %path.to_string_lossy(), error = %error, "blocked vault write");
                return SafeWriteResult::failed(&error, None);
            }
        };

        let warning = check_path_length(&target);
        if let Some(warning) = &warning {
            tracing::warn!(path = %target.to_string_lossy(), warning = %warning, "long vault path");
        }

        let mut staged = StagedWrite::new(target);
        match self.commit(&mut staged, content, options).await {
            Ok(()) => {
                self.discard_temp(&staged.temp).await;
                tracing::info!(
                    path = %staged.target.to_string_lossy(),
                    bytes = content.len(),
                    backup = ?staged.backup,
                    "vault file written"
                );
                SafeWriteResult::written(staged.backup, warning)
            }
            Err(error) => {
                tracing::warn!(path = %staged.target.to_string_lossy(), error = %error, "vault write failed");
                self.rollback(&staged).await;
                self.discard_temp(&staged.temp).await;
                SafeWriteResult::failed(&error, staged.backup)
            }
        }
    }

    /// Writes backup `index` of `path` back over it. The version being
    /// replaced goes through the normal rotation first.
    pub async fn restore(&self, path: impl AsRef<Path>, index: usize, options: &WriteOptions) -> SafeWriteResult {
        let path = path.as_ref();
        let target = match resolve_target(path, &options.vault_root) {
            Ok(target) => target,
            Err(error) => return SafeWriteResult::failed(&error, None),
        };
        let backup = backup_path(&target, index);
        let content = match self.files.read_to_string(&backup).await {
            Ok(content) => content,
            Err(error) => {
                let error = AppError::io(error, format!("reading backup {}", backup.to_string_lossy()));
                return SafeWriteResult::failed(&error, None);
            }
        };
        self.write(&target, &content, options).await
    }

    async fn commit(&self, staged: &mut StagedWrite, content: &str, options: &WriteOptions) -> AppResult<()> {
        if let Some(parent) = staged.target.parent() {
            self.files
                .create_dir_all(parent)
                .await
                .map_err(|error| AppError::io(error, format!("creating {}", parent.to_string_lossy())))?;
        }
        staged.existed = self
            .files
            .exists(&staged.target)
            .await
            .map_err(|error| AppError::io(error, format!("checking {}", staged.target.to_string_lossy())))?;

        self.stage(staged, content).await?;
        if options.backup {
            staged.backup = self
                .rotator
                .backup(&staged.target, options.max_backups)
                .await
                .map_err(|error| AppError::io(error, format!("backing up {}", staged.target.to_string_lossy())))?;
        }
        self.promote(staged).await
    }

    async fn stage(&self, staged: &StagedWrite, content: &str) -> AppResult<()> {
        self.files
            .write(&staged.temp, content.as_bytes())
            .await
            .map_err(|error| AppError::io(error, format!("staging {}", staged.temp.to_string_lossy())))
    }

    async fn promote(&self, staged: &mut StagedWrite) -> AppResult<()> {
        staged.promoting = true;
        self.files
            .copy(&staged.temp, &staged.target)
            .await
            .map(|_| ())
            .map_err(|error| AppError::io(error, format!("replacing {}", staged.target.to_string_lossy())))
    }

    /// Best effort. A failure here is logged; the backup stays on disk for a
    /// manual restore.
    async fn rollback(&self, staged: &StagedWrite) {
        if !staged.promoting {
            return;
        }
        let target = staged.target.to_string_lossy();
        match &staged.backup {
            Some(backup) => {
                if let Err(error) = self.files.copy(backup, &staged.target).await {
                    tracing::error!(
                        path = %target,
                        backup = %backup.to_string_lossy(),
                        error = %error,
                        "rollback failed; previous version remains in backup"
                    );
                }
            }
            None if !staged.existed => match self.files.remove_file(&staged.target).await {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => {
                    tracing::error!(path = %target, error = %error, "failed to remove partially written file");
                }
            },
            None => {
                tracing::warn!(path = %target, "write failed without a backup to roll back to");
            }
        }
    }

    async fn discard_temp(&self, temp: &Path) {
        match self.files.remove_file(temp).await {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::debug!(path = %temp.to_string_lossy(), error = %error, "leaving stale temp file");
            }
        }
    }
}
