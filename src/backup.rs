use crate::file_ops::RetryableFileOps;
use std::io;
use std::path::{Path, PathBuf};

/// `<name><ext>.bak.<index>` next to the target.
pub fn backup_path(target: &Path, index: usize) -> PathBuf {
    let mut name = target.file_name().map(|value| value.to_os_string()).unwrap_or_default();
    name.push(format!(".bak.{}", index));
    target.with_file_name(name)
}

/// Keeps `.bak.1` (newest) through `.bak.N` (oldest) alongside a file.
#[derive(Clone, Default)]
pub struct BackupRotator {
    files: RetryableFileOps,
}

impl BackupRotator {
    pub fn new(files: RetryableFileOps) -> Self {
        Self { files }
    }

    /// Shifts the chain up by one and copies the current target into slot 1.
    ///
    /// Returns `None` when there is nothing to preserve: the target does not
    /// exist yet, or `max_backups` is zero. Gaps left by an earlier partial
    /// rotation are skipped rather than treated as failures.
    pub async fn backup(&self, target: &Path, max_backups: usize) -> io::Result<Option<PathBuf>> {
        if max_backups == 0 || !self.files.exists(target).await? {
            return Ok(None);
        }

        let oldest = backup_path(target, max_backups);
        match self.files.remove_file(&oldest).await {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(error),
        }

        for index in (1..max_backups).rev() {
            let from = backup_path(target, index);
            let to = backup_path(target, index + 1);
            match self.files.rename(&from, &to).await {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %from.to_string_lossy(), "backup slot empty; skipping shift");
                }
                Err(error) => return Err(error),
            }
        }

        let newest = backup_path(target, 1);
        self.files.copy(target, &newest).await?;
        Ok(Some(newest))
    }

    /// Existing backups in index order, newest first. Gaps are omitted.
    pub async fn backups(&self, target: &Path, max_backups: usize) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for index in 1..=max_backups {
            let candidate = backup_path(target, index);
            if self.files.exists(&candidate).await? {
                found.push(candidate);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn backup_names_append_to_full_file_name() {
        let path = backup_path(Path::new("/vault/TaskNotes/x.md"), 3);
        assert_eq!(path, PathBuf::from("/vault/TaskNotes/x.md.bak.3"));
    }

    #[tokio::test]
    async fn missing_target_has_nothing_to_back_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rotator = BackupRotator::default();
        let result = rotator
            .backup(&dir.path().join("new.md"), 5)
            .await
            .expect("no error for missing target");
        assert!(result.is_none());
        assert!(fs::read_dir(dir.path()).expect("list").next().is_none());
    }

    #[tokio::test]
    async fn rotation_shifts_and_drops_oldest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("x.md");
        let rotator = BackupRotator::default();

        for version in 1..=4 {
            fs::write(&target, format!("v{}", version)).expect("write version");
            rotator.backup(&target, 2).await.expect("rotate");
        }

        assert_eq!(fs::read_to_string(backup_path(&target, 1)).expect("bak.1"), "v4");
        assert_eq!(fs::read_to_string(backup_path(&target, 2)).expect("bak.2"), "v3");
        assert!(!backup_path(&target, 3).exists());
    }

    #[tokio::test]
    async fn gaps_in_chain_are_tolerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("x.md");
        fs::write(&target, "current").expect("target");
        fs::write(backup_path(&target, 2), "older").expect("orphan bak.2");

        let rotator = BackupRotator::default();
        let newest = rotator.backup(&target, 5).await.expect("rotate").expect("backup made");

        assert_eq!(newest, backup_path(&target, 1));
        assert_eq!(fs::read_to_string(&newest).expect("bak.1"), "current");
        assert!(!backup_path(&target, 2).exists());
        assert_eq!(fs::read_to_string(backup_path(&target, 3)).expect("bak.3"), "older");

        let listed = rotator.backups(&target, 5).await.expect("list");
        assert_eq!(listed, vec![backup_path(&target, 1), backup_path(&target, 3)]);
    }

    #[tokio::test]
    async fn zero_max_disables_backups() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("x.md");
        fs::write(&target, "current").expect("target");
        let result = BackupRotator::default().backup(&target, 0).await.expect("no-op");
        assert!(result.is_none());
        assert!(!backup_path(&target, 1).exists());
    }
}
