use crate::config::{HotPathConfig, VaultSettings};
use crate::errors::{AppError, AppResult};
use crate::models::{SafeWriteResult, ScanResult, VaultHealth, WriteOptions};
use crate::path_guard::{is_within_root, normalize_path, relative_to_root};
use crate::retry::{with_retry, RetryPolicy};
use crate::safe_write::SafeWriter;
use crate::scanner::HotPathScanner;
use std::path::{Path, PathBuf};

/// One vault root with its scanner and writer. Every path handed in is checked
/// against the root before any I/O happens.
pub struct Vault {
    root: PathBuf,
    scanner: HotPathScanner,
    writer: SafeWriter,
    policy: RetryPolicy,
    max_backups: usize,
}

impl Vault {
    pub fn new(root: impl AsRef<Path>, config: HotPathConfig) -> Self {
        let writer = SafeWriter::new(config.retry_policy());
        Self::with_writer(root, config, writer)
    }

    pub fn with_writer(root: impl AsRef<Path>, config: HotPathConfig, writer: SafeWriter) -> Self {
        Self {
            root: PathBuf::from(normalize_path(root)),
            policy: config.retry_policy(),
            max_backups: config.max_backups,
            scanner: HotPathScanner::new(config),
            writer,
        }
    }

    pub fn from_settings(settings: VaultSettings) -> Self {
        Self::new(&settings.vault_root, settings.hot_paths)
    }

    pub fn from_env() -> AppResult<Self> {
        Ok(Self::from_settings(VaultSettings::from_env()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scanner(&self) -> &HotPathScanner {
        &self.scanner
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions::new(&self.root).with_max_backups(self.max_backups)
    }

    pub async fn snapshot(&self) -> ScanResult {
        self.scanner.scan(&self.root).await
    }

    pub fn invalidate_cache(&self) {
        self.scanner.invalidate();
    }

    /// Absolute, normalized form of `path`. Relative input is taken from the
    /// vault root. The root itself is allowed here; writes refuse it separately.
    pub fn resolve(&self, path: impl AsRef<Path>) -> AppResult<PathBuf> {
        let path = path.as_ref();
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = normalize_path(&candidate);
        if !is_within_root(&resolved, &self.root) {
            tracing::warn!(path = %path.to_string_lossy(), root = %self.root.to_string_lossy(), "blocked vault access");
            return Err(AppError::Traversal(format!(
                "Path traversal blocked: '{}' resolves outside vault root",
                path.to_string_lossy()
            )));
        }
        Ok(PathBuf::from(resolved))
    }

    pub async fn read_file(&self, path: impl AsRef<Path>) -> AppResult<String> {
        let target = self.resolve(path)?;
        let source = &target;
        with_retry(&self.policy, "read", move || tokio::fs::read_to_string(source))
            .await
            .map_err(|error| AppError::io(error, format!("reading {}", target.to_string_lossy())))
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> AppResult<bool> {
        let target = self.resolve(path)?;
        tokio::fs::try_exists(&target)
            .await
            .map_err(|error| AppError::io(error, format!("checking {}", target.to_string_lossy())))
    }

    /// Vault-relative paths of the directory's direct children, sorted.
    pub async fn list_dir(&self, path: impl AsRef<Path>) -> AppResult<Vec<String>> {
        let dir = self.resolve(path)?;
        let context = || format!("listing {}", dir.to_string_lossy());
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|error| AppError::io(error, context()))?;

        let mut listed = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| AppError::io(error, context()))?
        {
            if let Some(relative) = relative_to_root(entry.path(), &self.root) {
                listed.push(relative);
            }
        }
        listed.sort();
        Ok(listed)
    }

    /// Durable write through [`SafeWriter`]. A successful write drops the scan
    /// cache so the next snapshot sees it.
    pub async fn write_file(&self, path: impl AsRef<Path>, content: &str) -> SafeWriteResult {
        let result = self.writer.write(path, content, &self.write_options()).await;
        if result.success {
            self.scanner.invalidate();
        }
        result
    }

    pub async fn restore_backup(&self, path: impl AsRef<Path>, index: usize) -> SafeWriteResult {
        let result = self.writer.restore(path, index, &self.write_options()).await;
        if result.success {
            self.scanner.invalidate();
        }
        result
    }

    pub async fn backups(&self, path: impl AsRef<Path>) -> AppResult<Vec<String>> {
        let target = self.resolve(path)?;
        let found = self
            .writer
            .rotator()
            .backups(&target, self.max_backups)
            .await
            .map_err(|error| AppError::io(error, format!("listing backups of {}", target.to_string_lossy())))?;
        Ok(found.iter().map(normalize_path).collect())
    }

    pub async fn health(&self) -> VaultHealth {
        let vault_accessible = tokio::fs::metadata(&self.root)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);
        let ttl = self.scanner.config().cache_ttl();
        let cached = self.scanner.cache().peek();

        let message = match &cached {
            _ if !vault_accessible => Some(format!("Vault root {} is not reachable", self.root.to_string_lossy())),
            Some((_, age)) if *age >= ttl => Some("Cached scan is stale; the next snapshot rescans".to_string()),
            None => Some("No scan cached yet".to_string()),
            Some(_) => None,
        };

        VaultHealth {
            vault_root: self.root.to_string_lossy().to_string(),
            vault_accessible,
            last_scan_at: cached.as_ref().map(|(result, _)| result.scanned_at),
            cache_age_seconds: cached.as_ref().map(|(_, age)| age.as_secs()),
            cache_ttl_seconds: ttl.as_secs(),
            cached_file_count: cached.as_ref().map(|(result, _)| result.scanned_count),
            message,
        }
    }
}
