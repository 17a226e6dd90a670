mod backup;
mod config;
mod errors;
mod file_ops;
mod models;
mod path_guard;
mod retry;
mod safe_write;
mod scanner;
mod vault;

pub use crate::backup::{backup_path, BackupRotator};
pub use crate::config::{vault_root_from, HotPathConfig, RecencyRule, VaultSettings, HOT_PATHS_ENV, VAULT_ROOT_ENV};
pub use crate::errors::{AppError, AppResult, FailureKind};
pub use crate::file_ops::{FileOps, IoFuture, RetryableFileOps, TokioFileOps};
pub use crate::models::{
    SafeWriteResult, ScanResult, ScanSource, VaultFile, VaultHealth, WriteOptions, DEFAULT_MAX_BACKUPS,
};
pub use crate::path_guard::{check_path_length, is_within_root, normalize_path, relative_to_root, MAX_PATH_CHARS};
pub use crate::retry::{is_transient_lock_error, with_retry, with_retry_if, RetryPolicy, DEFAULT_BACKOFF_MS};
pub use crate::safe_write::{resolve_target, temp_path, SafeWriter};
pub use crate::scanner::{HotPathScanner, ScanCache, ScanOutcome, SkipReason, Skipped};
pub use crate::vault::Vault;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Writes `content` to `path` with the default retry schedule. See
/// [`SafeWriter::write`].
pub async fn safe_write_file(path: impl AsRef<Path>, content: &str, options: &WriteOptions) -> SafeWriteResult {
    SafeWriter::default().write(path, content, options).await
}

/// Installs a JSON subscriber writing to `<log_dir>/vault.log`, rolled daily.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(log_dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(log_dir).map_err(|error| AppError::io(error, "creating log directory"))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "vault.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
