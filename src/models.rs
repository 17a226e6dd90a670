use crate::errors::{AppError, FailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Which hot-path rule put a file into a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanSource {
    Always,
    Recency,
    System,
}

impl ScanSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Recency => "recency",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultFile {
    pub path: String,
    pub name: String,
    pub relative_path: String,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub source: ScanSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub files: Vec<VaultFile>,
    pub scanned_count: usize,
    pub always_count: usize,
    pub recency_count: usize,
    pub system_count: usize,
    pub skipped_count: usize,
    pub duration_ms: u64,
    pub scanned_at: DateTime<Utc>,
    /// Set only when the result was served from the cache; holds the time of
    /// the scan that populated it.
    pub cached_at: Option<DateTime<Utc>>,
}

impl ScanResult {
    pub fn from_cache(&self) -> bool {
        self.cached_at.is_some()
    }

    pub fn by_source(&self, source: ScanSource) -> impl Iterator<Item = &VaultFile> {
        self.files.iter().filter(move |file| file.source == source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub vault_root: PathBuf,
    pub backup: bool,
    pub max_backups: usize,
}

impl WriteOptions {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self {
            vault_root: vault_root.into(),
            backup: true,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn without_backup(mut self) -> Self {
        self.backup = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeWriteResult {
    pub success: bool,
    pub backup_path: Option<String>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub warning: Option<String>,
}

impl SafeWriteResult {
    pub fn written(backup_path: Option<PathBuf>, warning: Option<String>) -> Self {
        Self {
            success: true,
            backup_path: backup_path.map(|path| path.to_string_lossy().to_string()),
            error: None,
            failure: None,
            warning,
        }
    }

    pub fn failed(error: &AppError, backup_path: Option<PathBuf>) -> Self {
        Self {
            success: false,
            backup_path: backup_path.map(|path| path.to_string_lossy().to_string()),
            error: Some(error.to_string()),
            failure: Some(error.kind()),
            warning: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultHealth {
    pub vault_root: String,
    pub vault_accessible: bool,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub cache_age_seconds: Option<u64>,
    pub cache_ttl_seconds: u64,
    pub cached_file_count: Option<usize>,
    pub message: Option<String>,
}
