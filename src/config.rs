use crate::errors::{AppError, AppResult};
use crate::models::DEFAULT_MAX_BACKUPS;
use crate::retry::{RetryPolicy, DEFAULT_BACKOFF_MS};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const VAULT_ROOT_ENV: &str = "VAULT_PATH";
pub const HOT_PATHS_ENV: &str = "VAULT_HOT_PATHS";

const MIN_MAX_AGE_DAYS: u32 = 1;
const MAX_MAX_AGE_DAYS: u32 = 3_650;
const MAX_CACHE_TTL_SECONDS: u64 = 86_400;
const MAX_BACKUPS_ALLOWED: usize = 50;
const MAX_RETRY_STEPS: usize = 10;
const MAX_RETRY_DELAY_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecencyRule {
    pub dir: String,
    pub max_age_days: u32,
}

impl RecencyRule {
    pub fn new(dir: impl Into<String>, max_age_days: u32) -> Self {
        Self {
            dir: dir.into(),
            max_age_days,
        }
    }
}

/// Which parts of the vault count as "live". Paths are relative to the vault
/// root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HotPathConfig {
    pub always_scan: Vec<String>,
    pub recency_scan: Vec<RecencyRule>,
    pub system_files: Vec<String>,
    pub cache_ttl_seconds: u64,
    pub max_backups: usize,
    pub retry_backoff_ms: Vec<u64>,
}

impl Default for HotPathConfig {
    fn default() -> Self {
        Self {
            always_scan: vec!["TaskNotes".to_string(), "Projects".to_string()],
            recency_scan: vec![RecencyRule::new("Emails", 14), RecencyRule::new("Daily", 7)],
            system_files: vec!["Dashboard.md".to_string()],
            cache_ttl_seconds: 60,
            max_backups: DEFAULT_MAX_BACKUPS,
            retry_backoff_ms: DEFAULT_BACKOFF_MS.to_vec(),
        }
    }
}

impl HotPathConfig {
    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("Failed to read {}: {}", path.to_string_lossy(), error)))?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> AppResult<()> {
        for dir in &self.always_scan {
            ensure_vault_relative(dir, "alwaysScan")?;
        }
        for rule in &self.recency_scan {
            ensure_vault_relative(&rule.dir, "recencyScan")?;
            if !(MIN_MAX_AGE_DAYS..=MAX_MAX_AGE_DAYS).contains(&rule.max_age_days) {
                return Err(AppError::Config(format!(
                    "recencyScan '{}' maxAgeDays must be between {} and {}",
                    rule.dir, MIN_MAX_AGE_DAYS, MAX_MAX_AGE_DAYS
                )));
            }
        }
        for file in &self.system_files {
            ensure_vault_relative(file, "systemFiles")?;
        }
        if self.cache_ttl_seconds > MAX_CACHE_TTL_SECONDS {
            return Err(AppError::Config(format!(
                "cacheTtlSeconds must be at most {}",
                MAX_CACHE_TTL_SECONDS
            )));
        }
        if self.max_backups > MAX_BACKUPS_ALLOWED {
            return Err(AppError::Config(format!(
                "maxBackups must be at most {}",
                MAX_BACKUPS_ALLOWED
            )));
        }
        if self.retry_backoff_ms.len() > MAX_RETRY_STEPS {
            return Err(AppError::Config(format!(
                "retryBackoffMs allows at most {} steps",
                MAX_RETRY_STEPS
            )));
        }
        if let Some(delay) = self.retry_backoff_ms.iter().find(|delay| **delay > MAX_RETRY_DELAY_MS) {
            return Err(AppError::Config(format!(
                "retryBackoffMs step {}ms exceeds {}ms",
                delay, MAX_RETRY_DELAY_MS
            )));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(&self.retry_backoff_ms)
    }
}

fn ensure_vault_relative(value: &str, field: &str) -> AppResult<()> {
    let normalized = value.replace('\\', "/");
    let path = Path::new(&normalized);
    if value.trim().is_empty() {
        return Err(AppError::Config(format!("{} entries cannot be empty", field)));
    }
    if path.is_absolute() || path.has_root() {
        return Err(AppError::Config(format!(
            "{} entry '{}' must be relative to the vault root",
            field, value
        )));
    }
    if path.components().any(|component| matches!(component, Component::ParentDir | Component::Prefix(_))) {
        return Err(AppError::Config(format!(
            "{} entry '{}' must not leave the vault root",
            field, value
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub vault_root: PathBuf,
    pub hot_paths: HotPathConfig,
}

impl VaultSettings {
    /// Reads `VAULT_PATH` and, when set, the YAML file named by
    /// `VAULT_HOT_PATHS`.
    pub fn from_env() -> AppResult<Self> {
        let vault_root = vault_root_from(std::env::var(VAULT_ROOT_ENV).ok())?;
        let hot_paths = match std::env::var(HOT_PATHS_ENV) {
            Ok(path) if !path.trim().is_empty() => HotPathConfig::load(Path::new(path.trim()))?,
            _ => HotPathConfig::default(),
        };
        Ok(Self { vault_root, hot_paths })
    }
}

pub fn vault_root_from(value: Option<String>) -> AppResult<PathBuf> {
    let Some(raw) = value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty()) else {
        return Err(AppError::Config(format!("{} is not set", VAULT_ROOT_ENV)));
    };
    let root = PathBuf::from(raw);
    if !root.is_absolute() {
        return Err(AppError::Config(format!(
            "{} must be an absolute path, got '{}'",
            VAULT_ROOT_ENV,
            root.to_string_lossy()
        )));
    }
    Ok(root)
}
