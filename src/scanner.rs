use crate::config::HotPathConfig;
use crate::models::{ScanResult, ScanSource, VaultFile};
use crate::path_guard::{is_within_root, normalize_path, relative_to_root};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

const MARKDOWN_EXTENSION: &str = "md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Missing,
    Unreadable(String),
    NotAFile,
    /// Older than the directory's recency window.
    Stale,
    OutsideRoot,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Unreadable(message) => write!(f, "unreadable: {}", message),
            Self::NotAFile => write!(f, "not a regular file"),
            Self::Stale => write!(f, "outside recency window"),
            Self::OutsideRoot => write!(f, "resolves outside vault root"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub path: PathBuf,
    pub source: ScanSource,
    pub reason: SkipReason,
}

impl Skipped {
    fn new(path: PathBuf, source: ScanSource, reason: SkipReason) -> Self {
        Self { path, source, reason }
    }

    fn from_io(path: PathBuf, source: ScanSource, error: &io::Error) -> Self {
        let reason = if error.kind() == io::ErrorKind::NotFound {
            SkipReason::Missing
        } else {
            SkipReason::Unreadable(error.to_string())
        };
        Self::new(path, source, reason)
    }
}

/// One visited entry. Skips are values, so a partially synced vault yields a
/// shorter list instead of an error.
pub type ScanOutcome = Result<VaultFile, Skipped>;

struct CachedScan {
    root_key: String,
    stored_at: Instant,
    result: Arc<ScanResult>,
}

/// Single-slot memo for the last scan. The slot is only ever replaced whole.
#[derive(Default)]
pub struct ScanCache {
    slot: RwLock<Option<CachedScan>>,
}

impl ScanCache {
    pub fn get(&self, root: &str, ttl: Duration) -> Option<ScanResult> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        let cached = slot.as_ref()?;
        if cached.root_key != root.to_lowercase() || cached.stored_at.elapsed() >= ttl {
            return None;
        }
        let mut result = ScanResult::clone(&cached.result);
        result.cached_at = Some(cached.result.scanned_at);
        Some(result)
    }

    pub fn set(&self, root: &str, result: ScanResult) {
        let entry = CachedScan {
            root_key: root.to_lowercase(),
            stored_at: Instant::now(),
            result: Arc::new(result),
        };
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
    }

    pub fn invalidate(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Last stored result and its age, regardless of TTL.
    pub fn peek(&self) -> Option<(Arc<ScanResult>, Duration)> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .map(|cached| (Arc::clone(&cached.result), cached.stored_at.elapsed()))
    }
}

/// Bounded scan of the vault's hot paths.
///
/// Only the configured directories are listed, and never recursively, so the
/// cost tracks the size of the whitelisted directories plus the number of
/// recently modified files, not the size of the vault.
pub struct HotPathScanner {
    config: HotPathConfig,
    cache: ScanCache,
}

impl HotPathScanner {
    pub fn new(config: HotPathConfig) -> Self {
        Self {
            config,
            cache: ScanCache::default(),
        }
    }

    pub fn config(&self) -> &HotPathConfig {
        &self.config
    }

    pub fn cache(&self) -> &ScanCache {
        &self.cache
    }

    /// Serves the cached snapshot while it is younger than the TTL; otherwise
    /// rescans in the caller's task.
    pub async fn scan(&self, root: impl AsRef<Path>) -> ScanResult {
        let root_key = normalize_path(root);
        if let Some(cached) = self.cache.get(&root_key, self.config.cache_ttl()) {
            tracing::debug!(root = %root_key, files = cached.scanned_count, "serving cached vault scan");
            return cached;
        }

        let started = Instant::now();
        let scanned_at = Utc::now();
        let outcomes = self.collect_outcomes(Path::new(&root_key), scanned_at).await;
        let result = assemble(outcomes, started, scanned_at);
        tracing::info!(
            root = %root_key,
            files = result.scanned_count,
            skipped = result.skipped_count,
            duration_ms = result.duration_ms,
            "vault scan complete"
        );
        self.cache.set(&root_key, result.clone());
        result
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Every entry the hot-path rules visit, kept or skipped, in rule order.
    pub async fn collect_outcomes(&self, root: &Path, now: DateTime<Utc>) -> Vec<ScanOutcome> {
        let mut outcomes = Vec::new();
        for dir in &self.config.always_scan {
            walk_dir(root, dir, ScanSource::Always, None, &mut outcomes).await;
        }
        for rule in &self.config.recency_scan {
            let cutoff = recency_cutoff(now, rule.max_age_days);
            if cutoff.is_none() {
                tracing::warn!(dir = %rule.dir, max_age_days = rule.max_age_days, "recency window out of range; listing without cutoff");
            }
            walk_dir(root, &rule.dir, ScanSource::Recency, cutoff, &mut outcomes).await;
        }
        for file in &self.config.system_files {
            let path = root.join(file.replace('\\', "/"));
            if !is_within_root(&path, root) {
                outcomes.push(Err(Skipped::new(path, ScanSource::System, SkipReason::OutsideRoot)));
                continue;
            }
            outcomes.push(inspect(root, path, ScanSource::System, None).await);
        }
        outcomes
    }
}

/// `None` when the window reaches past the representable calendar.
fn recency_cutoff(now: DateTime<Utc>, max_age_days: u32) -> Option<DateTime<Utc>> {
    chrono::Duration::try_days(i64::from(max_age_days)).and_then(|window| now.checked_sub_signed(window))
}

async fn walk_dir(
    root: &Path,
    dir: &str,
    source: ScanSource,
    cutoff: Option<DateTime<Utc>>,
    outcomes: &mut Vec<ScanOutcome>,
) {
    let dir_path = root.join(dir.replace('\\', "/"));
    if !is_within_root(&dir_path, root) {
        outcomes.push(Err(Skipped::new(dir_path, source, SkipReason::OutsideRoot)));
        return;
    }

    let mut entries = match tokio::fs::read_dir(&dir_path).await {
        Ok(entries) => entries,
        Err(error) => {
            tracing::debug!(path = %dir_path.to_string_lossy(), error = %error, "hot-path directory unavailable");
            outcomes.push(Err(Skipped::from_io(dir_path, source, &error)));
            return;
        }
    };

    let mut candidates = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if is_markdown(&path) {
                    candidates.push(path);
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(path = %dir_path.to_string_lossy(), error = %error, "directory listing interrupted");
                outcomes.push(Err(Skipped::from_io(dir_path.clone(), source, &error)));
                break;
            }
        }
    }
    candidates.sort();

    for path in candidates {
        match inspect(root, path, source, cutoff).await {
            Err(Skipped {
                reason: SkipReason::NotAFile,
                ..
            }) => {}
            outcome => outcomes.push(outcome),
        }
    }
}

async fn inspect(root: &Path, path: PathBuf, source: ScanSource, cutoff: Option<DateTime<Utc>>) -> ScanOutcome {
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(error) => return Err(Skipped::from_io(path, source, &error)),
    };
    if !metadata.is_file() {
        return Err(Skipped::new(path, source, SkipReason::NotAFile));
    }
    let modified_at = match metadata.modified() {
        Ok(modified) => DateTime::<Utc>::from(modified),
        Err(error) => return Err(Skipped::from_io(path, source, &error)),
    };
    if let Some(cutoff) = cutoff {
        if modified_at < cutoff {
            return Err(Skipped::new(path, source, SkipReason::Stale));
        }
    }

    let normalized = normalize_path(&path);
    let relative_path = relative_to_root(&normalized, root).unwrap_or_else(|| normalized.clone());
    let name = path
        .file_stem()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(VaultFile {
        path: normalized,
        name,
        relative_path,
        modified_at,
        size: metadata.len(),
        source,
    })
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case(MARKDOWN_EXTENSION))
        .unwrap_or(false)
}

/// Collapses outcomes into a snapshot. A file reached by more than one rule
/// keeps its first provenance.
fn assemble(outcomes: Vec<ScanOutcome>, started: Instant, scanned_at: DateTime<Utc>) -> ScanResult {
    let mut files: Vec<VaultFile> = Vec::with_capacity(outcomes.len());
    let mut seen = HashSet::new();
    let mut skipped_count = 0;

    for outcome in outcomes {
        match outcome {
            Ok(file) if seen.insert(file.path.to_lowercase()) => files.push(file),
            Ok(file) => {
                tracing::debug!(path = %file.path, source = file.source.as_str(), "already matched by an earlier rule");
                skipped_count += 1;
            }
            Err(skipped) => {
                tracing::debug!(
                    path = %skipped.path.to_string_lossy(),
                    source = skipped.source.as_str(),
                    reason = %skipped.reason,
                    "skipped during vault scan"
                );
                skipped_count += 1;
            }
        }
    }

    let count = |source: ScanSource| files.iter().filter(|file| file.source == source).count();
    let always_count = count(ScanSource::Always);
    let recency_count = count(ScanSource::Recency);
    let system_count = count(ScanSource::System);

    ScanResult {
        scanned_count: files.len(),
        always_count,
        recency_count,
        system_count,
        skipped_count,
        duration_ms: started.elapsed().as_millis() as u64,
        scanned_at,
        cached_at: None,
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecencyRule;
    use std::fs;
    use std::time::SystemTime;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, format!("# {}\n", relative)).expect("write fixture");
        path
    }

    fn age(path: &Path, days: u64) {
        let file = fs::File::options().write(true).open(path).expect("open fixture");
        file.set_modified(SystemTime::now() - Duration::from_secs(days * 86_400))
            .expect("set mtime");
    }

    fn config() -> HotPathConfig {
        HotPathConfig {
            always_scan: vec!["TaskNotes".to_string()],
            recency_scan: vec![RecencyRule::new("Emails", 14)],
            system_files: Vec::new(),
            cache_ttl_seconds: 60,
            ..HotPathConfig::default()
        }
    }

    #[tokio::test]
    async fn recency_window_excludes_old_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "TaskNotes/a.md");
        touch(dir.path(), "TaskNotes/b.md");
        touch(dir.path(), "Emails/new.md");
        let old = touch(dir.path(), "Emails/old.md");
        age(&old, 30);

        let scanner = HotPathScanner::new(config());
        let result = scanner.scan(dir.path()).await;

        let mut names: Vec<&str> = result.files.iter().map(|file| file.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "new"]);
        assert_eq!(result.scanned_count, 3);
        assert_eq!(result.always_count, 2);
        assert_eq!(result.recency_count, 1);
        assert!(result.cached_at.is_none());

        let new = result.by_source(ScanSource::Recency).next().expect("recency file");
        assert_eq!(new.relative_path, "Emails/new.md");
        assert!(new.size > 0);
    }

    #[tokio::test]
    async fn stale_files_are_reported_as_skips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old = touch(dir.path(), "Emails/old.md");
        age(&old, 30);

        let scanner = HotPathScanner::new(config());
        let outcomes = scanner.collect_outcomes(dir.path(), Utc::now()).await;
        assert!(outcomes.iter().any(|outcome| matches!(
            outcome,
            Err(Skipped { reason: SkipReason::Stale, source: ScanSource::Recency, .. })
        )));
        assert!(outcomes.iter().any(|outcome| matches!(
            outcome,
            Err(Skipped { reason: SkipReason::Missing, source: ScanSource::Always, .. })
        )));
        assert!(outcomes.iter().all(Result::is_err));
    }

    #[tokio::test]
    async fn only_markdown_files_at_top_level_are_listed() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "TaskNotes/keep.md");
        touch(dir.path(), "TaskNotes/UPPER.MD");
        touch(dir.path(), "TaskNotes/image.png");
        touch(dir.path(), "TaskNotes/nested/deep.md");
        fs::create_dir_all(dir.path().join("TaskNotes/folder.md")).expect("dir named like a note");

        let scanner = HotPathScanner::new(config());
        let result = scanner.scan(dir.path()).await;

        let mut names: Vec<&str> = result.files.iter().map(|file| file.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["UPPER", "keep"]);
    }

    #[tokio::test]
    async fn scan_size_is_bounded_by_hot_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        for index in 0..3 {
            touch(dir.path(), &format!("TaskNotes/task-{}.md", index));
        }
        for index in 0..20 {
            let path = touch(dir.path(), &format!("Emails/mail-{}.md", index));
            if index >= 4 {
                age(&path, 60);
            }
        }
        touch(dir.path(), "Archive/ignored.md");
        touch(dir.path(), "Dashboard.md");

        let scanner = HotPathScanner::new(HotPathConfig {
            system_files: vec!["Dashboard.md".to_string(), "Missing.md".to_string()],
            ..config()
        });
        let result = scanner.scan(dir.path()).await;

        assert_eq!(result.scanned_count, 3 + 4 + 1);
        assert_eq!(result.system_count, 1);
        assert_eq!(result.skipped_count, 16 + 1);
        assert!(result.files.iter().all(|file| !file.relative_path.starts_with("Archive")));
    }

    #[tokio::test]
    async fn system_entries_cannot_escape_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("vault");
        fs::create_dir_all(&root).expect("vault root");
        touch(dir.path(), "secret.md");

        let scanner = HotPathScanner::new(HotPathConfig {
            system_files: vec!["../secret.md".to_string()],
            ..config()
        });
        let outcomes = scanner.collect_outcomes(&root, Utc::now()).await;
        assert!(outcomes.iter().any(|outcome| matches!(
            outcome,
            Err(Skipped { reason: SkipReason::OutsideRoot, .. })
        )));
        assert_eq!(scanner.scan(&root).await.scanned_count, 0);
    }

    #[tokio::test]
    async fn overlapping_rules_report_a_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "TaskNotes/a.md");

        let scanner = HotPathScanner::new(HotPathConfig {
            recency_scan: vec![RecencyRule::new("TaskNotes", 14)],
            system_files: vec!["TaskNotes/a.md".to_string()],
            ..config()
        });
        let result = scanner.scan(dir.path()).await;
        assert_eq!(result.scanned_count, 1);
        assert_eq!(result.files[0].source, ScanSource::Always);
        assert_eq!(result.skipped_count, 2);
    }

    #[tokio::test]
    async fn cache_serves_until_invalidated() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "TaskNotes/a.md");
        let scanner = HotPathScanner::new(config());

        let first = scanner.scan(dir.path()).await;
        touch(dir.path(), "TaskNotes/b.md");
        let second = scanner.scan(dir.path()).await;

        assert_eq!(first.scanned_count, second.scanned_count);
        assert!(second.from_cache());
        assert_eq!(second.cached_at, Some(first.scanned_at));

        scanner.invalidate();
        let third = scanner.scan(dir.path()).await;
        assert!(third.cached_at.is_none());
        assert_eq!(third.scanned_count, 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_rescans() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "TaskNotes/a.md");
        let scanner = HotPathScanner::new(HotPathConfig {
            cache_ttl_seconds: 0,
            ..config()
        });

        scanner.scan(dir.path()).await;
        touch(dir.path(), "TaskNotes/b.md");
        let second = scanner.scan(dir.path()).await;
        assert!(second.cached_at.is_none());
        assert_eq!(second.scanned_count, 2);
    }

    #[tokio::test]
    async fn cache_is_keyed_by_root() {
        let first_root = tempfile::tempdir().expect("tempdir");
        let second_root = tempfile::tempdir().expect("tempdir");
        touch(first_root.path(), "TaskNotes/a.md");
        let scanner = HotPathScanner::new(config());

        assert_eq!(scanner.scan(first_root.path()).await.scanned_count, 1);
        let other = scanner.scan(second_root.path()).await;
        assert!(other.cached_at.is_none());
        assert_eq!(other.scanned_count, 0);
    }

    #[tokio::test]
    async fn missing_root_yields_empty_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scanner = HotPathScanner::new(config());
        let result = scanner.scan(dir.path().join("not-synced-yet")).await;
        assert_eq!(result.scanned_count, 0);
        assert_eq!(result.skipped_count, 2);
    }

    #[tokio::test]
    async fn oversized_recency_window_lists_without_cutoff() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ancient = touch(dir.path(), "Archive/ancient.md");
        age(&ancient, 3_650);

        let scanner = HotPathScanner::new(HotPathConfig {
            always_scan: Vec::new(),
            recency_scan: vec![RecencyRule::new("Archive", u32::MAX)],
            ..config()
        });
        let result = scanner.scan(dir.path()).await;

        assert_eq!(result.scanned_count, 1);
        assert_eq!(result.recency_count, 1);
        assert_eq!(result.files[0].name, "ancient");
        assert!(recency_cutoff(Utc::now(), u32::MAX).is_none());
        assert!(recency_cutoff(Utc::now(), 14).is_some());
    }

    #[tokio::test]
    async fn cache_expires_after_ttl() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "TaskNotes/a.md");
        let scanner = HotPathScanner::new(HotPathConfig {
            cache_ttl_seconds: 1,
            ..config()
        });

        let first = scanner.scan(dir.path()).await;
        touch(dir.path(), "TaskNotes/b.md");

        let within = scanner.scan(dir.path()).await;
        assert_eq!(within.cached_at, Some(first.scanned_at));
        assert_eq!(within.scanned_count, 1);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let expired = scanner.scan(dir.path()).await;
        assert!(expired.cached_at.is_none());
        assert_eq!(expired.scanned_count, 2);
        assert!(expired.scanned_at > first.scanned_at);
    }
}
