use std::future::Future;
use std::io;
use std::time::Duration;

pub const DEFAULT_BACKOFF_MS: [u64; 4] = [200, 400, 800, 1_600];

// Raw codes a sync client produces while it holds a file open.
#[cfg(windows)]
const TRANSIENT_OS_CODES: &[i32] = &[
    5,  // ERROR_ACCESS_DENIED
    32, // ERROR_SHARING_VIOLATION
    33, // ERROR_LOCK_VIOLATION
];
#[cfg(not(windows))]
const TRANSIENT_OS_CODES: &[i32] = &[
    1,  // EPERM
    13, // EACCES
    16, // EBUSY
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_BACKOFF_MS)
    }
}

impl RetryPolicy {
    pub fn new(backoff: Vec<Duration>) -> Self {
        Self { backoff }
    }

    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().copied().map(Duration::from_millis).collect())
    }

    pub fn max_attempts(&self) -> usize {
        self.backoff.len() + 1
    }

    /// Upper bound on time spent sleeping for one operation.
    pub fn total_backoff(&self) -> Duration {
        self.backoff.iter().sum()
    }
}

pub fn is_transient_lock_error(error: &io::Error) -> bool {
    if matches!(error.kind(), io::ErrorKind::PermissionDenied) {
        return true;
    }
    matches!(error.raw_os_error(), Some(code) if TRANSIENT_OS_CODES.contains(&code))
}

/// Runs `operation`, retrying lock-class failures on the policy's schedule.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, operation: F) -> io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    with_retry_if(policy, label, is_transient_lock_error, operation).await
}

/// Like [`with_retry`] with a caller-supplied retryable predicate. Errors the
/// predicate rejects, and the last error once the schedule is spent, are
/// returned unchanged.
pub async fn with_retry_if<T, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    retryable: P,
    mut operation: F,
) -> io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
    P: Fn(&io::Error) -> bool,
{
    let mut delays = policy.backoff.iter();
    let mut attempt = 1_usize;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !retryable(&error) {
            return Err(error);
        }

        let Some(delay) = delays.next() else {
            tracing::warn!(
                operation = label,
                attempts = attempt,
                error = %error,
                "retry budget exhausted for locked file"
            );
            return Err(error);
        };

        tracing::debug!(
            operation = label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "file locked; retrying"
        );
        tokio::time::sleep(*delay).await;
        attempt += 1;
    }
}
