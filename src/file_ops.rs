use crate::retry::{with_retry, RetryPolicy};
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

pub type IoFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// Filesystem primitives the writer is built from. Swappable so tests can
/// simulate a sync client holding files open.
pub trait FileOps: Send + Sync {
    fn read_to_string<'a>(&'a self, path: &'a Path) -> IoFuture<'a, String>;
    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> IoFuture<'a, ()>;
    fn copy<'a>(&'a self, from: &'a Path, to: &'a Path) -> IoFuture<'a, u64>;
    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> IoFuture<'a, ()>;
    fn remove_file<'a>(&'a self, path: &'a Path) -> IoFuture<'a, ()>;
    fn create_dir_all<'a>(&'a self, path: &'a Path) -> IoFuture<'a, ()>;
    fn exists<'a>(&'a self, path: &'a Path) -> IoFuture<'a, bool>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileOps;

impl FileOps for TokioFileOps {
    fn read_to_string<'a>(&'a self, path: &'a Path) -> IoFuture<'a, String> {
        Box::pin(tokio::fs::read_to_string(path))
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> IoFuture<'a, ()> {
        Box::pin(tokio::fs::write(path, contents))
    }

    fn copy<'a>(&'a self, from: &'a Path, to: &'a Path) -> IoFuture<'a, u64> {
        Box::pin(tokio::fs::copy(from, to))
    }

    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> IoFuture<'a, ()> {
        Box::pin(tokio::fs::rename(from, to))
    }

    fn remove_file<'a>(&'a self, path: &'a Path) -> IoFuture<'a, ()> {
        Box::pin(tokio::fs::remove_file(path))
    }

    fn create_dir_all<'a>(&'a self, path: &'a Path) -> IoFuture<'a, ()> {
        Box::pin(tokio::fs::create_dir_all(path))
    }

    fn exists<'a>(&'a self, path: &'a Path) -> IoFuture<'a, bool> {
        Box::pin(tokio::fs::try_exists(path))
    }
}

/// [`FileOps`] with reads, content writes and copies routed through the lock
/// retry policy. Renames, removals and directory creation run once.
#[derive(Clone)]
pub struct RetryableFileOps {
    ops: Arc<dyn FileOps>,
    policy: RetryPolicy,
}

impl RetryableFileOps {
    pub fn new(ops: Arc<dyn FileOps>, policy: RetryPolicy) -> Self {
        Self { ops, policy }
    }

    pub async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let ops = self.ops.as_ref();
        with_retry(&self.policy, "read", move || ops.read_to_string(path)).await
    }

    pub async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let ops = self.ops.as_ref();
        with_retry(&self.policy, "write", move || ops.write(path, contents)).await
    }

    pub async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let ops = self.ops.as_ref();
        with_retry(&self.policy, "copy", move || ops.copy(from, to)).await
    }

    pub async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.ops.rename(from, to).await
    }

    pub async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.ops.remove_file(path).await
    }

    pub async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.ops.create_dir_all(path).await
    }

    pub async fn exists(&self, path: &Path) -> io::Result<bool> {
        self.ops.exists(path).await
    }
}

impl Default for RetryableFileOps {
    fn default() -> Self {
        Self::new(Arc::new(TokioFileOps), RetryPolicy::default())
    }
}
