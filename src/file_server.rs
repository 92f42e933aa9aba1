//! Ephemeral file server: short-lived files exposed by path instead of by value.
//!
//! Each served file has exactly one expiry timer. Serving a filename that is
//! already tracked only resets its timer; the bytes on disk are left alone.
//! The timer table sits behind one async mutex shared by `serve`, `delete`
//! and the timer tasks, and every timer carries a generation number so a
//! timer that was replaced can never remove its successor's entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

/// URL prefix of every served path.
pub const FILES_PREFIX: &str = "/files";

/// Default lifetime of a served file.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(600);

struct ServedFile {
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    dir: PathBuf,
    files: Mutex<HashMap<String, ServedFile>>,
    next_generation: AtomicU64,
}

/// TTL-evicted serving folder. Cheap to clone; clones share the timer table.
#[derive(Clone)]
pub struct FileServer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FileServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileServer")
            .field("dir", &self.inner.dir)
            .finish()
    }
}

/// Path under which `filename` is served.
pub fn served_path(filename: &str) -> String {
    format!("{}/{}", FILES_PREFIX, filename)
}

/// Keep served names inside the folder.
fn flatten_name(filename: &str) -> String {
    let flat: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if flat.is_empty() || flat == "." || flat == ".." {
        "_".to_string()
    } else {
        flat
    }
}

impl FileServer {
    /// Open a serving folder, creating it and deleting everything in it that
    /// is not a symlink. Files left behind by a previous run are never served.
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut purged = 0usize;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let result = if file_type.is_symlink() {
                continue;
            } else if file_type.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await
            } else {
                tokio::fs::remove_file(entry.path()).await
            };
            match result {
                Ok(()) => purged += 1,
                Err(e) => warn!("Failed to purge {}: {}", entry.path().display(), e),
            }
        }
        if purged > 0 {
            info!("Purged {} stale entries from {}", purged, dir.display());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                files: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Serve `data` as `filename` for `lifetime` and return its path.
    ///
    /// Re-serving a tracked filename resets its timer without rewriting the
    /// file. A failed write is logged and the path is still returned, but the
    /// name stays untracked so the next serve writes it again.
    pub async fn serve(&self, data: &[u8], filename: &str, lifetime: Duration) -> String {
        let filename = flatten_name(filename);
        let path = served_path(&filename);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);

        let mut files = self.inner.files.lock().await;
        if let Some(existing) = files.get_mut(&filename) {
            existing.timer.abort();
            existing.generation = generation;
            existing.timer = self.spawn_expiry(&filename, generation, lifetime);
            debug!("Reset expiry of {} to {:?}", filename, lifetime);
            return path;
        }

        if let Err(e) = tokio::fs::write(self.inner.dir.join(&filename), data).await {
            warn!("Failed to write served file {}: {}", filename, e);
            return path;
        }
        let timer = self.spawn_expiry(&filename, generation, lifetime);
        files.insert(filename, ServedFile { generation, timer });
        path
    }

    /// Stop serving `filename`: cancel its timer, forget it and unlink it.
    ///
    /// Returns false when there was no file to unlink.
    pub async fn delete(&self, filename: &str) -> bool {
        let filename = flatten_name(filename);
        let mut files = self.inner.files.lock().await;
        if let Some(served) = files.remove(&filename) {
            served.timer.abort();
        }
        let removed = unlink(&self.inner.dir, &filename).await;
        drop(files);
        removed
    }

    /// Whether `filename` currently has a live timer.
    pub async fn is_serving(&self, filename: &str) -> bool {
        self.inner
            .files
            .lock()
            .await
            .contains_key(&flatten_name(filename))
    }

    /// Number of live timers.
    pub async fn timer_count(&self) -> usize {
        self.inner.files.lock().await.len()
    }

    fn spawn_expiry(&self, filename: &str, generation: u64, lifetime: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let filename = filename.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            expire(&inner, &filename, generation).await;
        })
    }
}

/// Timer callback: delete the file unless the timer was superseded.
async fn expire(inner: &Inner, filename: &str, generation: u64) {
    let mut files = inner.files.lock().await;
    match files.get(filename) {
        Some(served) if served.generation == generation => {
            files.remove(filename);
        }
        _ => return,
    }
    if unlink(&inner.dir, filename).await {
        debug!("Expired served file {}", filename);
    }
}

async fn unlink(dir: &Path, filename: &str) -> bool {
    match tokio::fs::remove_file(dir.join(filename)).await {
        Ok(()) => true,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to delete served file {}: {}", filename, e);
            }
            false
        }
    }
}

/// Static handler resolving the paths returned by [`FileServer::serve`].
pub fn router(dir: impl AsRef<Path>) -> Router {
    Router::new().nest_service(FILES_PREFIX, ServeDir::new(dir.as_ref()))
}
