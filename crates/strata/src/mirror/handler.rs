//! Replication of source-tree changes into the destination tree.

use crate::config::UNKNOWN_TEST_STAND;
use filetime::FileTime;
use notify::event::{EventKind, ModifyKind, RenameMode};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// A file-system change under a watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub kind: SourceEventKind,
    pub path: PathBuf,
    /// New location, for moves only.
    pub dest_path: Option<PathBuf>,
}

impl SourceEvent {
    fn new(kind: SourceEventKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            dest_path: None,
        }
    }

    /// Translate a notify event. Access and metadata-only events yield nothing.
    pub fn from_notify(event: notify::Event) -> Vec<SourceEvent> {
        use SourceEventKind::*;

        let each = |kind: SourceEventKind, paths: Vec<PathBuf>| -> Vec<SourceEvent> {
            paths.into_iter().map(|p| SourceEvent::new(kind, p)).collect()
        };

        match event.kind {
            EventKind::Create(_) => each(Created, event.paths),
            EventKind::Remove(_) => each(Deleted, event.paths),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut paths = event.paths.into_iter();
                match (paths.next(), paths.next()) {
                    (Some(from), Some(to)) => vec![SourceEvent {
                        kind: Moved,
                        path: from,
                        dest_path: Some(to),
                    }],
                    (Some(only), None) => each(Created, vec![only]),
                    _ => Vec::new(),
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(Deleted, event.paths),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(Created, event.paths),
            EventKind::Modify(ModifyKind::Name(_)) => event
                .paths
                .into_iter()
                .map(|p| {
                    let kind = if p.exists() { Created } else { Deleted };
                    SourceEvent::new(kind, p)
                })
                .collect(),
            EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
            EventKind::Modify(_) => each(Modified, event.paths),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }
}

/// Bounded retry for copies blocked by another process holding the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRetry {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for CopyRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Sharing or lock violation: the writer still has the file open.
pub fn is_lock_contention(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(windows)]
    {
        matches!(e.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Run `op`, sleeping and retrying while it fails with lock contention.
pub fn retry_locked<T>(retry: &CopyRetry, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_lock_contention(&e) && attempt < attempts => {
                warn!(attempt, attempts, error = %e, "Source in use, retrying");
                std::thread::sleep(retry.backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn copy_mtime(src: &Path, dest: &Path) -> io::Result<()> {
    let meta = std::fs::metadata(src)?;
    filetime::set_file_mtime(dest, FileTime::from_last_modification_time(&meta))
}

/// Copy `src` to `dest`, then apply `set_mtime`. A failed mtime update is
/// logged and does not fail the copy.
fn copy_then_set_mtime<F>(src: &Path, dest: &Path, set_mtime: F) -> io::Result<u64>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    let bytes = std::fs::copy(src, dest)?;
    if let Err(e) = set_mtime(src, dest) {
        warn!(
            src = %src.display(),
            dest = %dest.display(),
            error = %e,
            "Copied, but could not preserve modification time"
        );
    }
    Ok(bytes)
}

fn copy_preserving_mtime(src: &Path, dest: &Path) -> io::Result<u64> {
    copy_then_set_mtime(src, dest, copy_mtime)
}

/// Mirrors one source root into the destination tree.
#[derive(Debug, Clone)]
pub struct MirrorHandler {
    src_root: PathBuf,
    dest_root: PathBuf,
    stand_prefixes: Vec<String>,
    retry: CopyRetry,
}

impl MirrorHandler {
    pub fn new(
        src_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        stand_prefixes: Vec<String>,
        retry: CopyRetry,
    ) -> Self {
        Self {
            src_root: src_root.into(),
            dest_root: dest_root.into(),
            stand_prefixes,
            retry,
        }
    }

    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    /// First path segment starting with a configured prefix.
    pub fn test_stand(&self, path: &Path) -> String {
        path.components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .find(|segment| self.stand_prefixes.iter().any(|p| segment.starts_with(p.as_str())))
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_TEST_STAND.to_string())
    }

    /// Destination for a source path: `<dest_root>/<stand>/<relative path>`.
    ///
    /// When the stand segment is itself part of the relative path, the
    /// relative path is taken from that segment on so it is not repeated.
    pub fn destination(&self, src_path: &Path) -> PathBuf {
        let stand = self.test_stand(src_path);
        let rel = match src_path.strip_prefix(&self.src_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => src_path.file_name().map(PathBuf::from).unwrap_or_default(),
        };

        let components: Vec<Component> = rel.components().collect();
        match components
            .iter()
            .position(|c| c.as_os_str() == stand.as_str())
        {
            Some(i) => {
                let mut dest = self.dest_root.clone();
                dest.extend(&components[i..]);
                dest
            }
            None => self.dest_root.join(&stand).join(rel),
        }
    }

    pub fn handle(&self, event: &SourceEvent) {
        match event.kind {
            SourceEventKind::Created => self.on_created(&event.path),
            SourceEventKind::Modified => self.on_modified(&event.path),
            SourceEventKind::Deleted => self.on_deleted(&event.path),
            SourceEventKind::Moved => match &event.dest_path {
                Some(to) => self.on_moved(&event.path, to),
                None => self.on_deleted(&event.path),
            },
        }
    }

    pub fn on_created(&self, path: &Path) {
        debug!(path = %path.display(), "Created");
        self.replicate(path);
    }

    pub fn on_modified(&self, path: &Path) {
        debug!(path = %path.display(), "Modified");
        self.replicate(path);
    }

    fn replicate(&self, path: &Path) {
        if path.is_dir() {
            self.ensure_dir(path);
        } else if path.is_file() {
            self.copy_file(path);
        }
    }

    pub fn on_deleted(&self, path: &Path) {
        let dest = self.destination(path);
        let result = if dest.is_dir() {
            std::fs::remove_dir_all(&dest)
        } else if dest.is_file() {
            std::fs::remove_file(&dest)
        } else {
            return;
        };
        match result {
            Ok(()) => info!(dest = %dest.display(), "Deleted from destination"),
            Err(e) => error!(
                dest = %dest.display(),
                error = %e,
                "Failed to delete from destination"
            ),
        }
    }

    pub fn on_moved(&self, from: &Path, to: &Path) {
        let old_dest = self.destination(from);
        let new_dest = self.destination(to);

        if let Some(parent) = new_dest.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!(dest = %parent.display(), error = %e, "Failed to create directory");
                return;
            }
        }

        if old_dest.exists() {
            match std::fs::rename(&old_dest, &new_dest) {
                Ok(()) => info!(
                    from = %old_dest.display(),
                    to = %new_dest.display(),
                    "Moved in destination"
                ),
                Err(e) => error!(
                    from = %old_dest.display(),
                    to = %new_dest.display(),
                    error = %e,
                    "Failed to move in destination"
                ),
            }
        } else if to.is_dir() {
            self.ensure_dir(to);
        } else {
            self.copy_file(to);
        }
    }

    fn ensure_dir(&self, src_path: &Path) {
        let dest = self.destination(src_path);
        if let Err(e) = std::fs::create_dir_all(&dest) {
            error!(dest = %dest.display(), error = %e, "Failed to create directory");
        }
    }

    /// Copy with bounded retry. Failures are logged and the event dropped.
    pub fn copy_file(&self, src_path: &Path) -> bool {
        let dest = self.destination(src_path);
        if let Some(parent) = dest.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!(dest = %parent.display(), error = %e, "Failed to create directory");
                return false;
            }
        }

        match retry_locked(&self.retry, || copy_preserving_mtime(src_path, &dest)) {
            Ok(bytes) => {
                info!(src = %src_path.display(), dest = %dest.display(), bytes, "Copied");
                true
            }
            Err(e) => {
                error!(
                    src = %src_path.display(),
                    dest = %dest.display(),
                    error = %e,
                    "Copy failed, dropping event"
                );
                false
            }
        }
    }
}
