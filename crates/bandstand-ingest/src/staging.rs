//! Staging area for uploads.
//!
//! Bytes are written under `staging_dir` and only become visible under
//! `documents_dir` through a single `rename`. Both directories must be on
//! the same filesystem.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use uuid::Uuid;

const STAGED_EXTENSION: &str = "part";

#[derive(Debug, Clone)]
pub struct StagingArea {
    staging_dir: PathBuf,
    documents_dir: PathBuf,
}

impl StagingArea {
    /// Create both directories if needed.
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        documents_dir: impl Into<PathBuf>,
    ) -> io::Result<Self> {
        let area = Self {
            staging_dir: staging_dir.into(),
            documents_dir: documents_dir.into(),
        };
        fs::create_dir_all(&area.staging_dir)?;
        fs::create_dir_all(&area.documents_dir)?;
        Ok(area)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    /// Served path for an upload. Named by the upload id only.
    pub fn final_path(&self, upload_id: Uuid) -> PathBuf {
        self.documents_dir.join(upload_id.to_string())
    }

    /// Stream `body` into a new staged file and flush it to disk.
    pub fn stage(&self, upload_id: Uuid, body: &mut dyn Read) -> io::Result<StagedFile> {
        let path = self
            .staging_dir
            .join(format!("{upload_id}.{STAGED_EXTENSION}"));
        let mut file = File::create_new(&path)?;
        // Guard first, so a failed copy still removes the partial file
        let staged = StagedFile {
            path,
            promoted: false,
        };

        let bytes = io::copy(body, &mut file)?;
        file.flush()?;
        file.sync_all()?;
        log::debug!("Staged {bytes} bytes for upload {upload_id}");
        Ok(staged)
    }

    /// Remove staged files older than `max_age`. Returns how many were
    /// removed. Files of uploads still in flight are younger than any
    /// sensible `max_age` and are left alone.
    pub fn sweep(&self, max_age: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(&self.staging_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STAGED_EXTENSION) {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let age = now
                .duration_since(metadata.modified()?)
                .unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // Another sweeper got there first
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Could not sweep {}: {e}", path.display()),
            }
        }

        if removed > 0 {
            log::info!("Swept {removed} stale staged file(s)");
        }
        Ok(removed)
    }

    /// Run [`sweep`](Self::sweep) on a detached thread so the caller does
    /// not wait for it.
    pub fn spawn_sweep(&self, max_age: Duration) {
        let area = self.clone();
        let spawned = thread::Builder::new()
            .name("staging-sweep".to_string())
            .spawn(move || {
                if let Err(e) = area.sweep(max_age) {
                    log::warn!("Staging sweep failed: {e}");
                }
            });
        if let Err(e) = spawned {
            log::warn!("Could not start staging sweep: {e}");
        }
    }
}

/// A staged upload. Dropping it without promoting removes the file.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    promoted: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename into `final_path` and sync the parent directory so the new
    /// entry survives a crash. On failure the staged file is still removed
    /// on drop and nothing is left at `final_path`.
    pub fn promote(mut self, final_path: &Path) -> io::Result<PathBuf> {
        fs::rename(&self.path, final_path)?;
        self.promoted = true;

        if let Some(parent) = final_path.parent() {
            if let Err(e) = sync_dir(parent) {
                if let Err(cleanup) = fs::remove_file(final_path) {
                    log::error!(
                        "Could not remove unsynced document {}: {cleanup}",
                        final_path.display()
                    );
                }
                return Err(e);
            }
        }
        Ok(final_path.to_path_buf())
    }
}

/// Flush a directory's entries to disk. Directories cannot be opened for
/// syncing outside unix, so this is a no-op there.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.promoted {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Discarded staged file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Could not discard staged file {}: {e}",
                self.path.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn area(dir: &TempDir) -> StagingArea {
        StagingArea::new(dir.path().join("staging"), dir.path().join("documents")).unwrap()
    }

    fn files_in(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_dropped_staged_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);

        let staged = area.stage(Uuid::new_v4(), &mut &b"%PDF-1.7"[..]).unwrap();
        assert!(staged.path().exists());
        drop(staged);

        assert_eq!(files_in(area.staging_dir()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_dir() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        sync_dir(area.documents_dir()).unwrap();
        assert!(sync_dir(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_failed_promote_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let staged = area.stage(Uuid::new_v4(), &mut &b"%PDF-1.7"[..]).unwrap();

        let target = dir.path().join("gone").join("doc");
        assert!(staged.promote(&target).is_err());
        assert!(!target.exists());
        assert_eq!(files_in(area.staging_dir()), 0);
    }

    #[test]
    fn test_promote_moves_file() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let id = Uuid::new_v4();

        let staged = area.stage(id, &mut &b"%PDF-1.7"[..]).unwrap();
        let final_path = staged.promote(&area.final_path(id)).unwrap();

        assert_eq!(fs::read(&final_path).unwrap(), b"%PDF-1.7");
        assert_eq!(files_in(area.staging_dir()), 0);
        assert_eq!(final_path.file_name().unwrap(), id.to_string().as_str());
    }

    #[test]
    fn test_sweep_only_removes_old_staged_files() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);

        fs::write(area.staging_dir().join("leftover.part"), b"old").unwrap();
        fs::write(area.staging_dir().join("notes.txt"), b"keep").unwrap();

        assert_eq!(area.sweep(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(area.sweep(Duration::ZERO).unwrap(), 1);
        assert!(area.staging_dir().join("notes.txt").exists());
    }
}
