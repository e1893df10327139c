//! Per-request scratch space.
//!
//! Every debate gets a fresh identifier and a private directory for its
//! intermediate audio and video. The directory is removed when the session
//! is dropped, whatever path the request took to get there.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

/// Owns all temporary artifacts of one debate request.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    dir: TempDir,
}

impl Session {
    /// Create a new session directory below `work_dir`.
    pub fn create(work_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(work_dir)?;
        let id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}_", id))
            .tempdir_in(work_dir)?;
        debug!("Created session {} at {}", id, dir.path().display());
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path for an artifact of `turn_id`, e.g. `<dir>/pro_0.wav`.
    pub fn artifact_path(&self, turn_id: &str, extension: &str) -> PathBuf {
        self.dir.path().join(format!("{}.{}", turn_id, extension))
    }

    pub async fn write_artifact(
        &self,
        turn_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let path = self.artifact_path(turn_id, extension);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove the session directory, reporting any failure.
    pub fn close(self) -> io::Result<()> {
        debug!("Closing session {}", self.id);
        self.dir.close()
    }
}
