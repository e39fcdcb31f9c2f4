//! Scratch artifacts
//!
//! A fetched audio file lives in its own directory under the scratch root.
//! Dropping the artifact removes the directory, including any intermediate
//! files the fetcher left next to the final output.

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Local audio file owned by one pipeline attempt
#[derive(Debug)]
pub struct ScratchArtifact {
    dir: PathBuf,
    path: PathBuf,
}

impl ScratchArtifact {
    /// Reserve `<root>/<uuid>/<file_name>`; the directory is created, the file is not
    pub fn reserve(root: &Path, file_name: &str) -> std::io::Result<Self> {
        let dir = root.join(Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(file_name),
            dir,
        })
    }

    /// Path of the audio file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory owned by this artifact
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for ScratchArtifact {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::debug!(dir = %self.dir.display(), "Scratch artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove scratch artifact"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_drop_removes_file_and_intermediates() {
        let root = TempDir::new().unwrap();
        let artifact = ScratchArtifact::reserve(root.path(), "audio.mp3").unwrap();
        std::fs::write(artifact.path(), b"ID3").unwrap();
        std::fs::write(artifact.dir().join("audio.webm.part"), b"partial").unwrap();

        let dir = artifact.dir().to_path_buf();
        assert!(artifact.path().starts_with(&dir));
        drop(artifact);

        assert!(!dir.exists());
        assert!(root.path().exists(), "scratch root itself is kept");
    }

    #[test]
    fn test_reservations_are_distinct() {
        let root = TempDir::new().unwrap();
        let a = ScratchArtifact::reserve(root.path(), "audio.mp3").unwrap();
        let b = ScratchArtifact::reserve(root.path(), "audio.mp3").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_drop_tolerates_already_removed_dir() {
        let root = TempDir::new().unwrap();
        let artifact = ScratchArtifact::reserve(root.path(), "audio.mp3").unwrap();
        std::fs::remove_dir_all(artifact.dir()).unwrap();
        drop(artifact);
    }
}
