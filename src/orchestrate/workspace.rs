use std::io;
use std::path::{Path, PathBuf};

/// Scratch directory holding the revision pair of the record in flight.
///
/// File names are fixed and reused across records, so the directory must be
/// reset before and after every record.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: PathBuf,
}

impl TempWorkspace {
    pub fn new(dir: &Path) -> io::Result<Self> {
        let workspace = Self {
            dir: dir.to_path_buf(),
        };
        workspace.reset()?;
        Ok(workspace)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete and recreate the directory.
    pub fn reset(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        std::fs::create_dir_all(&self.dir)
    }

    /// `new.<ext>`: the post-merge revision.
    pub fn new_revision(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("new.{extension}"))
    }

    /// `old.<ext>`: the pre-merge revision.
    pub fn old_revision(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("old.{extension}"))
    }

    pub fn is_empty(&self) -> bool {
        std::fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}
