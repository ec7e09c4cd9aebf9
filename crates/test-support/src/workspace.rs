use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A source directory to mirror and an empty mountpoint for a single
/// test. Both are removed when the workspace is dropped.
pub struct TempWorkspace {
    pub original: PathBuf,
    pub mountpoint: PathBuf,
    _temp: TempDir,
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TempWorkspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp directory");
        let original = temp.path().join("original");
        let mountpoint = temp.path().join("mnt");
        std::fs::create_dir_all(&original).expect("failed to create original dir");
        std::fs::create_dir_all(&mountpoint).expect("failed to create mountpoint");
        Self {
            original,
            mountpoint,
            _temp: temp,
        }
    }

    /// Create a workspace and populate the original directory with a
    /// fixture builder.
    pub fn with_fixture(f: impl FnOnce(&Path)) -> Self {
        let ws = Self::new();
        f(&ws.original);
        ws
    }

    /// Path of `rel` inside the original directory.
    pub fn original_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.original.join(rel)
    }

    /// Write a TOML mount configuration for this workspace and return its
    /// path.
    pub fn write_config(&self, fs_name: &str) -> PathBuf {
        let path = self._temp.path().join("mount.toml");
        let body = format!(
            "original = {:?}\nmountpoint = {:?}\nfs_name = {:?}\n",
            self.original.display().to_string(),
            self.mountpoint.display().to_string(),
            fs_name,
        );
        std::fs::write(&path, body).expect("failed to write mount config");
        path
    }
}
