use std::sync::Arc;

use log::info;

use hookfs_common::FileSystem;

use crate::error::HookFsError;
use crate::hook_fs::HookFs;

/// Drives the mount lifecycle of a [`HookFs`] for an external transport.
///
/// `start` runs the mount notification (and with it the hook's
/// initializer) before the filesystem is handed out, so no request can be
/// served before initialization has finished. Dropping a running session
/// unmounts it.
pub struct MountSession<F: FileSystem> {
    fs: Arc<HookFs<F>>,
    running: bool,
}

impl<F: FileSystem> MountSession<F> {
    pub fn new(fs: HookFs<F>) -> Self {
        Self {
            fs: Arc::new(fs),
            running: false,
        }
    }

    /// Mount the filesystem. Calling `start` on a running session is a
    /// no-op.
    pub fn start(&mut self) -> Result<(), HookFsError> {
        if self.running {
            return Ok(());
        }

        let mountpoint = self.fs.mountpoint();
        if !mountpoint.is_dir() {
            return Err(HookFsError::InvalidMountpoint {
                path: mountpoint.to_path_buf(),
            });
        }

        self.fs.on_mount();
        self.running = true;

        if self.fs.is_hook_enabled() {
            info!("{}: mounted with hook {:?}", self.fs, self.fs.capabilities());
        } else {
            info!("{}: mounted as passthrough", self.fs);
        }
        Ok(())
    }

    /// Unmount the filesystem. Handles the transport still holds keep
    /// working against the delegate until they are released.
    pub fn stop(&mut self) -> Result<(), HookFsError> {
        if self.running {
            self.fs.on_unmount();
            self.running = false;
            info!("{}: unmounted", self.fs);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The filesystem to serve, once the session is running.
    pub fn filesystem(&self) -> Option<Arc<HookFs<F>>> {
        self.running.then(|| Arc::clone(&self.fs))
    }
}

impl<F: FileSystem> Drop for MountSession<F> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
