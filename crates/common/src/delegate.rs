use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errno::FsResult;
use crate::types::{Attr, DirEntry, FileLock, SetxattrFlags, StatFs};

/// A path-based filesystem.
///
/// Paths are relative to the filesystem root; a leading `/` is accepted.
/// Every method may be called concurrently from the transport's worker
/// threads.
pub trait FileSystem: Send + Sync {
    fn get_attr(&self, path: &Path) -> FsResult<Attr>;

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()>;

    /// `u32::MAX` for either id leaves it unchanged.
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> FsResult<()>;

    /// `None` leaves the corresponding timestamp unchanged.
    fn utimens(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()>;

    fn truncate(&self, path: &Path, size: u64) -> FsResult<()>;

    /// Check `mode` (`R_OK | W_OK | X_OK`, or `F_OK`) against the object.
    fn access(&self, path: &Path, mode: u32) -> FsResult<()>;

    fn link(&self, old: &Path, new: &Path) -> FsResult<()>;

    fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()>;

    fn mknod(&self, path: &Path, mode: u32, dev: u64) -> FsResult<()>;

    fn rename(&self, old: &Path, new: &Path) -> FsResult<()>;

    fn rmdir(&self, path: &Path) -> FsResult<()>;

    fn unlink(&self, path: &Path) -> FsResult<()>;

    fn get_xattr(&self, path: &Path, name: &str) -> FsResult<Vec<u8>>;

    fn list_xattr(&self, path: &Path) -> FsResult<Vec<String>>;

    fn remove_xattr(&self, path: &Path, name: &str) -> FsResult<()>;

    fn set_xattr(
        &self,
        path: &Path,
        name: &str,
        value: &[u8],
        flags: SetxattrFlags,
    ) -> FsResult<()>;

    /// Open an existing file. `flags` are POSIX `open(2)` flags.
    fn open(&self, path: &Path, flags: u32) -> FsResult<Box<dyn File>>;

    fn create(&self, path: &Path, flags: u32, mode: u32) -> FsResult<Box<dyn File>>;

    fn open_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    /// Create `link` pointing at `target`. The target is stored verbatim.
    fn symlink(&self, target: &Path, link: &Path) -> FsResult<()>;

    fn readlink(&self, path: &Path) -> FsResult<PathBuf>;

    /// `None` reports failure; statfs has no status channel.
    fn statfs(&self, path: &Path) -> Option<StatFs>;

    /// Called once the filesystem is mounted, before any request.
    fn on_mount(&self) {}

    fn on_unmount(&self) {}
}

/// An open file handle.
pub trait File: Send + Sync {
    /// Read up to `size` bytes at `offset`. A short result means end of file.
    fn read(&self, size: usize, offset: u64) -> FsResult<Vec<u8>>;

    fn write(&self, data: &[u8], offset: u64) -> FsResult<usize>;

    /// Called on every `close(2)` of a descriptor referring to this handle.
    fn flush(&self) -> FsResult<()>;

    /// Drop the handle. Called exactly once, after the last flush.
    fn release(self: Box<Self>);

    /// Bit 0 of `flags` requests a data-only sync.
    fn fsync(&self, flags: u32) -> FsResult<()>;

    fn truncate(&self, size: u64) -> FsResult<()>;

    fn get_attr(&self) -> FsResult<Attr>;

    fn chown(&self, uid: u32, gid: u32) -> FsResult<()>;

    fn chmod(&self, mode: u32) -> FsResult<()>;

    fn utimens(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> FsResult<()>;

    fn allocate(&self, offset: u64, size: u64, mode: u32) -> FsResult<()>;

    /// Report the first lock that would conflict with `lock`, or `lock`
    /// itself with type `Unlock` when there is none.
    fn get_lk(&self, owner: u64, lock: &FileLock, flags: u32) -> FsResult<FileLock>;

    fn set_lk(&self, owner: u64, lock: &FileLock, flags: u32) -> FsResult<()>;

    /// Like `set_lk`, but waits for a conflicting lock to be released.
    fn set_lkw(&self, owner: u64, lock: &FileLock, flags: u32) -> FsResult<()>;
}
