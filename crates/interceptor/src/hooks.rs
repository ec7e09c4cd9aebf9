//! Hook traits.
//!
//! A hook implements any subset of the per-operation pair traits below and
//! advertises them through the matching accessor on [`Hook`]. Every pair
//! has a pre-hook, called with the operation's arguments before the
//! delegate runs, and a post-hook, called with the delegate's outcome and
//! the context the pre-hook returned.
//!
//! Hooks are called from many threads at once and must do their own
//! synchronisation.

use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use hookfs_common::{Attr, DirEntry, Errno, File, FileLock, HookError, SetxattrFlags, StatFs};

use crate::context::HookContext;
use crate::decision::{Post, Pre};

/// Outcome of a delegate operation that returns no value.
pub type Status = Result<(), Errno>;

/// Runs once when the filesystem is mounted, before any request is served.
pub trait InitHook: Send + Sync {
    /// An error disables the hook for the rest of the mount; the filesystem
    /// keeps serving requests as a plain passthrough.
    fn init(&self) -> Result<(), HookError>;
}

/// Opening an existing file.
///
/// A short-circuit must carry an error: there is no handle to return.
pub trait OpenHook: Send + Sync {
    fn pre_open(&self, path: &Path, flags: u32) -> Pre;

    /// `Replace(Err)` over a successful open releases the delegate handle.
    /// `Replace(Ok)` over a failed open is a hook defect.
    fn post_open(&self, status: Status, ctx: HookContext) -> Post;
}

/// Reading from an open file.
pub trait ReadHook: Send + Sync {
    /// A short-circuit returns the supplied bytes as the read result.
    fn pre_read(&self, path: &Path, size: usize, offset: u64) -> Pre<Vec<u8>>;

    /// A replacement whose length differs from the delegate's is accepted
    /// and logged as a warning.
    fn post_read(&self, outcome: Result<&[u8], Errno>, ctx: HookContext) -> Post<Vec<u8>>;
}

/// Writing to an open file.
pub trait WriteHook: Send + Sync {
    /// A short-circuit reports zero bytes written.
    fn pre_write(&self, path: &Path, data: &[u8], offset: u64) -> Pre;

    fn post_write(&self, outcome: Result<usize, Errno>, ctx: HookContext) -> Post<usize>;
}

/// A short-circuit must carry an error.
pub trait MkdirHook: Send + Sync {
    fn pre_mkdir(&self, path: &Path, mode: u32) -> Pre;
    fn post_mkdir(&self, status: Status, ctx: HookContext) -> Post;
}

/// A short-circuit must carry an error.
pub trait RmdirHook: Send + Sync {
    fn pre_rmdir(&self, path: &Path) -> Pre;
    fn post_rmdir(&self, status: Status, ctx: HookContext) -> Post;
}

/// Listing a directory. A short-circuit must carry an error; a post-hook
/// may replace the listing.
pub trait OpenDirHook: Send + Sync {
    fn pre_open_dir(&self, path: &Path) -> Pre;
    fn post_open_dir(
        &self,
        outcome: Result<&[DirEntry], Errno>,
        ctx: HookContext,
    ) -> Post<Vec<DirEntry>>;
}

pub trait FsyncHook: Send + Sync {
    fn pre_fsync(&self, path: &Path, flags: u32) -> Pre;
    fn post_fsync(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait FlushHook: Send + Sync {
    fn pre_flush(&self, path: &Path) -> Pre;
    fn post_flush(&self, status: Status, ctx: HookContext) -> Post;
}

/// Releasing an open file.
///
/// Release has no status, so these hooks only observe: the returned flags
/// are logged and the delegate handle is always released exactly once.
pub trait ReleaseHook: Send + Sync {
    fn pre_release(&self, path: &Path) -> (bool, HookContext);
    fn post_release(&self, ctx: HookContext) -> bool;
}

/// Shared by path-based and handle-based truncate.
pub trait TruncateHook: Send + Sync {
    fn pre_truncate(&self, path: &Path, size: u64) -> Pre;
    fn post_truncate(&self, status: Status, ctx: HookContext) -> Post;
}

/// Shared by path-based and handle-based getattr.
pub trait GetAttrHook: Send + Sync {
    fn pre_get_attr(&self, path: &Path) -> Pre<Attr>;
    fn post_get_attr(&self, outcome: Result<&Attr, Errno>, ctx: HookContext) -> Post<Attr>;
}

pub trait ChownHook: Send + Sync {
    fn pre_chown(&self, path: &Path, uid: u32, gid: u32) -> Pre;
    fn post_chown(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait ChmodHook: Send + Sync {
    fn pre_chmod(&self, path: &Path, mode: u32) -> Pre;
    fn post_chmod(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait UtimensHook: Send + Sync {
    fn pre_utimens(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Pre;
    fn post_utimens(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait AllocateHook: Send + Sync {
    fn pre_allocate(&self, path: &Path, offset: u64, size: u64, mode: u32) -> Pre;
    fn post_allocate(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait GetLkHook: Send + Sync {
    fn pre_get_lk(&self, path: &Path, owner: u64, lock: &FileLock, flags: u32) -> Pre<FileLock>;
    fn post_get_lk(&self, outcome: Result<&FileLock, Errno>, ctx: HookContext)
    -> Post<FileLock>;
}

pub trait SetLkHook: Send + Sync {
    fn pre_set_lk(&self, path: &Path, owner: u64, lock: &FileLock, flags: u32) -> Pre;
    fn post_set_lk(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait SetLkwHook: Send + Sync {
    fn pre_set_lkw(&self, path: &Path, owner: u64, lock: &FileLock, flags: u32) -> Pre;
    fn post_set_lkw(&self, status: Status, ctx: HookContext) -> Post;
}

/// Filesystem statistics.
///
/// Statfs reports failure as an absent result, so a short-circuit of
/// either kind yields no statistics. The post-hook cannot substitute
/// statistics: `Replace(Err)` suppresses the delegate's result and
/// `Replace(Ok)` keeps it.
pub trait StatFsHook: Send + Sync {
    fn pre_statfs(&self, path: &Path) -> Pre;
    fn post_statfs(&self, outcome: Option<&StatFs>, ctx: HookContext) -> Post;
}

pub trait ReadlinkHook: Send + Sync {
    fn pre_readlink(&self, path: &Path) -> Pre<PathBuf>;
    fn post_readlink(&self, outcome: Result<&Path, Errno>, ctx: HookContext) -> Post<PathBuf>;
}

pub trait SymlinkHook: Send + Sync {
    fn pre_symlink(&self, target: &Path, link: &Path) -> Pre;
    fn post_symlink(&self, status: Status, ctx: HookContext) -> Post;
}

/// Creating and opening a new file.
pub trait CreateHook: Send + Sync {
    /// A successful short-circuit supplies the handle the caller receives.
    fn pre_create(&self, path: &Path, flags: u32, mode: u32) -> Pre<Box<dyn File>>;

    /// Same reconciliation rules as [`OpenHook::post_open`].
    fn post_create(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait AccessHook: Send + Sync {
    fn pre_access(&self, path: &Path, mode: u32) -> Pre;
    fn post_access(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait LinkHook: Send + Sync {
    fn pre_link(&self, old: &Path, new: &Path) -> Pre;
    fn post_link(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait MknodHook: Send + Sync {
    fn pre_mknod(&self, path: &Path, mode: u32, dev: u64) -> Pre;
    fn post_mknod(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait RenameHook: Send + Sync {
    fn pre_rename(&self, old: &Path, new: &Path) -> Pre;
    fn post_rename(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait UnlinkHook: Send + Sync {
    fn pre_unlink(&self, path: &Path) -> Pre;
    fn post_unlink(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait GetXattrHook: Send + Sync {
    fn pre_get_xattr(&self, path: &Path, name: &str) -> Pre<Vec<u8>>;
    fn post_get_xattr(&self, outcome: Result<&[u8], Errno>, ctx: HookContext) -> Post<Vec<u8>>;
}

pub trait ListXattrHook: Send + Sync {
    fn pre_list_xattr(&self, path: &Path) -> Pre<Vec<String>>;
    fn post_list_xattr(
        &self,
        outcome: Result<&[String], Errno>,
        ctx: HookContext,
    ) -> Post<Vec<String>>;
}

pub trait RemoveXattrHook: Send + Sync {
    fn pre_remove_xattr(&self, path: &Path, name: &str) -> Pre;
    fn post_remove_xattr(&self, status: Status, ctx: HookContext) -> Post;
}

pub trait SetXattrHook: Send + Sync {
    fn pre_set_xattr(&self, path: &Path, name: &str, value: &[u8], flags: SetxattrFlags) -> Pre;
    fn post_set_xattr(&self, status: Status, ctx: HookContext) -> Post;
}

/// User logic plugged into a hooked filesystem.
///
/// Each accessor reports whether the hook implements the corresponding
/// pair. The defaults say it does not, so a hook overrides only the
/// accessors for the pairs it implements:
///
/// ```
/// use std::path::Path;
/// use hookfs_interceptor::{Hook, HookContext, Post, Pre, Status, UnlinkHook};
///
/// struct NoDelete;
///
/// impl UnlinkHook for NoDelete {
///     fn pre_unlink(&self, _path: &Path) -> Pre {
///         Pre::fail(hookfs_common::Errno::PermissionDenied)
///     }
///     fn post_unlink(&self, _status: Status, _ctx: HookContext) -> Post {
///         Post::Keep
///     }
/// }
///
/// impl Hook for NoDelete {
///     fn on_unlink(&self) -> Option<&dyn UnlinkHook> {
///         Some(self)
///     }
/// }
/// ```
///
/// The accessors are queried once, when the hook is registered with a
/// filesystem.
pub trait Hook: Send + Sync {
    fn on_init(&self) -> Option<&dyn InitHook> {
        None
    }
    fn on_open(&self) -> Option<&dyn OpenHook> {
        None
    }
    fn on_read(&self) -> Option<&dyn ReadHook> {
        None
    }
    fn on_write(&self) -> Option<&dyn WriteHook> {
        None
    }
    fn on_mkdir(&self) -> Option<&dyn MkdirHook> {
        None
    }
    fn on_rmdir(&self) -> Option<&dyn RmdirHook> {
        None
    }
    fn on_open_dir(&self) -> Option<&dyn OpenDirHook> {
        None
    }
    fn on_fsync(&self) -> Option<&dyn FsyncHook> {
        None
    }
    fn on_flush(&self) -> Option<&dyn FlushHook> {
        None
    }
    fn on_release(&self) -> Option<&dyn ReleaseHook> {
        None
    }
    fn on_truncate(&self) -> Option<&dyn TruncateHook> {
        None
    }
    fn on_get_attr(&self) -> Option<&dyn GetAttrHook> {
        None
    }
    fn on_chown(&self) -> Option<&dyn ChownHook> {
        None
    }
    fn on_chmod(&self) -> Option<&dyn ChmodHook> {
        None
    }
    fn on_utimens(&self) -> Option<&dyn UtimensHook> {
        None
    }
    fn on_allocate(&self) -> Option<&dyn AllocateHook> {
        None
    }
    fn on_get_lk(&self) -> Option<&dyn GetLkHook> {
        None
    }
    fn on_set_lk(&self) -> Option<&dyn SetLkHook> {
        None
    }
    fn on_set_lkw(&self) -> Option<&dyn SetLkwHook> {
        None
    }
    fn on_statfs(&self) -> Option<&dyn StatFsHook> {
        None
    }
    fn on_readlink(&self) -> Option<&dyn ReadlinkHook> {
        None
    }
    fn on_symlink(&self) -> Option<&dyn SymlinkHook> {
        None
    }
    fn on_create(&self) -> Option<&dyn CreateHook> {
        None
    }
    fn on_access(&self) -> Option<&dyn AccessHook> {
        None
    }
    fn on_link(&self) -> Option<&dyn LinkHook> {
        None
    }
    fn on_mknod(&self) -> Option<&dyn MknodHook> {
        None
    }
    fn on_rename(&self) -> Option<&dyn RenameHook> {
        None
    }
    fn on_unlink(&self) -> Option<&dyn UnlinkHook> {
        None
    }
    fn on_get_xattr(&self) -> Option<&dyn GetXattrHook> {
        None
    }
    fn on_list_xattr(&self) -> Option<&dyn ListXattrHook> {
        None
    }
    fn on_remove_xattr(&self) -> Option<&dyn RemoveXattrHook> {
        None
    }
    fn on_set_xattr(&self) -> Option<&dyn SetXattrHook> {
        None
    }
}
