use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use log::{debug, error, trace, warn};

use hookfs_common::{
    Attr, DEFAULT_FS_NAME, DirEntry, File, FileSystem, FsResult, MountConfig, SetxattrFlags,
    StatFs,
};
use hookfs_interceptor::{
    Capabilities, Hook, Interceptor, Operation, RegisteredHook, outcome, replaced, status,
};

use crate::error::HookFsError;
use crate::hook_file::{HookFile, reconcile_handle};
use crate::loopback::LoopbackFs;

/// A filesystem that runs every operation through a hook before and after
/// passing it to the delegate `F`.
///
/// With no hook, or with a hook that implements no pairs, `HookFs` behaves
/// exactly like `F`. The hook can be swapped at any time; each request
/// reads the current hook once, and handles keep the hook they were opened
/// with.
pub struct HookFs<F> {
    original: PathBuf,
    mountpoint: PathBuf,
    fs_name: String,
    fs: F,
    hook: RwLock<Option<RegisteredHook>>,
    mounted: AtomicBool,
}

impl HookFs<LoopbackFs> {
    /// Hook a loopback of the `original` directory.
    pub fn new(
        original: impl Into<PathBuf>,
        mountpoint: impl Into<PathBuf>,
        hook: Option<Arc<dyn Hook>>,
    ) -> Result<Self, HookFsError> {
        let original = original.into();
        let fs = LoopbackFs::new(&original)?;
        Ok(Self::with_delegate(original, mountpoint, fs, hook))
    }

    pub fn from_config(
        config: &MountConfig,
        hook: Option<Arc<dyn Hook>>,
    ) -> Result<Self, HookFsError> {
        config.validate()?;
        Ok(Self::new(&config.original, &config.mountpoint, hook)?.with_fs_name(&config.fs_name))
    }
}

impl<F: FileSystem> HookFs<F> {
    pub fn with_delegate(
        original: impl Into<PathBuf>,
        mountpoint: impl Into<PathBuf>,
        fs: F,
        hook: Option<Arc<dyn Hook>>,
    ) -> Self {
        Self {
            original: original.into(),
            mountpoint: mountpoint.into(),
            fs_name: DEFAULT_FS_NAME.to_string(),
            fs,
            hook: RwLock::new(hook.map(RegisteredHook::new)),
            mounted: AtomicBool::new(false),
        }
    }

    pub fn with_fs_name(mut self, fs_name: impl Into<String>) -> Self {
        self.fs_name = fs_name.into();
        self
    }

    pub fn original(&self) -> &Path {
        &self.original
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn fs_name(&self) -> &str {
        &self.fs_name
    }

    pub fn delegate(&self) -> &F {
        &self.fs
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub fn is_hook_enabled(&self) -> bool {
        self.current_hook().is_some()
    }

    /// Operations the current hook implements.
    pub fn capabilities(&self) -> Capabilities {
        self.current_hook()
            .map(|hook| hook.capabilities())
            .unwrap_or_default()
    }

    /// Swap the hook, returning the previous one. Requests already in
    /// flight finish with the hook they started with. The new hook's
    /// initializer is not run.
    pub fn replace_hook(&self, hook: Option<Arc<dyn Hook>>) -> Option<Arc<dyn Hook>> {
        let registered = hook.map(RegisteredHook::new);
        let mut slot = self.hook.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *slot, registered);
        previous.map(|hook| hook.shared().clone())
    }

    fn current_hook(&self) -> Option<RegisteredHook> {
        self.hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Disable `failed` if it is still the current hook.
    fn disable_hook(&self, failed: &RegisteredHook) {
        let mut slot = self.hook.write().unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current.shared(), failed.shared()))
        {
            *slot = None;
        }
    }

    fn wrap(
        &self,
        path: &Path,
        file: Box<dyn File>,
        hook: Option<RegisteredHook>,
    ) -> Box<dyn File> {
        debug!("{}: new handle for {}", self.fs_name, path.display());
        Box::new(HookFile::new(file, path.to_path_buf(), hook))
    }
}

impl<F> fmt::Display for HookFs<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HookFs{{original={}, mountpoint={}, fs_name={}}}",
            self.original.display(),
            self.mountpoint.display(),
            self.fs_name
        )
    }
}

impl<F: FileSystem> FileSystem for HookFs<F> {
    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    fn get_attr(&self, path: &Path) -> FsResult<Attr> {
        trace!("fs.get_attr path={}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::GetAttr, path, hook.as_ref(), |h| h.on_get_attr()).run(
            |h| h.pre_get_attr(path),
            || self.fs.get_attr(path),
            |h, out, ctx| h.post_get_attr(outcome(out), ctx),
        )
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        trace!("fs.chmod path={} mode={mode:#o}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Chmod, path, hook.as_ref(), |h| h.on_chmod()).run(
            |h| h.pre_chmod(path, mode),
            || self.fs.chmod(path, mode),
            |h, out, ctx| h.post_chmod(*out, ctx),
        )
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> FsResult<()> {
        trace!("fs.chown path={} uid={uid} gid={gid}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Chown, path, hook.as_ref(), |h| h.on_chown()).run(
            |h| h.pre_chown(path, uid, gid),
            || self.fs.chown(path, uid, gid),
            |h, out, ctx| h.post_chown(*out, ctx),
        )
    }

    fn utimens(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        trace!("fs.utimens path={} atime={atime:?} mtime={mtime:?}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Utimens, path, hook.as_ref(), |h| h.on_utimens()).run(
            |h| h.pre_utimens(path, atime, mtime),
            || self.fs.utimens(path, atime, mtime),
            |h, out, ctx| h.post_utimens(*out, ctx),
        )
    }

    fn truncate(&self, path: &Path, size: u64) -> FsResult<()> {
        trace!("fs.truncate path={} size={size}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Truncate, path, hook.as_ref(), |h| h.on_truncate()).run(
            |h| h.pre_truncate(path, size),
            || self.fs.truncate(path, size),
            |h, out, ctx| h.post_truncate(*out, ctx),
        )
    }

    fn access(&self, path: &Path, mode: u32) -> FsResult<()> {
        trace!("fs.access path={} mode={mode:#o}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Access, path, hook.as_ref(), |h| h.on_access()).run(
            |h| h.pre_access(path, mode),
            || self.fs.access(path, mode),
            |h, out, ctx| h.post_access(*out, ctx),
        )
    }

    // -----------------------------------------------------------------------
    // Namespace
    // -----------------------------------------------------------------------

    fn link(&self, old: &Path, new: &Path) -> FsResult<()> {
        trace!("fs.link old={} new={}", old.display(), new.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Link, new, hook.as_ref(), |h| h.on_link()).run(
            |h| h.pre_link(old, new),
            || self.fs.link(old, new),
            |h, out, ctx| h.post_link(*out, ctx),
        )
    }

    fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        trace!("fs.mkdir path={} mode={mode:#o}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Mkdir, path, hook.as_ref(), |h| h.on_mkdir()).run(
            |h| h.pre_mkdir(path, mode),
            || self.fs.mkdir(path, mode),
            |h, out, ctx| h.post_mkdir(*out, ctx),
        )
    }

    fn mknod(&self, path: &Path, mode: u32, dev: u64) -> FsResult<()> {
        trace!("fs.mknod path={} mode={mode:#o} dev={dev}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Mknod, path, hook.as_ref(), |h| h.on_mknod()).run(
            |h| h.pre_mknod(path, mode, dev),
            || self.fs.mknod(path, mode, dev),
            |h, out, ctx| h.post_mknod(*out, ctx),
        )
    }

    fn rename(&self, old: &Path, new: &Path) -> FsResult<()> {
        trace!("fs.rename old={} new={}", old.display(), new.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Rename, old, hook.as_ref(), |h| h.on_rename()).run(
            |h| h.pre_rename(old, new),
            || self.fs.rename(old, new),
            |h, out, ctx| h.post_rename(*out, ctx),
        )
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        trace!("fs.rmdir path={}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Rmdir, path, hook.as_ref(), |h| h.on_rmdir()).run(
            |h| h.pre_rmdir(path),
            || self.fs.rmdir(path),
            |h, out, ctx| h.post_rmdir(*out, ctx),
        )
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        trace!("fs.unlink path={}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Unlink, path, hook.as_ref(), |h| h.on_unlink()).run(
            |h| h.pre_unlink(path),
            || self.fs.unlink(path),
            |h, out, ctx| h.post_unlink(*out, ctx),
        )
    }

    fn symlink(&self, target: &Path, link: &Path) -> FsResult<()> {
        trace!("fs.symlink target={} link={}", target.display(), link.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Symlink, link, hook.as_ref(), |h| h.on_symlink()).run(
            |h| h.pre_symlink(target, link),
            || self.fs.symlink(target, link),
            |h, out, ctx| h.post_symlink(*out, ctx),
        )
    }

    fn readlink(&self, path: &Path) -> FsResult<PathBuf> {
        trace!("fs.readlink path={}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::Readlink, path, hook.as_ref(), |h| h.on_readlink()).run(
            |h| h.pre_readlink(path),
            || self.fs.readlink(path),
            |h, out, ctx| h.post_readlink(outcome(out).map(PathBuf::as_path), ctx),
        )
    }

    // -----------------------------------------------------------------------
    // Extended attributes
    // -----------------------------------------------------------------------

    fn get_xattr(&self, path: &Path, name: &str) -> FsResult<Vec<u8>> {
        trace!("fs.get_xattr path={} name={name}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::GetXattr, path, hook.as_ref(), |h| h.on_get_xattr()).run(
            |h| h.pre_get_xattr(path, name),
            || self.fs.get_xattr(path, name),
            |h, out, ctx| h.post_get_xattr(outcome(out).map(Vec::as_slice), ctx),
        )
    }

    fn list_xattr(&self, path: &Path) -> FsResult<Vec<String>> {
        trace!("fs.list_xattr path={}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::ListXattr, path, hook.as_ref(), |h| {
            h.on_list_xattr()
        })
        .run(
            |h| h.pre_list_xattr(path),
            || self.fs.list_xattr(path),
            |h, out, ctx| h.post_list_xattr(outcome(out).map(Vec::as_slice), ctx),
        )
    }

    fn remove_xattr(&self, path: &Path, name: &str) -> FsResult<()> {
        trace!("fs.remove_xattr path={} name={name}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::RemoveXattr, path, hook.as_ref(), |h| {
            h.on_remove_xattr()
        })
        .run(
            |h| h.pre_remove_xattr(path, name),
            || self.fs.remove_xattr(path, name),
            |h, out, ctx| h.post_remove_xattr(*out, ctx),
        )
    }

    fn set_xattr(
        &self,
        path: &Path,
        name: &str,
        value: &[u8],
        flags: SetxattrFlags,
    ) -> FsResult<()> {
        trace!(
            "fs.set_xattr path={} name={name} len={} flags={:#x}",
            path.display(),
            value.len(),
            flags.bits()
        );
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::SetXattr, path, hook.as_ref(), |h| h.on_set_xattr()).run(
            |h| h.pre_set_xattr(path, name, value, flags),
            || self.fs.set_xattr(path, name, value, flags),
            |h, out, ctx| h.post_set_xattr(*out, ctx),
        )
    }

    // -----------------------------------------------------------------------
    // Handles and directories
    // -----------------------------------------------------------------------

    fn open(&self, path: &Path, flags: u32) -> FsResult<Box<dyn File>> {
        trace!("fs.open path={} flags={flags:#o}", path.display());
        let hook = self.current_hook();
        let file = Interceptor::for_hook(Operation::Open, path, hook.as_ref(), |h| h.on_open())
            .run_guarded(
                |h| h.pre_open(path, flags),
                || self.fs.open(path, flags),
                |h, out, ctx| h.post_open(status(out), ctx),
                |opened, replacement| reconcile_handle(Operation::Open, path, opened, replacement),
            )?;
        Ok(self.wrap(path, file, hook))
    }

    fn create(&self, path: &Path, flags: u32, mode: u32) -> FsResult<Box<dyn File>> {
        trace!("fs.create path={} flags={flags:#o} mode={mode:#o}", path.display());
        let hook = self.current_hook();
        let file = Interceptor::for_hook(Operation::Create, path, hook.as_ref(), |h| h.on_create())
            .run_shaped(
                |h| h.pre_create(path, flags, mode),
                |file| file,
                || self.fs.create(path, flags, mode),
                |h, out, ctx| h.post_create(status(out), ctx),
                |created, replacement| {
                    reconcile_handle(Operation::Create, path, created, replacement)
                },
            )?;
        Ok(self.wrap(path, file, hook))
    }

    fn open_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        trace!("fs.open_dir path={}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::OpenDir, path, hook.as_ref(), |h| h.on_open_dir())
            .run_guarded(
                |h| h.pre_open_dir(path),
                || self.fs.open_dir(path),
                |h, out, ctx| h.post_open_dir(outcome(out).map(Vec::as_slice), ctx),
                replaced,
            )
    }

    fn statfs(&self, path: &Path) -> Option<StatFs> {
        trace!("fs.statfs path={}", path.display());
        let hook = self.current_hook();
        Interceptor::for_hook(Operation::StatFs, path, hook.as_ref(), |h| h.on_statfs())
            .run_shaped(
                |h| h.pre_statfs(path),
                |()| None,
                || Ok(self.fs.statfs(path)),
                |h, out, ctx| h.post_statfs(out.as_ref().ok().and_then(Option::as_ref), ctx),
                |out, replacement| match replacement {
                    Ok(()) => out,
                    Err(_) => Ok(None),
                },
            )
            .ok()
            .flatten()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    fn on_mount(&self) {
        trace!("fs.on_mount {self}");
        if self.mounted.swap(true, Ordering::AcqRel) {
            warn!("{self} is already mounted");
            return;
        }
        self.fs.on_mount();

        let Some(hook) = self.current_hook() else {
            return;
        };
        let Some(init) = hook.hook().on_init() else {
            return;
        };
        if let Err(err) = init.init() {
            error!("hook init failed for {self}: {err}");
            warn!("disabling hook for {self}");
            self.disable_hook(&hook);
        }
    }

    fn on_unmount(&self) {
        trace!("fs.on_unmount {self}");
        if self.mounted.swap(false, Ordering::AcqRel) {
            self.fs.on_unmount();
        }
    }
}
