use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{trace, warn};

use hookfs_common::{Attr, File, FileLock, FsResult, HookError};
use hookfs_interceptor::{
    Hook, Interceptor, Operation, RegisteredHook, contract_violation, outcome, replaced, status,
};

/// An open file whose operations go through the hook.
///
/// The hook is a snapshot taken when the file was opened: swapping or
/// disabling the filesystem's hook later does not affect handles that are
/// already open.
pub struct HookFile {
    inner: Box<dyn File>,
    path: PathBuf,
    hook: Option<RegisteredHook>,
}

impl HookFile {
    pub fn new(inner: Box<dyn File>, path: PathBuf, hook: Option<RegisteredHook>) -> Self {
        Self { inner, path, hook }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_hooked(&self) -> bool {
        self.hook.is_some()
    }

    fn intercept<'a, P: ?Sized>(
        &'a self,
        op: Operation,
        select: impl FnOnce(&'a dyn Hook) -> Option<&'a P>,
    ) -> Interceptor<'a, P> {
        Interceptor::for_hook(op, &self.path, self.hook.as_ref(), select)
    }
}

impl fmt::Display for HookFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HookFile{{path={}}}", self.path.display())
    }
}

/// Combine the outcome of an open or create with its post-hook's
/// replacement.
///
/// A replacement error over a successful open releases the handle, which
/// the caller never sees. A replacement success over a failed open leaves
/// no handle to return.
pub(crate) fn reconcile_handle(
    op: Operation,
    path: &Path,
    opened: FsResult<Box<dyn File>>,
    replacement: Result<(), HookError>,
) -> FsResult<Box<dyn File>> {
    match (opened, replacement) {
        (Ok(file), Ok(())) => Ok(file),
        (Ok(file), Err(err)) => {
            file.release();
            Err(err.errno())
        }
        (Err(_), Err(err)) => Err(err.errno()),
        (Err(errno), Ok(())) => contract_violation(
            op,
            path,
            &format!("post-hook reported success over a failed {op} ({errno})"),
        ),
    }
}

impl File for HookFile {
    fn read(&self, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        trace!("f.read path={} size={size} offset={offset}", self.path.display());
        self.intercept(Operation::Read, |h| h.on_read()).run_shaped(
            |h| h.pre_read(&self.path, size, offset),
            |data| data,
            || self.inner.read(size, offset),
            |h, out, ctx| h.post_read(outcome(out).map(Vec::as_slice), ctx),
            |original, replacement| {
                let data = replacement.map_err(|err| err.errno())?;
                if let Ok(original) = &original {
                    if original.len() != data.len() {
                        warn!(
                            "read {}: post-hook returned {} bytes where the file returned {}",
                            self.path.display(),
                            data.len(),
                            original.len()
                        );
                    }
                }
                Ok(data)
            },
        )
    }

    fn write(&self, data: &[u8], offset: u64) -> FsResult<usize> {
        trace!("f.write path={} len={} offset={offset}", self.path.display(), data.len());
        self.intercept(Operation::Write, |h| h.on_write()).run_shaped(
            |h| h.pre_write(&self.path, data, offset),
            |()| 0,
            || self.inner.write(data, offset),
            |h, out, ctx| h.post_write(*out, ctx),
            replaced,
        )
    }

    fn flush(&self) -> FsResult<()> {
        trace!("f.flush path={}", self.path.display());
        self.intercept(Operation::Flush, |h| h.on_flush()).run(
            |h| h.pre_flush(&self.path),
            || self.inner.flush(),
            |h, out, ctx| h.post_flush(*out, ctx),
        )
    }

    fn release(self: Box<Self>) {
        trace!("f.release path={}", self.path.display());
        let HookFile { inner, path, hook } = *self;
        Interceptor::for_hook(Operation::Release, &path, hook.as_ref(), |h| h.on_release())
            .observe(
                |h| h.pre_release(&path),
                move || inner.release(),
                |h, ctx| h.post_release(ctx),
            );
    }

    fn fsync(&self, flags: u32) -> FsResult<()> {
        trace!("f.fsync path={} flags={flags:#x}", self.path.display());
        self.intercept(Operation::Fsync, |h| h.on_fsync()).run(
            |h| h.pre_fsync(&self.path, flags),
            || self.inner.fsync(flags),
            |h, out, ctx| h.post_fsync(*out, ctx),
        )
    }

    fn truncate(&self, size: u64) -> FsResult<()> {
        trace!("f.truncate path={} size={size}", self.path.display());
        self.intercept(Operation::Truncate, |h| h.on_truncate()).run(
            |h| h.pre_truncate(&self.path, size),
            || self.inner.truncate(size),
            |h, out, ctx| h.post_truncate(*out, ctx),
        )
    }

    fn get_attr(&self) -> FsResult<Attr> {
        trace!("f.get_attr path={}", self.path.display());
        self.intercept(Operation::GetAttr, |h| h.on_get_attr()).run(
            |h| h.pre_get_attr(&self.path),
            || self.inner.get_attr(),
            |h, out, ctx| h.post_get_attr(outcome(out), ctx),
        )
    }

    fn chown(&self, uid: u32, gid: u32) -> FsResult<()> {
        trace!("f.chown path={} uid={uid} gid={gid}", self.path.display());
        self.intercept(Operation::Chown, |h| h.on_chown()).run(
            |h| h.pre_chown(&self.path, uid, gid),
            || self.inner.chown(uid, gid),
            |h, out, ctx| h.post_chown(*out, ctx),
        )
    }

    fn chmod(&self, mode: u32) -> FsResult<()> {
        trace!("f.chmod path={} mode={mode:#o}", self.path.display());
        self.intercept(Operation::Chmod, |h| h.on_chmod()).run(
            |h| h.pre_chmod(&self.path, mode),
            || self.inner.chmod(mode),
            |h, out, ctx| h.post_chmod(*out, ctx),
        )
    }

    fn utimens(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> FsResult<()> {
        trace!("f.utimens path={} atime={atime:?} mtime={mtime:?}", self.path.display());
        self.intercept(Operation::Utimens, |h| h.on_utimens()).run(
            |h| h.pre_utimens(&self.path, atime, mtime),
            || self.inner.utimens(atime, mtime),
            |h, out, ctx| h.post_utimens(*out, ctx),
        )
    }

    fn allocate(&self, offset: u64, size: u64, mode: u32) -> FsResult<()> {
        trace!(
            "f.allocate path={} offset={offset} size={size} mode={mode:#x}",
            self.path.display()
        );
        self.intercept(Operation::Allocate, |h| h.on_allocate()).run(
            |h| h.pre_allocate(&self.path, offset, size, mode),
            || self.inner.allocate(offset, size, mode),
            |h, out, ctx| h.post_allocate(*out, ctx),
        )
    }

    fn get_lk(&self, owner: u64, lock: &FileLock, flags: u32) -> FsResult<FileLock> {
        trace!("f.get_lk path={} owner={owner} lock={lock:?}", self.path.display());
        self.intercept(Operation::GetLk, |h| h.on_get_lk()).run(
            |h| h.pre_get_lk(&self.path, owner, lock, flags),
            || self.inner.get_lk(owner, lock, flags),
            |h, out, ctx| h.post_get_lk(outcome(out), ctx),
        )
    }

    fn set_lk(&self, owner: u64, lock: &FileLock, flags: u32) -> FsResult<()> {
        trace!("f.set_lk path={} owner={owner} lock={lock:?}", self.path.display());
        self.intercept(Operation::SetLk, |h| h.on_set_lk()).run(
            |h| h.pre_set_lk(&self.path, owner, lock, flags),
            || self.inner.set_lk(owner, lock, flags),
            |h, out, ctx| h.post_set_lk(status(out), ctx),
        )
    }

    fn set_lkw(&self, owner: u64, lock: &FileLock, flags: u32) -> FsResult<()> {
        trace!("f.set_lkw path={} owner={owner} lock={lock:?}", self.path.display());
        self.intercept(Operation::SetLkw, |h| h.on_set_lkw()).run(
            |h| h.pre_set_lkw(&self.path, owner, lock, flags),
            || self.inner.set_lkw(owner, lock, flags),
            |h, out, ctx| h.post_set_lkw(status(out), ctx),
        )
    }
}
