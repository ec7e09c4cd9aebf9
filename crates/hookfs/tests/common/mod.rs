//! A hook that implements every pair and does whatever the test scripts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use hookfs::HookFs;
use hookfs_common::types::{S_IFREG, timestamp};
use hookfs_common::{
    Attr, DirEntry, Errno, File, FileLock, HookError, LockType, SetxattrFlags, StatFs,
};
use hookfs_interceptor::*;
use hookfs_test_support::{FakeFs, NullFile};

/// What a pre-hook does when it does not proceed.
#[derive(Debug, Clone, Copy)]
pub enum PreScript {
    /// Short-circuit with the canned value for the operation.
    ShortCircuit,
    Fail(Errno),
}

/// What a post-hook does when it does not keep the outcome.
#[derive(Debug, Clone, Copy)]
pub enum PostScript {
    /// Replace the outcome with the canned value for the operation.
    Replace,
    Fail(Errno),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Init,
    Pre { op: Operation, path: PathBuf },
    /// `token` is the context the matching pre-hook proceeded with.
    Post {
        op: Operation,
        status: Status,
        token: Option<u64>,
    },
}

/// Inode number carried by every canned value.
pub const CANNED_INO: u64 = 4242;

pub fn canned_attr() -> Attr {
    Attr {
        ino: CANNED_INO,
        size: 4,
        blocks: 1,
        atime: timestamp(1, 0),
        mtime: timestamp(2, 0),
        ctime: timestamp(3, 0),
        mode: S_IFREG | 0o600,
        nlink: 1,
        uid: 7,
        gid: 7,
        rdev: 0,
        blksize: 4096,
    }
}

pub fn canned_lock() -> FileLock {
    FileLock {
        start: 0,
        end: 10,
        typ: LockType::Read,
        pid: CANNED_INO as u32,
    }
}

pub fn canned_listing() -> Vec<DirEntry> {
    vec![DirEntry {
        name: "scripted".into(),
        ino: CANNED_INO,
        mode: S_IFREG,
    }]
}

#[derive(Default)]
pub struct ScriptedHook {
    events: Mutex<Vec<Event>>,
    next_token: AtomicU64,
    pre: Mutex<HashMap<Operation, PreScript>>,
    post: Mutex<HashMap<Operation, PostScript>>,
    payload: Mutex<Vec<u8>>,
    init_error: Mutex<Option<Errno>>,
    init_calls: AtomicUsize,
    handles: AtomicUsize,
}

impl ScriptedHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_pre(&self, op: Operation, script: PreScript) -> &Self {
        self.pre.lock().unwrap().insert(op, script);
        self
    }

    pub fn script_post(&self, op: Operation, script: PostScript) -> &Self {
        self.post.lock().unwrap().insert(op, script);
        self
    }

    pub fn clear_scripts(&self) {
        self.pre.lock().unwrap().clear();
        self.post.lock().unwrap().clear();
    }

    /// Bytes used for canned reads, xattr values and write counts.
    pub fn set_payload(&self, payload: impl Into<Vec<u8>>) {
        *self.payload.lock().unwrap() = payload.into();
    }

    pub fn fail_init(&self, errno: Errno) {
        *self.init_error.lock().unwrap() = Some(errno);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Handles handed out by a create short-circuit.
    pub fn synthesized_handles(&self) -> usize {
        self.handles.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn pre_calls(&self, op: Operation) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Pre { op: o, .. } if *o == op))
            .count()
    }

    pub fn post_calls(&self, op: Operation) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Post { op: o, .. } if *o == op))
            .count()
    }

    /// The status the last post-hook for `op` observed.
    pub fn last_post_status(&self, op: Operation) -> Option<Status> {
        self.events().iter().rev().find_map(|e| match e {
            Event::Post { op: o, status, .. } if *o == op => Some(*status),
            _ => None,
        })
    }

    fn payload(&self) -> Vec<u8> {
        self.payload.lock().unwrap().clone()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn pre<T>(&self, op: Operation, path: &Path, value: impl FnOnce() -> T) -> Pre<T> {
        self.record(Event::Pre {
            op,
            path: path.to_path_buf(),
        });
        let script = self.pre.lock().unwrap().get(&op).copied();
        match script {
            Some(PreScript::ShortCircuit) => Pre::short_circuit(value()),
            Some(PreScript::Fail(errno)) => Pre::fail(errno),
            None => Pre::proceed_with(self.next_token.fetch_add(1, Ordering::SeqCst)),
        }
    }

    fn post<T>(
        &self,
        op: Operation,
        status: Status,
        ctx: HookContext,
        value: impl FnOnce() -> T,
    ) -> Post<T> {
        self.record(Event::Post {
            op,
            status,
            token: ctx.downcast::<u64>().ok(),
        });
        let script = self.post.lock().unwrap().get(&op).copied();
        match script {
            Some(PostScript::Replace) => Post::replace(value()),
            Some(PostScript::Fail(errno)) => Post::fail(errno),
            None => Post::Keep,
        }
    }
}

/// A scripted hook over a fresh fake filesystem.
pub fn hooked(fake: &FakeFs) -> (Arc<ScriptedHook>, HookFs<FakeFs>) {
    let hook = ScriptedHook::new();
    let shared: Arc<dyn Hook> = hook.clone();
    let fs = HookFs::with_delegate("/original", "/mnt", fake.clone(), Some(shared));
    (hook, fs)
}

impl InitHook for ScriptedHook {
    fn init(&self) -> Result<(), HookError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.record(Event::Init);
        match *self.init_error.lock().unwrap() {
            Some(errno) => Err(errno.into()),
            None => Ok(()),
        }
    }
}

impl OpenHook for ScriptedHook {
    fn pre_open(&self, path: &Path, _flags: u32) -> Pre {
        self.pre(Operation::Open, path, || ())
    }
    fn post_open(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Open, status, ctx, || ())
    }
}

impl ReadHook for ScriptedHook {
    fn pre_read(&self, path: &Path, _size: usize, _offset: u64) -> Pre<Vec<u8>> {
        self.pre(Operation::Read, path, || self.payload())
    }
    fn post_read(&self, outcome: Result<&[u8], Errno>, ctx: HookContext) -> Post<Vec<u8>> {
        self.post(Operation::Read, outcome.map(drop), ctx, || self.payload())
    }
}

impl WriteHook for ScriptedHook {
    fn pre_write(&self, path: &Path, _data: &[u8], _offset: u64) -> Pre {
        self.pre(Operation::Write, path, || ())
    }
    fn post_write(&self, outcome: Result<usize, Errno>, ctx: HookContext) -> Post<usize> {
        self.post(Operation::Write, outcome.map(drop), ctx, || self.payload().len())
    }
}

impl MkdirHook for ScriptedHook {
    fn pre_mkdir(&self, path: &Path, _mode: u32) -> Pre {
        self.pre(Operation::Mkdir, path, || ())
    }
    fn post_mkdir(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Mkdir, status, ctx, || ())
    }
}

impl RmdirHook for ScriptedHook {
    fn pre_rmdir(&self, path: &Path) -> Pre {
        self.pre(Operation::Rmdir, path, || ())
    }
    fn post_rmdir(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Rmdir, status, ctx, || ())
    }
}

impl OpenDirHook for ScriptedHook {
    fn pre_open_dir(&self, path: &Path) -> Pre {
        self.pre(Operation::OpenDir, path, || ())
    }
    fn post_open_dir(
        &self,
        outcome: Result<&[DirEntry], Errno>,
        ctx: HookContext,
    ) -> Post<Vec<DirEntry>> {
        self.post(Operation::OpenDir, outcome.map(drop), ctx, canned_listing)
    }
}

impl FsyncHook for ScriptedHook {
    fn pre_fsync(&self, path: &Path, _flags: u32) -> Pre {
        self.pre(Operation::Fsync, path, || ())
    }
    fn post_fsync(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Fsync, status, ctx, || ())
    }
}

impl FlushHook for ScriptedHook {
    fn pre_flush(&self, path: &Path) -> Pre {
        self.pre(Operation::Flush, path, || ())
    }
    fn post_flush(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Flush, status, ctx, || ())
    }
}

impl ReleaseHook for ScriptedHook {
    fn pre_release(&self, path: &Path) -> (bool, HookContext) {
        match self.pre::<()>(Operation::Release, path, || ()) {
            Pre::Proceed(ctx) => (false, ctx),
            Pre::ShortCircuit(_) => (true, HookContext::empty()),
        }
    }
    fn post_release(&self, ctx: HookContext) -> bool {
        self.post::<()>(Operation::Release, Ok(()), ctx, || ()).is_replace()
    }
}

impl TruncateHook for ScriptedHook {
    fn pre_truncate(&self, path: &Path, _size: u64) -> Pre {
        self.pre(Operation::Truncate, path, || ())
    }
    fn post_truncate(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Truncate, status, ctx, || ())
    }
}

impl GetAttrHook for ScriptedHook {
    fn pre_get_attr(&self, path: &Path) -> Pre<Attr> {
        self.pre(Operation::GetAttr, path, canned_attr)
    }
    fn post_get_attr(&self, outcome: Result<&Attr, Errno>, ctx: HookContext) -> Post<Attr> {
        self.post(Operation::GetAttr, outcome.map(drop), ctx, canned_attr)
    }
}

impl ChownHook for ScriptedHook {
    fn pre_chown(&self, path: &Path, _uid: u32, _gid: u32) -> Pre {
        self.pre(Operation::Chown, path, || ())
    }
    fn post_chown(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Chown, status, ctx, || ())
    }
}

impl ChmodHook for ScriptedHook {
    fn pre_chmod(&self, path: &Path, _mode: u32) -> Pre {
        self.pre(Operation::Chmod, path, || ())
    }
    fn post_chmod(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Chmod, status, ctx, || ())
    }
}

impl UtimensHook for ScriptedHook {
    fn pre_utimens(
        &self,
        path: &Path,
        _atime: Option<SystemTime>,
        _mtime: Option<SystemTime>,
    ) -> Pre {
        self.pre(Operation::Utimens, path, || ())
    }
    fn post_utimens(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Utimens, status, ctx, || ())
    }
}

impl AllocateHook for ScriptedHook {
    fn pre_allocate(&self, path: &Path, _offset: u64, _size: u64, _mode: u32) -> Pre {
        self.pre(Operation::Allocate, path, || ())
    }
    fn post_allocate(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Allocate, status, ctx, || ())
    }
}

impl GetLkHook for ScriptedHook {
    fn pre_get_lk(&self, path: &Path, _owner: u64, _lock: &FileLock, _flags: u32) -> Pre<FileLock> {
        self.pre(Operation::GetLk, path, canned_lock)
    }
    fn post_get_lk(
        &self,
        outcome: Result<&FileLock, Errno>,
        ctx: HookContext,
    ) -> Post<FileLock> {
        self.post(Operation::GetLk, outcome.map(drop), ctx, canned_lock)
    }
}

impl SetLkHook for ScriptedHook {
    fn pre_set_lk(&self, path: &Path, _owner: u64, _lock: &FileLock, _flags: u32) -> Pre {
        self.pre(Operation::SetLk, path, || ())
    }
    fn post_set_lk(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::SetLk, status, ctx, || ())
    }
}

impl SetLkwHook for ScriptedHook {
    fn pre_set_lkw(&self, path: &Path, _owner: u64, _lock: &FileLock, _flags: u32) -> Pre {
        self.pre(Operation::SetLkw, path, || ())
    }
    fn post_set_lkw(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::SetLkw, status, ctx, || ())
    }
}

impl StatFsHook for ScriptedHook {
    /// A missing result is recorded as `NoData`.
    fn pre_statfs(&self, path: &Path) -> Pre {
        self.pre(Operation::StatFs, path, || ())
    }
    fn post_statfs(&self, outcome: Option<&StatFs>, ctx: HookContext) -> Post {
        let status = outcome.map(drop).ok_or(Errno::NoData);
        self.post(Operation::StatFs, status, ctx, || ())
    }
}

impl ReadlinkHook for ScriptedHook {
    fn pre_readlink(&self, path: &Path) -> Pre<PathBuf> {
        self.pre(Operation::Readlink, path, || PathBuf::from("/scripted"))
    }
    fn post_readlink(&self, outcome: Result<&Path, Errno>, ctx: HookContext) -> Post<PathBuf> {
        self.post(Operation::Readlink, outcome.map(drop), ctx, || {
            PathBuf::from("/scripted")
        })
    }
}

impl SymlinkHook for ScriptedHook {
    fn pre_symlink(&self, _target: &Path, link: &Path) -> Pre {
        self.pre(Operation::Symlink, link, || ())
    }
    fn post_symlink(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Symlink, status, ctx, || ())
    }
}

impl CreateHook for ScriptedHook {
    fn pre_create(&self, path: &Path, _flags: u32, _mode: u32) -> Pre<Box<dyn File>> {
        self.pre(Operation::Create, path, || {
            self.handles.fetch_add(1, Ordering::SeqCst);
            Box::new(NullFile::default()) as Box<dyn File>
        })
    }
    fn post_create(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Create, status, ctx, || ())
    }
}

impl AccessHook for ScriptedHook {
    fn pre_access(&self, path: &Path, _mode: u32) -> Pre {
        self.pre(Operation::Access, path, || ())
    }
    fn post_access(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Access, status, ctx, || ())
    }
}

impl LinkHook for ScriptedHook {
    fn pre_link(&self, _old: &Path, new: &Path) -> Pre {
        self.pre(Operation::Link, new, || ())
    }
    fn post_link(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Link, status, ctx, || ())
    }
}

impl MknodHook for ScriptedHook {
    fn pre_mknod(&self, path: &Path, _mode: u32, _dev: u64) -> Pre {
        self.pre(Operation::Mknod, path, || ())
    }
    fn post_mknod(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Mknod, status, ctx, || ())
    }
}

impl RenameHook for ScriptedHook {
    fn pre_rename(&self, old: &Path, _new: &Path) -> Pre {
        self.pre(Operation::Rename, old, || ())
    }
    fn post_rename(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Rename, status, ctx, || ())
    }
}

impl UnlinkHook for ScriptedHook {
    fn pre_unlink(&self, path: &Path) -> Pre {
        self.pre(Operation::Unlink, path, || ())
    }
    fn post_unlink(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::Unlink, status, ctx, || ())
    }
}

impl GetXattrHook for ScriptedHook {
    fn pre_get_xattr(&self, path: &Path, _name: &str) -> Pre<Vec<u8>> {
        self.pre(Operation::GetXattr, path, || self.payload())
    }
    fn post_get_xattr(&self, outcome: Result<&[u8], Errno>, ctx: HookContext) -> Post<Vec<u8>> {
        self.post(Operation::GetXattr, outcome.map(drop), ctx, || self.payload())
    }
}

impl ListXattrHook for ScriptedHook {
    fn pre_list_xattr(&self, path: &Path) -> Pre<Vec<String>> {
        self.pre(Operation::ListXattr, path, || vec!["user.scripted".to_string()])
    }
    fn post_list_xattr(
        &self,
        outcome: Result<&[String], Errno>,
        ctx: HookContext,
    ) -> Post<Vec<String>> {
        self.post(Operation::ListXattr, outcome.map(drop), ctx, || {
            vec!["user.scripted".to_string()]
        })
    }
}

impl RemoveXattrHook for ScriptedHook {
    fn pre_remove_xattr(&self, path: &Path, _name: &str) -> Pre {
        self.pre(Operation::RemoveXattr, path, || ())
    }
    fn post_remove_xattr(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::RemoveXattr, status, ctx, || ())
    }
}

impl SetXattrHook for ScriptedHook {
    fn pre_set_xattr(&self, path: &Path, _name: &str, _value: &[u8], _flags: SetxattrFlags) -> Pre {
        self.pre(Operation::SetXattr, path, || ())
    }
    fn post_set_xattr(&self, status: Status, ctx: HookContext) -> Post {
        self.post(Operation::SetXattr, status, ctx, || ())
    }
}

impl Hook for ScriptedHook {
    fn on_init(&self) -> Option<&dyn InitHook> {
        Some(self)
    }
    fn on_open(&self) -> Option<&dyn OpenHook> {
        Some(self)
    }
    fn on_read(&self) -> Option<&dyn ReadHook> {
        Some(self)
    }
    fn on_write(&self) -> Option<&dyn WriteHook> {
        Some(self)
    }
    fn on_mkdir(&self) -> Option<&dyn MkdirHook> {
        Some(self)
    }
    fn on_rmdir(&self) -> Option<&dyn RmdirHook> {
        Some(self)
    }
    fn on_open_dir(&self) -> Option<&dyn OpenDirHook> {
        Some(self)
    }
    fn on_fsync(&self) -> Option<&dyn FsyncHook> {
        Some(self)
    }
    fn on_flush(&self) -> Option<&dyn FlushHook> {
        Some(self)
    }
    fn on_release(&self) -> Option<&dyn ReleaseHook> {
        Some(self)
    }
    fn on_truncate(&self) -> Option<&dyn TruncateHook> {
        Some(self)
    }
    fn on_get_attr(&self) -> Option<&dyn GetAttrHook> {
        Some(self)
    }
    fn on_chown(&self) -> Option<&dyn ChownHook> {
        Some(self)
    }
    fn on_chmod(&self) -> Option<&dyn ChmodHook> {
        Some(self)
    }
    fn on_utimens(&self) -> Option<&dyn UtimensHook> {
        Some(self)
    }
    fn on_allocate(&self) -> Option<&dyn AllocateHook> {
        Some(self)
    }
    fn on_get_lk(&self) -> Option<&dyn GetLkHook> {
        Some(self)
    }
    fn on_set_lk(&self) -> Option<&dyn SetLkHook> {
        Some(self)
    }
    fn on_set_lkw(&self) -> Option<&dyn SetLkwHook> {
        Some(self)
    }
    fn on_statfs(&self) -> Option<&dyn StatFsHook> {
        Some(self)
    }
    fn on_readlink(&self) -> Option<&dyn ReadlinkHook> {
        Some(self)
    }
    fn on_symlink(&self) -> Option<&dyn SymlinkHook> {
        Some(self)
    }
    fn on_create(&self) -> Option<&dyn CreateHook> {
        Some(self)
    }
    fn on_access(&self) -> Option<&dyn AccessHook> {
        Some(self)
    }
    fn on_link(&self) -> Option<&dyn LinkHook> {
        Some(self)
    }
    fn on_mknod(&self) -> Option<&dyn MknodHook> {
        Some(self)
    }
    fn on_rename(&self) -> Option<&dyn RenameHook> {
        Some(self)
    }
    fn on_unlink(&self) -> Option<&dyn UnlinkHook> {
        Some(self)
    }
    fn on_get_xattr(&self) -> Option<&dyn GetXattrHook> {
        Some(self)
    }
    fn on_list_xattr(&self) -> Option<&dyn ListXattrHook> {
        Some(self)
    }
    fn on_remove_xattr(&self) -> Option<&dyn RemoveXattrHook> {
        Some(self)
    }
    fn on_set_xattr(&self) -> Option<&dyn SetXattrHook> {
        Some(self)
    }
}

/// Time one second after the epoch, for utimens calls.
pub fn epoch_plus_one() -> SystemTime {
    UNIX_EPOCH + std::time::Duration::from_secs(1)
}
