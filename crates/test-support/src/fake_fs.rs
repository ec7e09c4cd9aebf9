use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hookfs_common::types::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use hookfs_common::{
    Attr, DirEntry, Errno, File, FileLock, FileSystem, FsResult, LockType, SetxattrFlags, StatFs,
};

/// Timestamp every fake node starts with.
pub const FAKE_TIME: Duration = Duration::from_secs(1_700_000_000);

const ROOT_INO: u64 = 1;

// Open flags, Linux values.
const O_EXCL: u32 = 0o200;
const O_TRUNC: u32 = 0o1000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Key of a path in the node table: its normal components only, so `/a`,
/// `a` and `a/` are the same node and the root is the empty path.
fn key(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

enum NodeKind {
    File(Vec<u8>),
    Dir,
    Symlink(PathBuf),
    Special,
}

struct Node {
    kind: NodeKind,
    ino: u64,
    mode: u32,
    uid: u32,
    gid: u32,
    rdev: u64,
    nlink: u64,
    atime: SystemTime,
    mtime: SystemTime,
    ctime: SystemTime,
    xattrs: BTreeMap<String, Vec<u8>>,
    locks: Vec<(u64, FileLock)>,
}

impl Node {
    fn new(kind: NodeKind, ino: u64, mode: u32) -> Self {
        let time = UNIX_EPOCH + FAKE_TIME;
        Self {
            kind,
            ino,
            mode,
            uid: 0,
            gid: 0,
            rdev: 0,
            nlink: 1,
            atime: time,
            mtime: time,
            ctime: time,
            xattrs: BTreeMap::new(),
            locks: Vec::new(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn attr(&self) -> Attr {
        let size = match &self.kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Symlink(target) => target.as_os_str().len() as u64,
            NodeKind::Dir | NodeKind::Special => 0,
        };
        Attr {
            ino: self.ino,
            size,
            blocks: size.div_ceil(512),
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            mode: self.mode,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.rdev,
            blksize: 4096,
        }
    }

    fn data_mut(&mut self) -> FsResult<&mut Vec<u8>> {
        match &mut self.kind {
            NodeKind::File(data) => Ok(data),
            NodeKind::Dir => Err(Errno::IsDirectory),
            NodeKind::Symlink(_) | NodeKind::Special => Err(Errno::InvalidArgument),
        }
    }

    fn chown(&mut self, uid: u32, gid: u32) {
        if uid != u32::MAX {
            self.uid = uid;
        }
        if gid != u32::MAX {
            self.gid = gid;
        }
    }

    fn chmod(&mut self, mode: u32) {
        self.mode = (self.mode & S_IFMT) | (mode & !S_IFMT);
    }

    fn utimens(&mut self, atime: Option<SystemTime>, mtime: Option<SystemTime>) {
        if let Some(atime) = atime {
            self.atime = atime;
        }
        if let Some(mtime) = mtime {
            self.mtime = mtime;
        }
    }

    fn conflicting_lock(&self, owner: u64, lock: &FileLock) -> Option<FileLock> {
        self.locks
            .iter()
            .filter(|(holder, _)| *holder != owner)
            .map(|(_, held)| *held)
            .find(|held| {
                held.overlaps(lock)
                    && (held.typ == LockType::Write || lock.typ == LockType::Write)
            })
    }

    fn set_lock(&mut self, owner: u64, lock: &FileLock) -> FsResult<()> {
        if lock.typ == LockType::Unlock {
            self.locks
                .retain(|(holder, held)| *holder != owner || !held.overlaps(lock));
            return Ok(());
        }
        if self.conflicting_lock(owner, lock).is_some() {
            return Err(Errno::WouldBlock);
        }
        self.locks.push((owner, *lock));
        Ok(())
    }
}

type NodeRef = Arc<Mutex<Node>>;

#[derive(Default)]
struct Inner {
    nodes: Mutex<BTreeMap<PathBuf, NodeRef>>,
    next_ino: AtomicU64,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, Errno>>,
    mounts: AtomicUsize,
    unmounts: AtomicUsize,
    open_handles: AtomicUsize,
    releases: AtomicUsize,
}

impl Inner {
    /// Count a call to `op` and return the failure injected for it, if any.
    fn enter(&self, op: &'static str) -> FsResult<()> {
        *lock(&self.calls).entry(op).or_default() += 1;
        match lock(&self.failures).get(op) {
            Some(errno) => Err(*errno),
            None => Ok(()),
        }
    }

    fn alloc_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }

    fn node(&self, path: &Path) -> FsResult<NodeRef> {
        lock(&self.nodes)
            .get(&key(path))
            .cloned()
            .ok_or(Errno::NotFound)
    }

    /// Insert a new node at `path`, whose parent must be an existing
    /// directory.
    fn insert(&self, path: &Path, kind: NodeKind, mode: u32) -> FsResult<NodeRef> {
        let k = key(path);
        let parent = k.parent().ok_or(Errno::Exists)?;
        let mut nodes = lock(&self.nodes);
        match nodes.get(parent) {
            Some(node) if lock(node).is_dir() => {}
            Some(_) => return Err(Errno::NotDirectory),
            None => return Err(Errno::NotFound),
        }
        if nodes.contains_key(&k) {
            return Err(Errno::Exists);
        }
        let node = Arc::new(Mutex::new(Node::new(kind, self.alloc_ino(), mode)));
        nodes.insert(k, Arc::clone(&node));
        Ok(node)
    }
}

/// In-memory [`FileSystem`] that counts every call and can be told to
/// fail any operation.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect another. Operation names match the hook operation names
/// (`"open"`, `"read"`, `"getattr"`, ...). Timestamps and inode numbers
/// are deterministic.
#[derive(Clone)]
pub struct FakeFs {
    inner: Arc<Inner>,
}

impl Default for FakeFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFs {
    /// An empty filesystem containing only the root directory.
    pub fn new() -> Self {
        let inner = Inner {
            next_ino: AtomicU64::new(ROOT_INO + 1),
            ..Default::default()
        };
        let mut root = Node::new(NodeKind::Dir, ROOT_INO, S_IFDIR | 0o755);
        root.nlink = 2;
        lock(&inner.nodes).insert(PathBuf::new(), Arc::new(Mutex::new(root)));
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Add a regular file, creating parent directories as needed.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> &Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let node = self
            .inner
            .insert(path, NodeKind::File(Vec::new()), S_IFREG | 0o644)
            .or_else(|_| self.inner.node(path))
            .expect("fixture path is not a file");
        let mut node = lock(&node);
        *node.data_mut().expect("fixture path is not a file") = contents.as_ref().to_vec();
        drop(node);
        self
    }

    /// Add a directory and any missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> &Self {
        let mut current = PathBuf::new();
        for component in key(path.as_ref()).components() {
            current.push(component);
            if self.inner.node(&current).is_err() {
                self.inner
                    .insert(&current, NodeKind::Dir, S_IFDIR | 0o755)
                    .expect("fixture parent is not a directory");
            }
        }
        self
    }

    /// Make every later call to `op` fail with `errno`.
    pub fn fail(&self, op: &'static str, errno: Errno) {
        lock(&self.inner.failures).insert(op, errno);
    }

    pub fn clear_failures(&self) {
        lock(&self.inner.failures).clear();
    }

    /// Number of calls to `op` so far, failed ones included.
    pub fn calls(&self, op: &str) -> usize {
        lock(&self.inner.calls).get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.inner.calls).values().sum()
    }

    pub fn reset_calls(&self) {
        lock(&self.inner.calls).clear();
    }

    pub fn mount_count(&self) -> usize {
        self.inner.mounts.load(Ordering::SeqCst)
    }

    pub fn unmount_count(&self) -> usize {
        self.inner.unmounts.load(Ordering::SeqCst)
    }

    /// Handles opened or created and not yet released.
    pub fn open_handles(&self) -> usize {
        self.inner.open_handles.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.inner.node(path.as_ref()).is_ok()
    }

    /// Contents of a regular file, bypassing call counting.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let node = self.inner.node(path.as_ref()).ok()?;
        let node = lock(&node);
        match &node.kind {
            NodeKind::File(data) => Some(data.clone()),
            _ => None,
        }
    }

    fn handle(&self, node: NodeRef) -> Box<dyn File> {
        self.inner.open_handles.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeFile {
            fs: Arc::clone(&self.inner),
            node,
        })
    }
}

impl FileSystem for FakeFs {
    fn get_attr(&self, path: &Path) -> FsResult<Attr> {
        self.inner.enter("getattr")?;
        Ok(lock(&*self.inner.node(path)?).attr())
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.inner.enter("chmod")?;
        lock(&*self.inner.node(path)?).chmod(mode);
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> FsResult<()> {
        self.inner.enter("chown")?;
        lock(&*self.inner.node(path)?).chown(uid, gid);
        Ok(())
    }

    fn utimens(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        self.inner.enter("utimens")?;
        lock(&*self.inner.node(path)?).utimens(atime, mtime);
        Ok(())
    }

    fn truncate(&self, path: &Path, size: u64) -> FsResult<()> {
        self.inner.enter("truncate")?;
        let node = self.inner.node(path)?;
        lock(&node).data_mut()?.resize(size as usize, 0);
        Ok(())
    }

    fn access(&self, path: &Path, _mode: u32) -> FsResult<()> {
        self.inner.enter("access")?;
        self.inner.node(path).map(drop)
    }

    fn link(&self, old: &Path, new: &Path) -> FsResult<()> {
        self.inner.enter("link")?;
        let node = self.inner.node(old)?;
        if lock(&node).is_dir() {
            return Err(Errno::NotPermitted);
        }
        let k = key(new);
        let mut nodes = lock(&self.inner.nodes);
        if nodes.contains_key(&k) {
            return Err(Errno::Exists);
        }
        match k.parent().and_then(|parent| nodes.get(parent)) {
            Some(parent) if lock(parent).is_dir() => {}
            Some(_) => return Err(Errno::NotDirectory),
            None => return Err(Errno::NotFound),
        }
        lock(&node).nlink += 1;
        nodes.insert(k, node);
        Ok(())
    }

    fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.inner.enter("mkdir")?;
        let node = self.inner.insert(path, NodeKind::Dir, S_IFDIR | (mode & !S_IFMT))?;
        lock(&node).nlink = 2;
        Ok(())
    }

    fn mknod(&self, path: &Path, mode: u32, dev: u64) -> FsResult<()> {
        self.inner.enter("mknod")?;
        let kind = if mode & S_IFMT == S_IFREG || mode & S_IFMT == 0 {
            NodeKind::File(Vec::new())
        } else {
            NodeKind::Special
        };
        let mode = if mode & S_IFMT == 0 { mode | S_IFREG } else { mode };
        let node = self.inner.insert(path, kind, mode)?;
        lock(&node).rdev = dev;
        Ok(())
    }

    fn rename(&self, old: &Path, new: &Path) -> FsResult<()> {
        self.inner.enter("rename")?;
        let (from, to) = (key(old), key(new));
        let mut nodes = lock(&self.inner.nodes);
        if !nodes.contains_key(&from) {
            return Err(Errno::NotFound);
        }
        if from == to {
            return Ok(());
        }
        if to.starts_with(&from) {
            return Err(Errno::InvalidArgument);
        }
        match to.parent().and_then(|parent| nodes.get(parent)) {
            Some(parent) if lock(parent).is_dir() => {}
            Some(_) => return Err(Errno::NotDirectory),
            None => return Err(Errno::NotFound),
        }
        if let Some(existing) = nodes.get(&to) {
            if lock(existing).is_dir()
                && nodes.keys().any(|k| k.parent() == Some(to.as_path()))
            {
                return Err(Errno::NotEmpty);
            }
        }

        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|k| k.starts_with(&from))
            .cloned()
            .collect();
        for old_key in moved {
            if let Some(node) = nodes.remove(&old_key) {
                let suffix = old_key.strip_prefix(&from).unwrap_or(Path::new(""));
                let new_key = if suffix.as_os_str().is_empty() {
                    to.clone()
                } else {
                    to.join(suffix)
                };
                nodes.insert(new_key, node);
            }
        }
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        self.inner.enter("rmdir")?;
        let k = key(path);
        let mut nodes = lock(&self.inner.nodes);
        let node = nodes.get(&k).ok_or(Errno::NotFound)?;
        if !lock(node).is_dir() {
            return Err(Errno::NotDirectory);
        }
        if k.as_os_str().is_empty() {
            return Err(Errno::Busy);
        }
        if nodes.keys().any(|child| child.parent() == Some(k.as_path())) {
            return Err(Errno::NotEmpty);
        }
        nodes.remove(&k);
        Ok(())
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        self.inner.enter("unlink")?;
        let k = key(path);
        let mut nodes = lock(&self.inner.nodes);
        let node = nodes.get(&k).ok_or(Errno::NotFound)?;
        if lock(node).is_dir() {
            return Err(Errno::IsDirectory);
        }
        if let Some(node) = nodes.remove(&k) {
            let mut node = lock(&node);
            node.nlink = node.nlink.saturating_sub(1);
        }
        Ok(())
    }

    fn get_xattr(&self, path: &Path, name: &str) -> FsResult<Vec<u8>> {
        self.inner.enter("getxattr")?;
        let node = self.inner.node(path)?;
        let node = lock(&node);
        node.xattrs.get(name).cloned().ok_or(Errno::NoData)
    }

    fn list_xattr(&self, path: &Path) -> FsResult<Vec<String>> {
        self.inner.enter("listxattr")?;
        let node = self.inner.node(path)?;
        let node = lock(&node);
        Ok(node.xattrs.keys().cloned().collect())
    }

    fn remove_xattr(&self, path: &Path, name: &str) -> FsResult<()> {
        self.inner.enter("removexattr")?;
        let node = self.inner.node(path)?;
        let mut node = lock(&node);
        node.xattrs.remove(name).map(drop).ok_or(Errno::NoData)
    }

    fn set_xattr(
        &self,
        path: &Path,
        name: &str,
        value: &[u8],
        flags: SetxattrFlags,
    ) -> FsResult<()> {
        self.inner.enter("setxattr")?;
        let node = self.inner.node(path)?;
        let mut node = lock(&node);
        let exists = node.xattrs.contains_key(name);
        if flags.contains(SetxattrFlags::CREATE) && exists {
            return Err(Errno::Exists);
        }
        if flags.contains(SetxattrFlags::REPLACE) && !exists {
            return Err(Errno::NoData);
        }
        node.xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn open(&self, path: &Path, flags: u32) -> FsResult<Box<dyn File>> {
        self.inner.enter("open")?;
        let node = self.inner.node(path)?;
        {
            let mut guard = lock(&node);
            if guard.is_dir() {
                return Err(Errno::IsDirectory);
            }
            if flags & O_TRUNC != 0 {
                guard.data_mut()?.clear();
            }
        }
        Ok(self.handle(node))
    }

    fn create(&self, path: &Path, flags: u32, mode: u32) -> FsResult<Box<dyn File>> {
        self.inner.enter("create")?;
        let node = match self
            .inner
            .insert(path, NodeKind::File(Vec::new()), S_IFREG | (mode & !S_IFMT))
        {
            Ok(node) => node,
            Err(Errno::Exists) if flags & O_EXCL == 0 => {
                let node = self.inner.node(path)?;
                if flags & O_TRUNC != 0 {
                    lock(&node).data_mut()?.clear();
                }
                node
            }
            Err(errno) => return Err(errno),
        };
        Ok(self.handle(node))
    }

    fn open_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.inner.enter("opendir")?;
        let k = key(path);
        let nodes = lock(&self.inner.nodes);
        let dir = nodes.get(&k).ok_or(Errno::NotFound)?;
        if !lock(dir).is_dir() {
            return Err(Errno::NotDirectory);
        }
        Ok(nodes
            .iter()
            .filter(|(child, _)| {
                !child.as_os_str().is_empty() && child.parent() == Some(k.as_path())
            })
            .filter_map(|(child, node)| {
                let node = lock(node);
                Some(DirEntry {
                    name: child.file_name()?.to_os_string(),
                    ino: node.ino,
                    mode: node.mode & S_IFMT,
                })
            })
            .collect())
    }

    fn symlink(&self, target: &Path, link: &Path) -> FsResult<()> {
        self.inner.enter("symlink")?;
        self.inner
            .insert(link, NodeKind::Symlink(target.to_path_buf()), S_IFLNK | 0o777)
            .map(drop)
    }

    fn readlink(&self, path: &Path) -> FsResult<PathBuf> {
        self.inner.enter("readlink")?;
        let node = self.inner.node(path)?;
        let node = lock(&node);
        match &node.kind {
            NodeKind::Symlink(target) => Ok(target.clone()),
            _ => Err(Errno::InvalidArgument),
        }
    }

    fn statfs(&self, _path: &Path) -> Option<StatFs> {
        self.inner.enter("statfs").ok()?;
        let files = lock(&self.inner.nodes).len() as u64;
        Some(StatFs {
            blocks: 1 << 20,
            bfree: 1 << 19,
            bavail: 1 << 19,
            files,
            ffree: (1 << 16) - files,
            bsize: 4096,
            frsize: 4096,
            name_len: 255,
        })
    }

    fn on_mount(&self) {
        self.inner.mounts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unmount(&self) {
        self.inner.unmounts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handle returned by [`FakeFs`]. Keeps working after the file is unlinked
/// or renamed, like a real descriptor.
pub struct FakeFile {
    fs: Arc<Inner>,
    node: NodeRef,
}

impl File for FakeFile {
    fn read(&self, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        self.fs.enter("read")?;
        let mut node = lock(&self.node);
        let data = node.data_mut()?;
        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(size).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn write(&self, data: &[u8], offset: u64) -> FsResult<usize> {
        self.fs.enter("write")?;
        let mut node = lock(&self.node);
        let contents = node.data_mut()?;
        let start = offset as usize;
        let end = start + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn flush(&self) -> FsResult<()> {
        self.fs.enter("flush")
    }

    fn release(self: Box<Self>) {
        *lock(&self.fs.calls).entry("release").or_default() += 1;
        self.fs.open_handles.fetch_sub(1, Ordering::SeqCst);
        self.fs.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn fsync(&self, _flags: u32) -> FsResult<()> {
        self.fs.enter("fsync")
    }

    fn truncate(&self, size: u64) -> FsResult<()> {
        self.fs.enter("truncate")?;
        lock(&self.node).data_mut()?.resize(size as usize, 0);
        Ok(())
    }

    fn get_attr(&self) -> FsResult<Attr> {
        self.fs.enter("getattr")?;
        Ok(lock(&self.node).attr())
    }

    fn chown(&self, uid: u32, gid: u32) -> FsResult<()> {
        self.fs.enter("chown")?;
        lock(&self.node).chown(uid, gid);
        Ok(())
    }

    fn chmod(&self, mode: u32) -> FsResult<()> {
        self.fs.enter("chmod")?;
        lock(&self.node).chmod(mode);
        Ok(())
    }

    fn utimens(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> FsResult<()> {
        self.fs.enter("utimens")?;
        lock(&self.node).utimens(atime, mtime);
        Ok(())
    }

    fn allocate(&self, offset: u64, size: u64, _mode: u32) -> FsResult<()> {
        self.fs.enter("allocate")?;
        let mut node = lock(&self.node);
        let data = node.data_mut()?;
        let end = offset.saturating_add(size) as usize;
        if data.len() < end {
            data.resize(end, 0);
        }
        Ok(())
    }

    fn get_lk(&self, owner: u64, lock_req: &FileLock, _flags: u32) -> FsResult<FileLock> {
        self.fs.enter("getlk")?;
        let node = lock(&self.node);
        Ok(node
            .conflicting_lock(owner, lock_req)
            .unwrap_or(FileLock {
                typ: LockType::Unlock,
                ..*lock_req
            }))
    }

    fn set_lk(&self, owner: u64, lock_req: &FileLock, _flags: u32) -> FsResult<()> {
        self.fs.enter("setlk")?;
        lock(&self.node).set_lock(owner, lock_req)
    }

    /// Never waits: a conflict fails with `WouldBlock` like `set_lk`.
    fn set_lkw(&self, owner: u64, lock_req: &FileLock, _flags: u32) -> FsResult<()> {
        self.fs.enter("setlkw")?;
        lock(&self.node).set_lock(owner, lock_req)
    }
}
