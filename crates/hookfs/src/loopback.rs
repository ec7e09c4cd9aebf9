use std::ffi::{CString, OsString};
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{
    DirBuilderExt, DirEntryExt, FileExt, FileTypeExt, OpenOptionsExt, PermissionsExt,
};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use log::debug;

use hookfs_common::types::{S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFREG, S_IFSOCK};
use hookfs_common::{
    Attr, DirEntry, Errno, File, FileLock, FileSystem, FsResult, LockType, SetxattrFlags, StatFs,
};

use crate::error::HookFsError;

/// Passes every operation through to a directory on the host.
#[derive(Debug)]
pub struct LoopbackFs {
    root: PathBuf,
}

impl LoopbackFs {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, HookFsError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(HookFsError::InvalidRoot {
                path: root.to_path_buf(),
            });
        }
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a path relative to the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        if relative.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

fn c_path(path: &Path) -> FsResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno::InvalidArgument)
}

fn last_errno() -> Errno {
    Errno::from(io::Error::last_os_error())
}

fn check(rc: libc::c_int) -> FsResult<()> {
    if rc == -1 { Err(last_errno()) } else { Ok(()) }
}

/// `u32::MAX` means "leave unchanged".
fn id(raw: u32) -> Option<u32> {
    (raw != u32::MAX).then_some(raw)
}

fn type_bits(file_type: &fs::FileType) -> u32 {
    if file_type.is_dir() {
        S_IFDIR
    } else if file_type.is_symlink() {
        S_IFLNK
    } else if file_type.is_block_device() {
        S_IFBLK
    } else if file_type.is_char_device() {
        S_IFCHR
    } else if file_type.is_fifo() {
        S_IFIFO
    } else if file_type.is_socket() {
        S_IFSOCK
    } else {
        S_IFREG
    }
}

/// Translate `open(2)` flags. Everything beyond the access mode is passed
/// to the OS untouched.
fn open_options(flags: u32) -> OpenOptions {
    let flags = flags as i32;
    let mut options = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => options.write(true),
        libc::O_RDWR => options.read(true).write(true),
        _ => options.read(true),
    };
    options.custom_flags(flags & !libc::O_ACCMODE);
    options
}

fn file_time(time: Option<SystemTime>, current: impl FnOnce() -> FileTime) -> FileTime {
    time.map_or_else(current, FileTime::from_system_time)
}

/// Attribute names as UTF-8. Names that are not valid UTF-8 cannot be
/// read back through `get_xattr`, so they are left out.
fn xattr_names(names: impl IntoIterator<Item = OsString>) -> Vec<String> {
    names
        .into_iter()
        .filter_map(|name| match name.into_string() {
            Ok(name) => Some(name),
            Err(name) => {
                debug!("skipping non-UTF-8 xattr name {name:?}");
                None
            }
        })
        .collect()
}

fn xattr_flags(flags: SetxattrFlags) -> libc::c_int {
    let mut raw = 0;
    if flags.contains(SetxattrFlags::CREATE) {
        raw |= libc::XATTR_CREATE;
    }
    if flags.contains(SetxattrFlags::REPLACE) {
        raw |= libc::XATTR_REPLACE;
    }
    raw
}

#[cfg(target_os = "linux")]
fn set_xattr_raw(
    path: &CString,
    name: &CString,
    value: &[u8],
    flags: libc::c_int,
) -> FsResult<()> {
    // SAFETY: `path` and `name` are NUL-terminated and `value` is valid for
    // `value.len()` bytes for the duration of the call.
    check(unsafe {
        libc::lsetxattr(
            path.as_ptr(),
            name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            flags,
        )
    })
}

#[cfg(target_os = "macos")]
fn set_xattr_raw(
    path: &CString,
    name: &CString,
    value: &[u8],
    flags: libc::c_int,
) -> FsResult<()> {
    // SAFETY: `path` and `name` are NUL-terminated and `value` is valid for
    // `value.len()` bytes for the duration of the call.
    check(unsafe {
        libc::setxattr(
            path.as_ptr(),
            name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
            flags | libc::XATTR_NOFOLLOW,
        )
    })
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn set_xattr_raw(
    _path: &CString,
    _name: &CString,
    _value: &[u8],
    _flags: libc::c_int,
) -> FsResult<()> {
    Err(Errno::NotSupported)
}

impl FileSystem for LoopbackFs {
    fn get_attr(&self, path: &Path) -> FsResult<Attr> {
        let meta = fs::symlink_metadata(self.resolve(path))?;
        Ok(Attr::from_metadata(&meta))
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        fs::set_permissions(self.resolve(path), Permissions::from_mode(mode))?;
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> FsResult<()> {
        std::os::unix::fs::chown(self.resolve(path), id(uid), id(gid))?;
        Ok(())
    }

    fn utimens(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        let full = self.resolve(path);
        let (atime, mtime) = match (atime, mtime) {
            (Some(atime), Some(mtime)) => (
                FileTime::from_system_time(atime),
                FileTime::from_system_time(mtime),
            ),
            (atime, mtime) => {
                let meta = fs::symlink_metadata(&full)?;
                (
                    file_time(atime, || FileTime::from_last_access_time(&meta)),
                    file_time(mtime, || FileTime::from_last_modification_time(&meta)),
                )
            }
        };
        filetime::set_symlink_file_times(&full, atime, mtime)?;
        Ok(())
    }

    fn truncate(&self, path: &Path, size: u64) -> FsResult<()> {
        let c = c_path(&self.resolve(path))?;
        let size = libc::off_t::try_from(size).map_err(|_| Errno::InvalidArgument)?;
        // SAFETY: `c` is a valid NUL-terminated string for the duration of the call.
        check(unsafe { libc::truncate(c.as_ptr(), size) })
    }

    fn access(&self, path: &Path, mode: u32) -> FsResult<()> {
        let c = c_path(&self.resolve(path))?;
        // SAFETY: `c` is a valid NUL-terminated string for the duration of the call.
        check(unsafe { libc::access(c.as_ptr(), mode as libc::c_int) })
    }

    fn link(&self, old: &Path, new: &Path) -> FsResult<()> {
        fs::hard_link(self.resolve(old), self.resolve(new))?;
        Ok(())
    }

    fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        DirBuilder::new().mode(mode).create(self.resolve(path))?;
        Ok(())
    }

    fn mknod(&self, path: &Path, mode: u32, dev: u64) -> FsResult<()> {
        let c = c_path(&self.resolve(path))?;
        // SAFETY: `c` is a valid NUL-terminated string for the duration of the call.
        check(unsafe { libc::mknod(c.as_ptr(), mode as libc::mode_t, dev as libc::dev_t) })
    }

    fn rename(&self, old: &Path, new: &Path) -> FsResult<()> {
        fs::rename(self.resolve(old), self.resolve(new))?;
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        fs::remove_dir(self.resolve(path))?;
        Ok(())
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(self.resolve(path))?;
        Ok(())
    }

    fn get_xattr(&self, path: &Path, name: &str) -> FsResult<Vec<u8>> {
        xattr::get(self.resolve(path), name)?.ok_or(Errno::NoData)
    }

    fn list_xattr(&self, path: &Path) -> FsResult<Vec<String>> {
        Ok(xattr_names(xattr::list(self.resolve(path))?))
    }

    fn remove_xattr(&self, path: &Path, name: &str) -> FsResult<()> {
        xattr::remove(self.resolve(path), name)?;
        Ok(())
    }

    fn set_xattr(
        &self,
        path: &Path,
        name: &str,
        value: &[u8],
        flags: SetxattrFlags,
    ) -> FsResult<()> {
        let c = c_path(&self.resolve(path))?;
        let name = CString::new(name).map_err(|_| Errno::InvalidArgument)?;
        set_xattr_raw(&c, &name, value, xattr_flags(flags))
    }

    fn open(&self, path: &Path, flags: u32) -> FsResult<Box<dyn File>> {
        let file = open_options(flags).open(self.resolve(path))?;
        Ok(Box::new(LoopbackFile { file }))
    }

    fn create(&self, path: &Path, flags: u32, mode: u32) -> FsResult<Box<dyn File>> {
        let mut options = open_options(flags | libc::O_CREAT as u32);
        options.mode(mode);
        let file = options.open(self.resolve(path))?;
        Ok(Box::new(LoopbackFile { file }))
    }

    fn open_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            entries.push(DirEntry {
                name: entry.file_name(),
                ino: entry.ino(),
                mode: type_bits(&file_type),
            });
        }
        Ok(entries)
    }

    fn symlink(&self, target: &Path, link: &Path) -> FsResult<()> {
        std::os::unix::fs::symlink(target, self.resolve(link))?;
        Ok(())
    }

    fn readlink(&self, path: &Path) -> FsResult<PathBuf> {
        Ok(fs::read_link(self.resolve(path))?)
    }

    fn statfs(&self, path: &Path) -> Option<StatFs> {
        let c = c_path(&self.resolve(path)).ok()?;
        let mut st = MaybeUninit::<libc::statvfs>::zeroed();
        // SAFETY: `c` is NUL-terminated and `st` points to writable storage
        // of the right size.
        let rc = unsafe { libc::statvfs(c.as_ptr(), st.as_mut_ptr()) };
        if rc == -1 {
            debug!("statvfs {} failed: {}", path.display(), last_errno());
            return None;
        }
        // SAFETY: statvfs returned success, so it initialised `st`.
        let st = unsafe { st.assume_init() };
        Some(StatFs {
            blocks: st.f_blocks as u64,
            bfree: st.f_bfree as u64,
            bavail: st.f_bavail as u64,
            files: st.f_files as u64,
            ffree: st.f_ffree as u64,
            bsize: st.f_bsize as u32,
            frsize: st.f_frsize as u32,
            name_len: st.f_namemax as u32,
        })
    }
}

/// An open file on the host.
#[derive(Debug)]
pub struct LoopbackFile {
    file: fs::File,
}

fn to_flock(lock: &FileLock) -> libc::flock {
    // SAFETY: flock is plain old data; all-zero is a valid value.
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = lock.typ.raw() as libc::c_short;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = lock.start as libc::off_t;
    fl.l_len = if lock.end == u64::MAX {
        0
    } else {
        lock.end.saturating_sub(lock.start).saturating_add(1) as libc::off_t
    };
    fl.l_pid = lock.pid as libc::pid_t;
    fl
}

fn from_flock(fl: &libc::flock) -> FsResult<FileLock> {
    let typ = LockType::from_raw(fl.l_type as i32).ok_or(Errno::InvalidArgument)?;
    let start = fl.l_start.max(0) as u64;
    let end = if fl.l_len <= 0 {
        u64::MAX
    } else {
        start.saturating_add(fl.l_len as u64 - 1)
    };
    Ok(FileLock {
        start,
        end,
        typ,
        pid: fl.l_pid.max(0) as u32,
    })
}

impl LoopbackFile {
    pub fn new(file: fs::File) -> Self {
        Self { file }
    }

    fn fcntl_lock(&self, cmd: libc::c_int, lock: &FileLock) -> FsResult<libc::flock> {
        let mut fl = to_flock(lock);
        // SAFETY: the descriptor stays open for the lifetime of `self.file`
        // and `fl` is a valid flock for the duration of the call.
        check(unsafe { libc::fcntl(self.file.as_raw_fd(), cmd, &mut fl as *mut libc::flock) })?;
        Ok(fl)
    }

    #[cfg(target_os = "linux")]
    fn fallocate(&self, offset: u64, size: u64, mode: u32) -> FsResult<()> {
        // SAFETY: the descriptor stays open for the lifetime of `self.file`.
        check(unsafe {
            libc::fallocate(
                self.file.as_raw_fd(),
                mode as libc::c_int,
                offset as libc::off_t,
                size as libc::off_t,
            )
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn fallocate(&self, _offset: u64, _size: u64, _mode: u32) -> FsResult<()> {
        Err(Errno::NotImplemented)
    }
}

impl File for LoopbackFile {
    fn read(&self, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let at = offset
                .checked_add(filled as u64)
                .ok_or(Errno::InvalidArgument)?;
            match self.file.read_at(&mut buf[filled..], at) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn write(&self, data: &[u8], offset: u64) -> FsResult<usize> {
        self.file.write_all_at(data, offset)?;
        Ok(data.len())
    }

    fn flush(&self) -> FsResult<()> {
        // Closing a duplicate reports deferred write errors without closing
        // the handle itself.
        let dup = self.file.try_clone()?;
        drop(dup);
        Ok(())
    }

    fn release(self: Box<Self>) {}

    fn fsync(&self, flags: u32) -> FsResult<()> {
        if flags & 1 != 0 {
            self.file.sync_data()?;
        } else {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn truncate(&self, size: u64) -> FsResult<()> {
        self.file.set_len(size)?;
        Ok(())
    }

    fn get_attr(&self) -> FsResult<Attr> {
        Ok(Attr::from_metadata(&self.file.metadata()?))
    }

    fn chown(&self, uid: u32, gid: u32) -> FsResult<()> {
        std::os::unix::fs::fchown(&self.file, id(uid), id(gid))?;
        Ok(())
    }

    fn chmod(&self, mode: u32) -> FsResult<()> {
        self.file.set_permissions(Permissions::from_mode(mode))?;
        Ok(())
    }

    fn utimens(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> FsResult<()> {
        filetime::set_file_handle_times(
            &self.file,
            atime.map(FileTime::from_system_time),
            mtime.map(FileTime::from_system_time),
        )?;
        Ok(())
    }

    fn allocate(&self, offset: u64, size: u64, mode: u32) -> FsResult<()> {
        self.fallocate(offset, size, mode)
    }

    fn get_lk(&self, _owner: u64, lock: &FileLock, _flags: u32) -> FsResult<FileLock> {
        let fl = self.fcntl_lock(libc::F_GETLK, lock)?;
        from_flock(&fl)
    }

    fn set_lk(&self, _owner: u64, lock: &FileLock, _flags: u32) -> FsResult<()> {
        self.fcntl_lock(libc::F_SETLK, lock).map(drop)
    }

    fn set_lkw(&self, _owner: u64, lock: &FileLock, _flags: u32) -> FsResult<()> {
        self.fcntl_lock(libc::F_SETLKW, lock).map(drop)
    }
}
