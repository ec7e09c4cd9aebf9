use std::ffi::OsString;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// File type bits of `st_mode`.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;
pub const S_IFSOCK: u32 = 0o140000;

/// Attributes of a filesystem object, as reported by `get_attr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    /// Type and permission bits.
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub blksize: u64,
}

impl Attr {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            ino: meta.ino(),
            size: meta.size(),
            blocks: meta.blocks(),
            atime: timestamp(meta.atime(), meta.atime_nsec()),
            mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
            ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            blksize: meta.blksize(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Permission bits without the file type.
    pub fn permissions(&self) -> u32 {
        self.mode & !S_IFMT
    }
}

/// Convert a `(seconds, nanoseconds)` pair relative to the epoch.
pub fn timestamp(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub ino: u64,
    /// File type bits only.
    pub mode: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Read,
    Write,
    Unlock,
}

impl LockType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw == libc::F_RDLCK as i32 {
            Some(Self::Read)
        } else if raw == libc::F_WRLCK as i32 {
            Some(Self::Write)
        } else if raw == libc::F_UNLCK as i32 {
            Some(Self::Unlock)
        } else {
            None
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Read => libc::F_RDLCK as i32,
            Self::Write => libc::F_WRLCK as i32,
            Self::Unlock => libc::F_UNLCK as i32,
        }
    }
}

/// A POSIX record lock over the inclusive byte range `start..=end`.
/// `end == u64::MAX` extends the lock to end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLock {
    pub start: u64,
    pub end: u64,
    pub typ: LockType,
    pub pid: u32,
}

impl FileLock {
    pub fn whole_file(typ: LockType) -> Self {
        Self {
            start: 0,
            end: u64::MAX,
            typ,
            pid: 0,
        }
    }

    pub fn overlaps(&self, other: &FileLock) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Filesystem statistics, as reported by `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub frsize: u32,
    pub name_len: u32,
}

/// Flags accepted by `set_xattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetxattrFlags(u32);

impl SetxattrFlags {
    /// Fail with `Exists` if the attribute is already set.
    pub const CREATE: Self = Self(1);
    /// Fail with `NoData` if the attribute is not set.
    pub const REPLACE: Self = Self(2);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}
