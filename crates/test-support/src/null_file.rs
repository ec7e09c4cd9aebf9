use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use hookfs_common::types::S_IFREG;
use hookfs_common::{Attr, File, FileLock, FsResult, LockType};

/// A handle with no backing data: reads are empty, writes are accepted in
/// full, and releases are counted.
#[derive(Default)]
pub struct NullFile {
    releases: Arc<AtomicUsize>,
}

impl NullFile {
    /// Counter bumped each time this handle is released. Stays readable
    /// after the handle is gone.
    pub fn releases(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

impl File for NullFile {
    fn read(&self, _size: usize, _offset: u64) -> FsResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn write(&self, data: &[u8], _offset: u64) -> FsResult<usize> {
        Ok(data.len())
    }

    fn flush(&self) -> FsResult<()> {
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn fsync(&self, _flags: u32) -> FsResult<()> {
        Ok(())
    }

    fn truncate(&self, _size: u64) -> FsResult<()> {
        Ok(())
    }

    fn get_attr(&self) -> FsResult<Attr> {
        Ok(Attr {
            ino: 0,
            size: 0,
            blocks: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            mode: S_IFREG | 0o644,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 4096,
        })
    }

    fn chown(&self, _uid: u32, _gid: u32) -> FsResult<()> {
        Ok(())
    }

    fn chmod(&self, _mode: u32) -> FsResult<()> {
        Ok(())
    }

    fn utimens(&self, _atime: Option<SystemTime>, _mtime: Option<SystemTime>) -> FsResult<()> {
        Ok(())
    }

    fn allocate(&self, _offset: u64, _size: u64, _mode: u32) -> FsResult<()> {
        Ok(())
    }

    fn get_lk(&self, _owner: u64, lock: &FileLock, _flags: u32) -> FsResult<FileLock> {
        Ok(FileLock {
            typ: LockType::Unlock,
            ..*lock
        })
    }

    fn set_lk(&self, _owner: u64, _lock: &FileLock, _flags: u32) -> FsResult<()> {
        Ok(())
    }

    fn set_lkw(&self, _owner: u64, _lock: &FileLock, _flags: u32) -> FsResult<()> {
        Ok(())
    }
}
