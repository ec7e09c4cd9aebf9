pub mod config;
pub mod delegate;
pub mod errno;
pub mod types;

pub use config::{ConfigError, DEFAULT_FS_NAME, MountConfig};
pub use delegate::{File, FileSystem};
pub use errno::{Errno, FsResult, HookError};
pub use types::{Attr, DirEntry, FileLock, LockType, SetxattrFlags, StatFs};
