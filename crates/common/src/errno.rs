use std::io;

/// Status of a filesystem operation that did not succeed.
///
/// `Ok` is the OK status; everything else is one of these. The named
/// variants cover the codes a passthrough filesystem actually produces;
/// anything else travels as `Other(raw)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Errno {
    #[error("operation not permitted")]
    NotPermitted,

    #[error("no such file or directory")]
    NotFound,

    #[error("input/output error")]
    Io,

    #[error("bad file descriptor")]
    BadHandle,

    #[error("resource temporarily unavailable")]
    WouldBlock,

    #[error("permission denied")]
    PermissionDenied,

    #[error("device or resource busy")]
    Busy,

    #[error("file exists")]
    Exists,

    #[error("invalid cross-device link")]
    CrossDevice,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("no space left on device")]
    NoSpace,

    #[error("read-only file system")]
    ReadOnly,

    #[error("too many links")]
    TooManyLinks,

    #[error("result out of range")]
    Range,

    #[error("file name too long")]
    NameTooLong,

    #[error("function not implemented")]
    NotImplemented,

    #[error("directory not empty")]
    NotEmpty,

    #[error("too many levels of symbolic links")]
    Loop,

    #[error("no such attribute")]
    NoData,

    #[error("operation not supported")]
    NotSupported,

    #[error("os error {0}")]
    Other(i32),
}

/// `(result, status)` of a delegate operation.
pub type FsResult<T> = Result<T, Errno>;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const NO_XATTR: i32 = libc::ENOATTR;

#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
const NO_XATTR: i32 = libc::ENODATA;

impl Errno {
    /// Map a raw `errno` value. Codes without a named variant are kept
    /// verbatim in `Other`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            libc::EPERM => Self::NotPermitted,
            libc::ENOENT => Self::NotFound,
            libc::EIO => Self::Io,
            libc::EBADF => Self::BadHandle,
            libc::EAGAIN => Self::WouldBlock,
            libc::EACCES => Self::PermissionDenied,
            libc::EBUSY => Self::Busy,
            libc::EEXIST => Self::Exists,
            libc::EXDEV => Self::CrossDevice,
            libc::ENOTDIR => Self::NotDirectory,
            libc::EISDIR => Self::IsDirectory,
            libc::EINVAL => Self::InvalidArgument,
            libc::ENOSPC => Self::NoSpace,
            libc::EROFS => Self::ReadOnly,
            libc::EMLINK => Self::TooManyLinks,
            libc::ERANGE => Self::Range,
            libc::ENAMETOOLONG => Self::NameTooLong,
            libc::ENOSYS => Self::NotImplemented,
            libc::ENOTEMPTY => Self::NotEmpty,
            libc::ELOOP => Self::Loop,
            NO_XATTR => Self::NoData,
            libc::ENOTSUP => Self::NotSupported,
            other => Self::Other(other),
        }
    }

    /// The raw `errno` value a transport hands back to the kernel.
    pub fn raw(self) -> i32 {
        match self {
            Self::NotPermitted => libc::EPERM,
            Self::NotFound => libc::ENOENT,
            Self::Io => libc::EIO,
            Self::BadHandle => libc::EBADF,
            Self::WouldBlock => libc::EAGAIN,
            Self::PermissionDenied => libc::EACCES,
            Self::Busy => libc::EBUSY,
            Self::Exists => libc::EEXIST,
            Self::CrossDevice => libc::EXDEV,
            Self::NotDirectory => libc::ENOTDIR,
            Self::IsDirectory => libc::EISDIR,
            Self::InvalidArgument => libc::EINVAL,
            Self::NoSpace => libc::ENOSPC,
            Self::ReadOnly => libc::EROFS,
            Self::TooManyLinks => libc::EMLINK,
            Self::Range => libc::ERANGE,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::NotImplemented => libc::ENOSYS,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::Loop => libc::ELOOP,
            Self::NoData => NO_XATTR,
            Self::NotSupported => libc::ENOTSUP,
            Self::Other(code) => code,
        }
    }

    /// Classify an I/O error: the OS code when there is one, otherwise the
    /// closest match for its kind.
    pub fn from_io(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return Self::from_raw(code);
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::AlreadyExists => Self::Exists,
            io::ErrorKind::WouldBlock => Self::WouldBlock,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Self::InvalidArgument,
            io::ErrorKind::Unsupported => Self::NotSupported,
            _ => Self::Io,
        }
    }
}

impl From<io::Error> for Errno {
    fn from(err: io::Error) -> Self {
        Self::from_io(&err)
    }
}

impl From<Errno> for io::Error {
    fn from(errno: Errno) -> Self {
        io::Error::from_raw_os_error(errno.raw())
    }
}

/// Error returned by a hook, either to short-circuit an operation or to
/// replace the delegate's outcome.
///
/// Every variant is reduced to an [`Errno`] before it reaches the
/// transport; see [`HookError::errno`].
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    Errno(#[from] Errno),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("{0}")]
    Message(String),
}

impl HookError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// The status this error is reported as. Free-form messages carry no
    /// code and are reported as `NotImplemented` (ENOSYS).
    pub fn errno(&self) -> Errno {
        match self {
            Self::Errno(errno) => *errno,
            Self::Io { source } => Errno::from_io(source),
            Self::Message(_) => Errno::NotImplemented,
        }
    }
}
