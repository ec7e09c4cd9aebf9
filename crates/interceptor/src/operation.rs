use std::fmt;

/// Every interceptable filesystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Read,
    Write,
    Mkdir,
    Rmdir,
    OpenDir,
    Fsync,
    Flush,
    Release,
    Truncate,
    GetAttr,
    Chown,
    Chmod,
    Utimens,
    Allocate,
    GetLk,
    SetLk,
    SetLkw,
    StatFs,
    Readlink,
    Symlink,
    Create,
    Access,
    Link,
    Mknod,
    Rename,
    Unlink,
    GetXattr,
    ListXattr,
    RemoveXattr,
    SetXattr,
}

/// How a successful short-circuit is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuitPolicy {
    /// The short-circuit value is the answer.
    Allow,
    /// The operation has no value to fabricate; a short-circuit must carry
    /// an error, and one without is a hook defect.
    RequireError,
}

impl Operation {
    pub const ALL: [Operation; 31] = [
        Self::Open,
        Self::Read,
        Self::Write,
        Self::Mkdir,
        Self::Rmdir,
        Self::OpenDir,
        Self::Fsync,
        Self::Flush,
        Self::Release,
        Self::Truncate,
        Self::GetAttr,
        Self::Chown,
        Self::Chmod,
        Self::Utimens,
        Self::Allocate,
        Self::GetLk,
        Self::SetLk,
        Self::SetLkw,
        Self::StatFs,
        Self::Readlink,
        Self::Symlink,
        Self::Create,
        Self::Access,
        Self::Link,
        Self::Mknod,
        Self::Rename,
        Self::Unlink,
        Self::GetXattr,
        Self::ListXattr,
        Self::RemoveXattr,
        Self::SetXattr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Read => "read",
            Self::Write => "write",
            Self::Mkdir => "mkdir",
            Self::Rmdir => "rmdir",
            Self::OpenDir => "opendir",
            Self::Fsync => "fsync",
            Self::Flush => "flush",
            Self::Release => "release",
            Self::Truncate => "truncate",
            Self::GetAttr => "getattr",
            Self::Chown => "chown",
            Self::Chmod => "chmod",
            Self::Utimens => "utimens",
            Self::Allocate => "allocate",
            Self::GetLk => "getlk",
            Self::SetLk => "setlk",
            Self::SetLkw => "setlkw",
            Self::StatFs => "statfs",
            Self::Readlink => "readlink",
            Self::Symlink => "symlink",
            Self::Create => "create",
            Self::Access => "access",
            Self::Link => "link",
            Self::Mknod => "mknod",
            Self::Rename => "rename",
            Self::Unlink => "unlink",
            Self::GetXattr => "getxattr",
            Self::ListXattr => "listxattr",
            Self::RemoveXattr => "removexattr",
            Self::SetXattr => "setxattr",
        }
    }

    pub fn short_circuit_policy(self) -> ShortCircuitPolicy {
        match self {
            Self::Mkdir | Self::Rmdir | Self::Open | Self::OpenDir => {
                ShortCircuitPolicy::RequireError
            }
            _ => ShortCircuitPolicy::Allow,
        }
    }

    /// Bit position in a [`Capabilities`](crate::Capabilities) set.
    pub(crate) fn bit(self) -> u64 {
        1 << (self as u32)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
