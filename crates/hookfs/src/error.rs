use std::io;
use std::path::PathBuf;

/// Errors setting up a hooked filesystem. Once it is serving, failures
/// are reported per request as an `Errno`.
#[derive(Debug, thiserror::Error)]
pub enum HookFsError {
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("config error: {source}")]
    Config {
        #[from]
        source: hookfs_common::ConfigError,
    },

    #[error("original {} is not a directory", path.display())]
    InvalidRoot { path: PathBuf },

    #[error("mountpoint {} is not a directory", path.display())]
    InvalidMountpoint { path: PathBuf },
}
