//! A filesystem layer that lets a hook observe, veto or rewrite every
//! operation before it reaches a passthrough filesystem.
//!
//! [`HookFs`] wraps a delegate [`FileSystem`](hookfs_common::FileSystem)
//! (by default [`LoopbackFs`]) and wraps every handle it opens in a
//! [`HookFile`]. A transport serves a `HookFs` exactly as it would serve
//! the delegate.

pub mod error;
pub mod hook_file;
pub mod hook_fs;
pub mod loopback;
pub mod mount;

pub use error::HookFsError;
pub use hook_file::HookFile;
pub use hook_fs::HookFs;
pub use loopback::{LoopbackFile, LoopbackFs};
pub use mount::MountSession;
