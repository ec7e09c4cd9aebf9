use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::hooks::Hook;
use crate::operation::Operation;

/// Whether `hook` implements the pair for `op`.
pub fn supports(hook: &dyn Hook, op: Operation) -> bool {
    match op {
        Operation::Open => hook.on_open().is_some(),
        Operation::Read => hook.on_read().is_some(),
        Operation::Write => hook.on_write().is_some(),
        Operation::Mkdir => hook.on_mkdir().is_some(),
        Operation::Rmdir => hook.on_rmdir().is_some(),
        Operation::OpenDir => hook.on_open_dir().is_some(),
        Operation::Fsync => hook.on_fsync().is_some(),
        Operation::Flush => hook.on_flush().is_some(),
        Operation::Release => hook.on_release().is_some(),
        Operation::Truncate => hook.on_truncate().is_some(),
        Operation::GetAttr => hook.on_get_attr().is_some(),
        Operation::Chown => hook.on_chown().is_some(),
        Operation::Chmod => hook.on_chmod().is_some(),
        Operation::Utimens => hook.on_utimens().is_some(),
        Operation::Allocate => hook.on_allocate().is_some(),
        Operation::GetLk => hook.on_get_lk().is_some(),
        Operation::SetLk => hook.on_set_lk().is_some(),
        Operation::SetLkw => hook.on_set_lkw().is_some(),
        Operation::StatFs => hook.on_statfs().is_some(),
        Operation::Readlink => hook.on_readlink().is_some(),
        Operation::Symlink => hook.on_symlink().is_some(),
        Operation::Create => hook.on_create().is_some(),
        Operation::Access => hook.on_access().is_some(),
        Operation::Link => hook.on_link().is_some(),
        Operation::Mknod => hook.on_mknod().is_some(),
        Operation::Rename => hook.on_rename().is_some(),
        Operation::Unlink => hook.on_unlink().is_some(),
        Operation::GetXattr => hook.on_get_xattr().is_some(),
        Operation::ListXattr => hook.on_list_xattr().is_some(),
        Operation::RemoveXattr => hook.on_remove_xattr().is_some(),
        Operation::SetXattr => hook.on_set_xattr().is_some(),
    }
}

/// Set of operations a hook implements.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u64);

impl Capabilities {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn detect(hook: &dyn Hook) -> Self {
        Operation::ALL
            .iter()
            .filter(|op| supports(hook, **op))
            .fold(Self::none(), |caps, op| caps.with(*op))
    }

    pub fn with(self, op: Operation) -> Self {
        Self(self.0 | op.bit())
    }

    pub fn contains(self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Operation> {
        Operation::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Operation::name)).finish()
    }
}

/// A hook together with the capabilities detected when it was registered.
///
/// Cloning is cheap; a clone is the snapshot a handle keeps for its
/// lifetime.
#[derive(Clone)]
pub struct RegisteredHook {
    hook: Arc<dyn Hook>,
    capabilities: Capabilities,
}

impl RegisteredHook {
    pub fn new(hook: Arc<dyn Hook>) -> Self {
        let capabilities = Capabilities::detect(hook.as_ref());
        debug!("registered hook with capabilities {capabilities:?}");
        Self { hook, capabilities }
    }

    pub fn hook(&self) -> &dyn Hook {
        self.hook.as_ref()
    }

    pub fn shared(&self) -> &Arc<dyn Hook> {
        &self.hook
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The pair for `op`, if the hook was registered with it.
    pub fn pair<'a, P: ?Sized>(
        &'a self,
        op: Operation,
        select: impl FnOnce(&'a dyn Hook) -> Option<&'a P>,
    ) -> Option<&'a P> {
        if self.capabilities.contains(op) {
            select(self.hook.as_ref())
        } else {
            None
        }
    }
}

impl fmt::Debug for RegisteredHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHook")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
