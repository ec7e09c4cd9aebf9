use std::path::Path;

use hookfs_common::{Errno, FsResult, HookError};
use log::{debug, error};

use crate::capability::RegisteredHook;
use crate::context::HookContext;
use crate::decision::{Post, Pre};
use crate::hooks::{Hook, Status};
use crate::operation::{Operation, ShortCircuitPolicy};

/// One interception of one operation.
///
/// `P` is the pair trait for the operation (for example
/// `dyn MkdirHook`). When `pair` is `None` (no hook, a hook without this
/// pair, or a disabled hook) every `run*` method is a plain call to the
/// delegate.
pub struct Interceptor<'a, P: ?Sized> {
    op: Operation,
    path: &'a Path,
    pair: Option<&'a P>,
}

impl<'a, P: ?Sized> Interceptor<'a, P> {
    pub fn new(op: Operation, path: &'a Path, pair: Option<&'a P>) -> Self {
        Self { op, path, pair }
    }

    /// Look up the pair for `op` on a registered hook.
    pub fn for_hook(
        op: Operation,
        path: &'a Path,
        hook: Option<&'a RegisteredHook>,
        select: impl FnOnce(&'a dyn Hook) -> Option<&'a P>,
    ) -> Self {
        Self::new(op, path, hook.and_then(|hook| hook.pair(op, select)))
    }

    pub fn is_hooked(&self) -> bool {
        self.pair.is_some()
    }

    /// Pre-hook, delegate, post-hook.
    ///
    /// A short-circuit value is returned as-is; a replacement wins
    /// outright over the delegate's outcome.
    pub fn run<T>(
        self,
        before: impl FnOnce(&P) -> Pre<T>,
        delegate: impl FnOnce() -> FsResult<T>,
        after: impl FnOnce(&P, &FsResult<T>, HookContext) -> Post<T>,
    ) -> FsResult<T> {
        self.run_shaped(before, |value| value, delegate, after, replaced)
    }

    /// [`run`](Self::run) for operations whose hook values differ in shape
    /// from the delegate's result.
    ///
    /// `synthesize` turns a successful short-circuit value into a result.
    /// `reconcile` combines the delegate's outcome with a post-hook
    /// replacement.
    pub fn run_shaped<S, T, R>(
        self,
        before: impl FnOnce(&P) -> Pre<S>,
        synthesize: impl FnOnce(S) -> T,
        delegate: impl FnOnce() -> FsResult<T>,
        after: impl FnOnce(&P, &FsResult<T>, HookContext) -> Post<R>,
        reconcile: impl FnOnce(FsResult<T>, Result<R, HookError>) -> FsResult<T>,
    ) -> FsResult<T> {
        let Some(pair) = self.pair else {
            return delegate();
        };

        let ctx = match before(pair) {
            Pre::Proceed(ctx) => ctx,
            Pre::ShortCircuit(Ok(value)) => {
                if self.op.short_circuit_policy() == ShortCircuitPolicy::RequireError {
                    contract_violation(
                        self.op,
                        self.path,
                        "pre-hook short-circuited without an error",
                    );
                }
                debug!("{} {}: prehooked", self.op, self.path.display());
                return Ok(synthesize(value));
            }
            Pre::ShortCircuit(Err(err)) => {
                debug!("{} {}: prehooked with {err}", self.op, self.path.display());
                return Err(err.errno());
            }
        };

        let outcome = delegate();
        match after(pair, &outcome, ctx) {
            Post::Keep => outcome,
            Post::Replace(replacement) => {
                match &replacement {
                    Ok(_) => debug!("{} {}: posthooked", self.op, self.path.display()),
                    Err(err) => {
                        debug!("{} {}: posthooked with {err}", self.op, self.path.display())
                    }
                }
                reconcile(outcome, replacement)
            }
        }
    }

    /// [`run_shaped`](Self::run_shaped) for operations that have no value
    /// to fabricate, so a short-circuit must carry an error.
    pub fn run_guarded<T, R>(
        self,
        before: impl FnOnce(&P) -> Pre,
        delegate: impl FnOnce() -> FsResult<T>,
        after: impl FnOnce(&P, &FsResult<T>, HookContext) -> Post<R>,
        reconcile: impl FnOnce(FsResult<T>, Result<R, HookError>) -> FsResult<T>,
    ) -> FsResult<T> {
        let (op, path) = (self.op, self.path);
        self.run_shaped(
            before,
            |()| contract_violation(op, path, "pre-hook short-circuited without an error"),
            delegate,
            after,
            reconcile,
        )
    }

    /// Pre-hook, delegate, post-hook for operations without a status.
    ///
    /// The hooks only observe: the delegate runs exactly once no matter
    /// what they return.
    pub fn observe(
        self,
        before: impl FnOnce(&P) -> (bool, HookContext),
        delegate: impl FnOnce(),
        after: impl FnOnce(&P, HookContext) -> bool,
    ) {
        let Some(pair) = self.pair else {
            delegate();
            return;
        };

        let (prehooked, ctx) = before(pair);
        if prehooked {
            debug!("{} {}: prehooked", self.op, self.path.display());
        }
        delegate();
        if after(pair, ctx) {
            debug!("{} {}: posthooked", self.op, self.path.display());
        }
    }
}

/// The replacement, reduced to a status.
pub fn replaced<T>(_outcome: FsResult<T>, replacement: Result<T, HookError>) -> FsResult<T> {
    replacement.map_err(|err| err.errno())
}

/// The delegate outcome as a post-hook sees it.
pub fn outcome<T>(result: &FsResult<T>) -> Result<&T, Errno> {
    result.as_ref().map_err(|errno| *errno)
}

/// The delegate outcome without its value.
pub fn status<T>(result: &FsResult<T>) -> Status {
    result.as_ref().map(|_| ()).map_err(|errno| *errno)
}

/// A hook broke the interception contract. This is a defect in the hook,
/// not a filesystem error, so it is never reported as a status.
#[track_caller]
pub fn contract_violation(op: Operation, path: &Path, detail: &str) -> ! {
    error!("hook contract violation in {op} on {}: {detail}", path.display());
    panic!("hook contract violation in {op} on {}: {detail}", path.display());
}
