use std::any::Any;

use hookfs_common::HookError;

use crate::context::HookContext;

/// What a pre-hook decided.
#[must_use]
#[derive(Debug)]
pub enum Pre<T = ()> {
    /// Run the real operation, then the post-hook with this context.
    Proceed(HookContext),
    /// Answer the request without touching the delegate. The post-hook
    /// is not called.
    ShortCircuit(Result<T, HookError>),
}

impl<T> Pre<T> {
    pub fn proceed() -> Self {
        Self::Proceed(HookContext::empty())
    }

    pub fn proceed_with<C: Any + Send>(ctx: C) -> Self {
        Self::Proceed(HookContext::new(ctx))
    }

    pub fn short_circuit(value: T) -> Self {
        Self::ShortCircuit(Ok(value))
    }

    pub fn fail(err: impl Into<HookError>) -> Self {
        Self::ShortCircuit(Err(err.into()))
    }

    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Self::ShortCircuit(_))
    }
}

/// What a post-hook decided.
#[must_use]
#[derive(Debug)]
pub enum Post<T = ()> {
    /// Return the delegate's outcome untouched.
    Keep,
    /// Discard the delegate's outcome and return this instead.
    Replace(Result<T, HookError>),
}

impl<T> Post<T> {
    pub fn replace(value: T) -> Self {
        Self::Replace(Ok(value))
    }

    pub fn fail(err: impl Into<HookError>) -> Self {
        Self::Replace(Err(err.into()))
    }

    pub fn is_replace(&self) -> bool {
        matches!(self, Self::Replace(_))
    }
}
