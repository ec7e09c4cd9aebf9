use std::any::Any;
use std::fmt;

/// Value a pre-hook hands to the post-hook of the same invocation.
///
/// Opaque to the engine. It is moved from the pre-hook into the post-hook
/// and never stored, so two concurrent invocations can never observe each
/// other's context.
#[derive(Default)]
pub struct HookContext(Option<Box<dyn Any + Send>>);

impl HookContext {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref()?.downcast_ref()
    }

    /// Take the value out. On a type mismatch the context is handed back
    /// unchanged.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        match self.0 {
            Some(boxed) => boxed.downcast::<T>().map(|v| *v).map_err(|b| Self(Some(b))),
            None => Err(Self(None)),
        }
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("HookContext(..)"),
            None => f.write_str("HookContext(empty)"),
        }
    }
}
