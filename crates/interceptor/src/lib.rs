//! Hook traits and the interception protocol shared by every hooked
//! operation.

pub mod capability;
pub mod context;
pub mod decision;
pub mod hooks;
pub mod operation;
pub mod protocol;

pub use capability::{Capabilities, RegisteredHook, supports};
pub use context::HookContext;
pub use decision::{Post, Pre};
pub use hooks::*;
pub use operation::{Operation, ShortCircuitPolicy};
pub use protocol::{Interceptor, contract_violation, outcome, replaced, status};
