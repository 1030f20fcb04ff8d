// Public API
#[allow(clippy::module_inception)]
pub mod runtime;
pub use runtime::{Builder, Runtime};

// Exports
pub(crate) use runtime::RuntimeConfig;

pub(crate) mod context;

mod pool;

mod scheduler;
pub(crate) use scheduler::{Handle, Scheduler};

mod shared;

mod worker;

#[cfg(test)]
mod tests;
