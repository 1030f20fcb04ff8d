//! Access coordination for shared resources.
//!
//! Nothing in this module blocks a worker: an [`AccessController`] only hands
//! out job dependencies. Synchronous variants block the coordinating thread.

mod controller;
pub use controller::{AccessController, AccessGuard, AccessKind};

mod value;
pub use value::{AccessControlledValue, ReadGuard, ValueAccess, WriteGuard};

#[cfg(test)]
mod tests;
