//! Drivers and the per-cycle schedule.
//!
//! A [`TaskSystem`] hands out [`TaskDriverBuilder`]s. Each driver owns the
//! streams it declares and one update job per stream. Every cycle, a driver
//! consolidates its streams, runs its jobs over the live records and settles
//! its cancellations.

mod builder;
pub use builder::{TaskDriverBuilder, UpdateJobBuilder};

#[allow(clippy::module_inception)]
mod driver;
pub use driver::TaskDriver;

mod job;
pub use job::{CancelContext, UpdateContext};

mod system;
pub use system::TaskSystem;

#[cfg(test)]
mod tests;
