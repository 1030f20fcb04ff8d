//! Lane-partitioned data streams, access-controlled job chains and
//! cooperative cancellation.
//!
//! Records are appended to a [`DataStream`] from any worker lane without
//! locking, then consolidated into a contiguous live array that jobs read
//! until the next consolidation. Every access to a stream goes through its
//! [`AccessController`], which turns it into a dependency of the job doing
//! it. A [`TaskDriver`] schedules the whole cycle: consolidation, update and
//! cancel passes, and routing of finished records into the streams of other
//! drivers.
//!
//! ```no_run
//! use laneflow::{Runtime, StreamOpts, TaskSystem};
//! # fn main() -> anyhow::Result<()> {
//! let rt = Runtime::builder().worker_threads(4).try_build()?;
//! let mut system = TaskSystem::new(&rt);
//!
//! let mut builder = system.driver("movement");
//! let positions = builder.stream::<(f32, f32)>(StreamOpts::CANCELLABLE)?;
//! builder
//!     .update(&positions)
//!     .on_update(|cx, &(x, y)| cx.continue_with((x + 1.0, y)))
//!     .add()?;
//! let driver = system.add(builder.build()?);
//!
//! system.update(&rt);
//! # drop(driver);
//! # Ok(())
//! # }
//! ```

pub mod access;
pub use access::{AccessControlledValue, AccessController, AccessKind};

pub mod cancel;

pub mod collections;

pub mod driver;
pub use driver::{TaskDriver, TaskSystem};

mod errors;
pub use errors::ConfigError;

pub mod host;

pub mod id;
pub use id::{ActiveId, ContextId, IdProvider};

pub mod instance;
pub use instance::{Entity, Entry, InstanceId};

pub mod job;
pub use job::{JobContext, JobHandle, Lane};

pub mod resolve;

pub mod runtime;
pub use runtime::{Builder, Runtime};

pub mod stream;
pub use stream::{DataStream, StreamOpts};

#[cfg(test)]
mod test_utils;
