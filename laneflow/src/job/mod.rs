//! Units of work and the handles used to chain them.
//!
//! A job is a `FnOnce(&JobContext)` scheduled on the [`Runtime`] after a
//! dependency [`JobHandle`] completes. Handles can be combined, queried and
//! waited on. Nothing here yields: a job runs to completion once started.
//!
//! [`Runtime`]: crate::runtime::Runtime

mod context;
pub use context::{JobContext, Lane, Lanes};
pub(crate) use context::PoolId;

mod fence;
pub(crate) use fence::{Fence, JobFn, Schedule};

mod handle;
pub use handle::JobHandle;

mod id;
pub use id::JobId;
