//! Routing records into streams owned by other contexts.
//!
//! Drivers register the streams they accept records into with a
//! [`ResolveTargetTable`]. A job declares the targets it writes to once, as
//! [`ResolveTargets`], and the grants taken when it is scheduled cover every
//! write it makes while running.

mod table;
pub use table::ResolveTargetTable;

mod targets;
pub use targets::{ResolveTargets, Resolved};
