//! Typed record streams.
//!
//! A [`DataStream`] collects records from any lane into its pending buffer.
//! Consolidation moves them into the live array, which readers then iterate as
//! one contiguous snapshot until the next consolidation.
//!
//! ```text
//!  lane 0 ──┐
//!  lane 1 ──┼──> pending ──consolidate──> live ──> readers
//!  lane N ──┘
//! ```

mod capability;
pub use capability::{Appender, LiveReader, PendingWriter};

#[allow(clippy::module_inception)]
mod stream;
pub use stream::{DataStream, StreamOpts};
pub(crate) use stream::Consolidate;
