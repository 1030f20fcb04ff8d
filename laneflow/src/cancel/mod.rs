//! Cancelling instances across cycles.
//!
//! ```text
//!  request ──> registered ──> cancel continuation ──┬──> completed
//!                                  ^                 │
//!                                  └── in flight <───┘
//! ```

mod flow;
pub use flow::{CancelFlow, CancelProgress};
pub(crate) use flow::CancelView;
