//! Lock-free containers whose access is ordered by job dependencies.

mod deferred;
pub use deferred::DeferredArray;

mod lane_buffer;
pub use lane_buffer::LaneBuffer;
