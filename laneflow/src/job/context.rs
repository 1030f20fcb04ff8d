use crate::job::JobId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies the worker pool a set of lanes belongs to. Two runtimes never
/// share lanes.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) struct PoolId(u64);

impl PoolId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        PoolId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The set of lanes of one runtime: one per worker plus the coordination
/// thread's.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Lanes {
    pool: PoolId,
    count: usize,
}

impl Lanes {
    pub(crate) fn new(pool: PoolId, count: usize) -> Self {
        Self { pool, count }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn pool(&self) -> PoolId {
        self.pool
    }

    /// Lanes not backed by any runtime, to exercise lane-indexed containers
    /// from a single test thread.
    #[cfg(test)]
    pub(crate) fn detached(count: usize) -> Self {
        Self::new(PoolId::next(), count)
    }

    #[cfg(test)]
    pub(crate) fn lane(&self, index: usize) -> Lane {
        assert!(index < self.count, "lane {index} out of bounds");
        Lane::new(self.pool, index)
    }
}

/// A write lane of a [`LaneBuffer`](crate::collections::LaneBuffer).
///
/// Worker `i` owns lane `i` and the thread that built the runtime owns the last
/// lane. A `Lane` can't leave the thread it was handed to, which is what makes
/// un-synchronized appends to a lane sound.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Lane {
    pool: PoolId,
    index: usize,
    _not_send: PhantomData<*const ()>,
}

impl Lane {
    pub(crate) fn new(pool: PoolId, index: usize) -> Self {
        Self {
            pool,
            index,
            _not_send: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn pool(&self) -> PoolId {
        self.pool
    }
}

impl fmt::Debug for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lane").field(&self.index).finish()
    }
}

/// Handed to every job when it runs on a worker.
#[derive(Debug)]
pub struct JobContext {
    lane: Lane,
    id: JobId,
}

impl JobContext {
    pub(crate) fn new(lane: Lane, id: JobId) -> Self {
        Self { lane, id }
    }

    /// Lane owned by the worker executing this job.
    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn id(&self) -> JobId {
        self.id
    }
}
