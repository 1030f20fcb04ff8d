use crate::job::{JobContext, JobHandle};
use crate::runtime::Runtime;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

struct Inner<T> {
    items: UnsafeCell<Vec<T>>,

    jobs: Mutex<Jobs>,
}

#[derive(Debug, Default)]
struct Jobs {
    /// Last job scheduled to fill the array.
    writer: JobHandle,

    /// Readers scheduled since the last fill.
    readers: JobHandle,
}

// Safety: `items` is only mutated by the job recorded in `writer`, which runs
// after every reader scheduled before it. Readers run after the writer.
unsafe impl<T: Send + Sync> Sync for Inner<T> {}

/// Array whose length and contents are produced by a job.
///
/// Nothing about the contents is known when scheduling work that consumes it:
/// consumers read it when their own job runs, after the writer.
pub struct DeferredArray<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DeferredArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for DeferredArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeferredArray<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                items: UnsafeCell::new(Vec::new()),
                jobs: Mutex::new(Jobs::default()),
            }),
        }
    }

    /// Handle of the job that fills the array.
    pub fn writer(&self) -> JobHandle {
        self.inner.jobs.lock().writer.clone()
    }

    /// # Safety
    ///
    /// Nothing mutates the array for the lifetime of the returned slice.
    pub unsafe fn as_slice(&self) -> &[T] {
        unsafe { &*self.inner.items.get() }
    }

    /// # Safety
    ///
    /// Caller has exclusive access to the array for the lifetime of the
    /// returned reference.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn as_mut_vec(&self) -> &mut Vec<T> {
        unsafe { &mut *self.inner.items.get() }
    }
}

impl<T: Send + Sync + 'static> DeferredArray<T> {
    /// Schedules `f` to fill the array after `dependency`, the previous
    /// writer and every reader scheduled so far.
    pub(crate) fn schedule_fill<F>(&self, rt: &Runtime, dependency: &JobHandle, f: F) -> JobHandle
    where
        F: FnOnce(&JobContext, &mut Vec<T>) + Send + 'static,
    {
        let mut jobs = self.inner.jobs.lock();
        let array = self.clone();

        let wait = JobHandle::combine([dependency, &jobs.writer, &jobs.readers]);
        let job = rt.schedule(&wait, move |ctx| {
            // Safety: ordered after every other job touching the array.
            f(ctx, unsafe { array.as_mut_vec() })
        });

        jobs.writer = job.clone();
        jobs.readers = JobHandle::completed();
        job
    }

    /// Schedules `f` to read the array once `dependency` and the writer
    /// completed.
    pub fn schedule_read<F>(&self, rt: &Runtime, dependency: &JobHandle, f: F) -> JobHandle
    where
        F: FnOnce(&JobContext, &[T]) + Send + 'static,
    {
        let mut jobs = self.inner.jobs.lock();
        let array = self.clone();

        let job = rt.schedule(&JobHandle::combine([dependency, &jobs.writer]), move |ctx| {
            // Safety: runs after the writer, the next writer waits on us.
            f(ctx, unsafe { array.as_slice() })
        });

        jobs.readers = JobHandle::combine([&jobs.readers, &job]);
        job
    }

    /// Blocks until the writer completed and copies the contents out.
    ///
    /// # Panics
    ///
    /// If the writer panicked.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        loop {
            let jobs = self.inner.jobs.lock();
            if jobs.writer.is_completed() {
                jobs.writer.complete();

                // Safety: no writer can be scheduled while we hold the lock.
                return unsafe { self.as_slice() }.to_vec();
            }

            let writer = jobs.writer.clone();
            drop(jobs);
            writer.complete();
        }
    }
}

impl<T> fmt::Debug for DeferredArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredArray")
            .field("jobs", &*self.inner.jobs.lock())
            .finish_non_exhaustive()
    }
}
