use crate::job::{Fence, JobId};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Completion handle of a scheduled job.
///
/// Cheap to clone. The default handle is already completed, which is what every
/// "nothing to wait on" dependency looks like.
#[derive(Clone, Default)]
pub struct JobHandle {
    fence: Option<Arc<Fence>>,
}

impl JobHandle {
    /// A handle that is already completed.
    pub fn completed() -> Self {
        Self::default()
    }

    pub(crate) fn from_fence(fence: Arc<Fence>) -> Self {
        Self { fence: Some(fence) }
    }

    pub(crate) fn fence(&self) -> Option<&Arc<Fence>> {
        self.fence.as_ref()
    }

    pub fn id(&self) -> Option<JobId> {
        self.fence.as_ref().map(|f| f.id())
    }

    pub fn is_completed(&self) -> bool {
        self.fence.as_ref().is_none_or(|f| f.is_completed())
    }

    /// Whether the job, or one of the jobs it waited on, panicked.
    pub fn is_poisoned(&self) -> bool {
        self.fence.as_ref().is_some_and(|f| f.is_poisoned())
    }

    /// Blocks the calling thread until the job completes.
    ///
    /// # Panics
    ///
    /// Panics if the job is poisoned. Must not be called from inside a job: a
    /// worker blocked on a job that is queued behind it never wakes up.
    #[track_caller]
    pub fn complete(&self) {
        let Some(fence) = &self.fence else {
            return;
        };

        debug_assert!(
            crate::runtime::context::current_lane().is_none() || fence.is_completed(),
            "JobHandle::complete() called from inside a job"
        );

        fence.wait();

        if fence.is_poisoned() {
            panic!("job {} was poisoned by a panic", fence.id());
        }
    }

    /// Combines many handles into one that completes once all of them have.
    ///
    /// Completed handles are skipped, so combining nothing (or only completed
    /// handles) returns a completed handle without allocating.
    pub fn combine<'a, I>(handles: I) -> JobHandle
    where
        I: IntoIterator<Item = &'a JobHandle>,
    {
        let mut pending: SmallVec<[Arc<Fence>; 4]> = SmallVec::new();

        for fence in handles.into_iter().filter_map(|h| h.fence.as_ref()) {
            // Keep poisoned fences around so poison still propagates.
            if fence.is_completed() && !fence.is_poisoned() {
                continue;
            }

            if !pending.iter().any(|p| Arc::ptr_eq(p, fence)) {
                pending.push(Arc::clone(fence));
            }
        }

        match pending.len() {
            0 => JobHandle::completed(),
            1 => JobHandle {
                fence: pending.pop(),
            },
            _ => {
                let barrier = Fence::barrier();
                for fence in &pending {
                    barrier.add_dependency(fence);
                }
                barrier.arm();

                JobHandle::from_fence(barrier)
            }
        }
    }

    /// Whether `self` can only complete after `other` has.
    ///
    /// A completed `other` trivially satisfies this. Otherwise the dependency
    /// graph of `self` is searched for `other`.
    pub fn depends_on(&self, other: &JobHandle) -> bool {
        let Some(target) = &other.fence else {
            return true;
        };

        if target.is_completed() {
            return true;
        }

        let Some(start) = &self.fence else {
            return false;
        };

        let mut seen = HashSet::new();
        let mut stack = vec![Arc::clone(start)];

        while let Some(fence) = stack.pop() {
            if Arc::ptr_eq(&fence, target) {
                return true;
            }

            if seen.insert(Arc::as_ptr(&fence)) {
                stack.extend(fence.predecessors());
            }
        }

        // Intermediate fences drop their predecessors when they complete, which
        // only happens after `target` did.
        target.is_completed()
    }
}

impl From<Arc<Fence>> for JobHandle {
    fn from(fence: Arc<Fence>) -> Self {
        Self::from_fence(fence)
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fence {
            Some(fence) => f
                .debug_struct("JobHandle")
                .field("id", &fence.id())
                .field("completed", &fence.is_completed())
                .field("poisoned", &fence.is_poisoned())
                .finish(),
            None => f.debug_struct("JobHandle").field("completed", &true).finish(),
        }
    }
}
