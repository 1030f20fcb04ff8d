use crate::job::{JobContext, JobId, Lane};
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

pub(crate) type JobFn = Box<dyn FnOnce(&JobContext) + Send + 'static>;

/// Where a fence goes once all of its predecessors have completed.
pub(crate) trait Schedule: Send + Sync + 'static {
    fn schedule(&self, job: Arc<Fence>);
}

type Fences = SmallVec<[Arc<Fence>; 4]>;

#[derive(Default)]
struct State {
    completed: bool,

    /// Fences waiting on this one. Drained exactly once, on completion.
    dependents: Fences,
}

/// Completion fence of a unit of work.
///
/// A fence starts with one extra unresolved predecessor, held by whoever is
/// wiring it, so it can't fire before all of its dependencies are attached.
/// [`Fence::arm`] drops that guard.
pub(crate) struct Fence {
    id: JobId,

    remaining: AtomicUsize,

    poisoned: AtomicBool,

    work: Mutex<Option<JobFn>>,

    scheduler: Option<Weak<dyn Schedule>>,

    state: Mutex<State>,

    /// Fences this one waits on, only kept for `depends_on` queries. Cleared on
    /// completion.
    predecessors: Mutex<Fences>,

    cond: Condvar,
}

impl Fence {
    pub(crate) fn new(work: Option<JobFn>, scheduler: Option<Weak<dyn Schedule>>) -> Arc<Self> {
        Arc::new(Self {
            id: JobId::next(),
            remaining: AtomicUsize::new(1),
            poisoned: AtomicBool::new(false),
            work: Mutex::new(work),
            scheduler,
            state: Mutex::new(State::default()),
            predecessors: Mutex::new(SmallVec::new()),
            cond: Condvar::new(),
        })
    }

    /// A fence with no work, it completes as soon as its predecessors do.
    pub(crate) fn barrier() -> Arc<Self> {
        Self::new(None, None)
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    pub(crate) fn predecessors(&self) -> Fences {
        self.predecessors.lock().clone()
    }

    /// Must be called before [`Fence::arm`].
    pub(crate) fn add_dependency(self: &Arc<Self>, pred: &Arc<Fence>) {
        debug_assert!(!Arc::ptr_eq(self, pred), "a job can't depend on itself");

        {
            let mut state = pred.state.lock();
            if state.completed {
                if pred.is_poisoned() {
                    self.poisoned.store(true, Ordering::Release);
                }
                return;
            }

            self.remaining.fetch_add(1, Ordering::AcqRel);
            state.dependents.push(Arc::clone(self));
        }

        self.predecessors.lock().push(Arc::clone(pred));
    }

    /// Drops the wiring guard. The fence may fire, run or complete before this
    /// returns.
    pub(crate) fn arm(self: &Arc<Self>) {
        if self.release_predecessor(false)
            && let Some(fence) = Arc::clone(self).dispatch()
        {
            fence.finish();
        }
    }

    fn release_predecessor(&self, poisoned: bool) -> bool {
        if poisoned {
            self.poisoned.store(true, Ordering::Release);
        }

        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "fence released more times than it was acquired");
        prev == 1
    }

    // Hands a ready fence to its scheduler. Returns the fence back if it has to
    // be completed inline instead: no work, poisoned or scheduler gone.
    fn dispatch(self: Arc<Self>) -> Option<Arc<Self>> {
        if self.is_poisoned() {
            drop(self.work.lock().take());
            return Some(self);
        }

        if self.work.lock().is_none() {
            return Some(self);
        }

        match self.scheduler.as_ref().and_then(Weak::upgrade) {
            Some(scheduler) => {
                scheduler.schedule(self);
                None
            }
            None => {
                tracing::debug!(job = %self.id, "scheduler gone, dropping job");
                self.poisoned.store(true, Ordering::Release);
                drop(self.work.lock().take());
                Some(self)
            }
        }
    }

    /// Runs the job on the current worker and completes the fence. A panic is
    /// caught and poisons the fence.
    pub(crate) fn run(self: Arc<Self>, lane: Lane) {
        let work = self.work.lock().take();

        if let Some(work) = work {
            let ctx = JobContext::new(lane, self.id);
            let res = panic::catch_unwind(AssertUnwindSafe(|| work(&ctx)));

            if let Err(payload) = res {
                tracing::error!(
                    job = %self.id,
                    lane = lane.index(),
                    panic = panic_payload_as_str(&payload).unwrap_or("unknown"),
                    "job panicked, poisoning dependents"
                );
                self.poisoned.store(true, Ordering::Release);
            }
        } else {
            tracing::trace!(job = %self.id, "job already taken");
        }

        self.finish();
    }

    /// Completes the fence without running its work.
    pub(crate) fn cancel(self: Arc<Self>) {
        self.poisoned.store(true, Ordering::Release);
        drop(self.work.lock().take());
        self.finish();
    }

    // Completing a fence may make any number of dependents ready, use an
    // explicit stack so long barrier chains don't recurse.
    fn finish(self: Arc<Self>) {
        let mut stack: SmallVec<[Arc<Fence>; 8]> = SmallVec::new();
        stack.push(self);

        while let Some(fence) = stack.pop() {
            let poisoned = fence.is_poisoned();

            let dependents = {
                let mut state = fence.state.lock();
                debug_assert!(!state.completed, "fence completed twice");
                state.completed = true;
                std::mem::take(&mut state.dependents)
            };

            fence.predecessors.lock().clear();
            fence.cond.notify_all();

            for dep in dependents {
                if dep.release_predecessor(poisoned)
                    && let Some(dep) = dep.dispatch()
                {
                    stack.push(dep);
                }
            }
        }
    }

    /// Blocks the calling thread until the fence completes.
    pub(crate) fn wait(&self) {
        let mut state = self.state.lock();
        while !state.completed {
            self.cond.wait(&mut state);
        }
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("id", &self.id)
            .field("remaining", &self.remaining.load(Ordering::Relaxed))
            .field("poisoned", &self.is_poisoned())
            .field("completed", &self.is_completed())
            .finish()
    }
}

fn panic_payload_as_str(payload: &Box<dyn Any + Send>) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some(s)
    } else {
        payload.downcast_ref::<String>().map(String::as_str)
    }
}
