use crate::job::{Fence, JobContext, JobHandle, Lanes, PoolId, Schedule};
use crate::runtime::context::with_current_worker;
use crate::runtime::pool::ThreadPool;
use crate::runtime::shared::Shared;
use crate::runtime::worker::Job;
use crate::runtime::RuntimeConfig;
use anyhow::Result;
use crossbeam_deque::Injector;
use std::ops::Deref;
use std::sync::{Arc, OnceLock, Weak};

#[derive(Debug)]
pub(crate) struct Scheduler {
    pub(crate) cfg: RuntimeConfig,

    pub(crate) lanes: Lanes,

    /// The global injector queue, jobs scheduled from outside the pool land here.
    pub(crate) injector: Injector<Job>,

    /// Shared between workers.
    pub(crate) shared: Shared,

    pub(crate) pool: OnceLock<ThreadPool>,
}

impl Scheduler {
    pub(crate) fn new(cfg: RuntimeConfig) -> Self {
        Self {
            lanes: Lanes::new(PoolId::next(), cfg.worker_threads + 1),
            shared: Shared::new(cfg.worker_threads),
            injector: Injector::new(),
            pool: OnceLock::new(),
            cfg,
        }
    }

    pub(crate) fn into_handle(self) -> Handle {
        Handle(Arc::new(self))
    }

    fn push(&self, job: Job) {
        if let Some(job) = self.push_local(job) {
            self.injector.push(job);

            // Late push racing with shutdown, nobody is left to drain the injector.
            if self.shared.is_shutdown() {
                self.cancel_injected();
                return;
            }
        }

        self.shared.unpark_one_thread();
    }

    // Returns the job back when not called from one of our workers.
    fn push_local(&self, job: Job) -> Option<Job> {
        let mut job = Some(job);

        with_current_worker(|worker| {
            if worker.belongs_to(self)
                && let Some(job) = job.take()
            {
                worker.push_local(job);
            }
        });

        job
    }

    fn cancel_injected(&self) -> usize {
        let mut cancelled = 0;
        while let Some(job) = self.injector.steal().success() {
            job.cancel();
            cancelled += 1;
        }
        cancelled
    }
}

impl Schedule for Scheduler {
    fn schedule(&self, job: Arc<Fence>) {
        self.push(job);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Handle(Arc<Scheduler>);

impl Handle {
    pub(crate) fn spawn_workers(&self) -> Result<()> {
        let pool = ThreadPool::try_new(self)?;
        if self.pool.set(pool).is_err() {
            panic!("thread pool already initialized");
        }
        Ok(())
    }

    pub(crate) fn schedule<F>(&self, dependency: &JobHandle, job: F) -> JobHandle
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        let scheduler: Weak<dyn Schedule> = Arc::downgrade(&self.0) as Weak<dyn Schedule>;
        let fence = Fence::new(Some(Box::new(job)), Some(scheduler));

        if let Some(dep) = dependency.fence() {
            fence.add_dependency(dep);
        }

        fence.arm();
        JobHandle::from_fence(fence)
    }

    pub(crate) fn shutdown(&self) -> Result<()> {
        // Only the first caller does the work.
        if self.shared.shutdown.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }

        let unparked = self.shared.unpark_all_threads();
        let res = self.pool.get().map_or(Ok(()), ThreadPool::join_all);
        let cancelled = self.cancel_injected();

        tracing::debug!(unparked, cancelled, "scheduler shut down");
        res
    }
}

impl Deref for Handle {
    type Target = Arc<Scheduler>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
