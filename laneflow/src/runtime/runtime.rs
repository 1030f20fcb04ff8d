use crate::id::{DEFAULT_WARNING_THRESHOLD, IdProvider};
use crate::job::{JobContext, JobHandle, Lane, Lanes};
use crate::runtime::{Handle, Scheduler};
use anyhow::{Result, ensure};
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

/// Maximum number of stealing attempts.
const MAX_STEAL_RETRIES: usize = 3;

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let worker_count = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = worker_count.fetch_add(1, Ordering::Relaxed);
        format!("laneflow-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

#[derive(Debug)]
pub struct Builder {
    /// The number of worker threads. Defaults to 1 per core. The thread
    /// building the runtime is *not* a worker, it owns the extra lane.
    worker_threads: Option<usize>,

    /// Name fn used for threads spawned by the runtime.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the runtime.
    thread_stack_size: Option<usize>,

    /// How many times a worker will loop over the global injector queue and
    /// other workers queues to try and find work, before parking.
    max_steal_retries: usize,

    /// Threshold handed to the runtime's [`IdProvider`].
    id_warning_threshold: u32,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            max_steal_retries: MAX_STEAL_RETRIES,
            id_warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }

    /// The number of worker threads.
    ///
    /// Defaults to 1 worker per CPU core.
    #[track_caller]
    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "worker_threads must be greater than 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets name of threads spawned by the `Runtime`'s thread pool.
    ///
    /// The default name is "laneflow-{id}", where id is monotonically
    /// increasing.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned by the
    /// `Runtime`'s thread pool.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies minimal stack size.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(
            val.is_power_of_two(),
            "thread_stack_size must be a power of two"
        );
        self.thread_stack_size = Some(val);
        self
    }

    #[track_caller]
    pub fn max_steal_retries(mut self, val: usize) -> Self {
        assert!(val > 0, "max_steal_retries must be greater than 0");
        self.max_steal_retries = val;
        self
    }

    #[track_caller]
    pub fn id_warning_threshold(mut self, val: u32) -> Self {
        assert!(val > 0, "id_warning_threshold must be greater than 0");
        self.id_warning_threshold = val;
        self
    }

    /// Creates the configured `Runtime`.
    ///
    /// Worker threads are started and parked by the time this returns.
    pub fn try_build(self) -> Result<Runtime> {
        let cfg = RuntimeConfig::try_from(self)?;
        let ids = Arc::new(IdProvider::new(cfg.id_warning_threshold));
        let scheduler = Scheduler::new(cfg).into_handle();

        scheduler.spawn_workers()?;

        tracing::debug!(
            worker_threads = scheduler.cfg.worker_threads,
            "runtime started"
        );

        Ok(Runtime {
            scheduler,
            ids,
            owner: thread::current().id(),
        })
    }
}

/// A pool of worker threads executing jobs, plus the id session of everything
/// built on top of it.
///
/// Dropping the runtime shuts it down.
#[derive(Debug)]
pub struct Runtime {
    scheduler: Handle,

    ids: Arc<IdProvider>,

    /// Thread that built the runtime, it owns the last lane.
    owner: ThreadId,
}

impl Runtime {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Schedules `job` to run on a worker once `dependency` completes.
    pub fn schedule<F>(&self, dependency: &JobHandle, job: F) -> JobHandle
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.scheduler.schedule(dependency, job)
    }

    pub fn worker_threads(&self) -> usize {
        self.scheduler.cfg.worker_threads
    }

    pub fn lanes(&self) -> Lanes {
        self.scheduler.lanes
    }

    /// `worker_threads() + 1`.
    pub fn lane_count(&self) -> usize {
        self.lanes().count()
    }

    /// Lane owned by the thread that built the runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from any other thread.
    #[track_caller]
    pub fn main_lane(&self) -> Lane {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "main lane is owned by the thread that built the runtime"
        );

        Lane::new(self.lanes().pool(), self.worker_threads())
    }

    pub fn ids(&self) -> &Arc<IdProvider> {
        &self.ids
    }

    /// Shutdown the runtime.
    ///
    /// Workers finish the job they are running and exit. Jobs still queued are
    /// dropped and their handles complete poisoned.
    pub fn shutdown(self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&self) {
        if let Err(e) = self.scheduler.shutdown() {
            tracing::error!(error = %e, "error during runtime shutdown");
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

// Export runtime builder as a RuntimeConfig object to be consumed by the
// scheduler and its workers.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) worker_threads: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) max_steal_retries: usize,
    pub(crate) id_warning_threshold: u32,
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        ensure!(self.worker_threads > 0, "worker_threads must be greater than 0");
        ensure!(
            self.max_steal_retries > 0,
            "max_steal_retries must be greater than 0"
        );
        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let worker_threads = match builder.worker_threads {
            Some(n) => n,
            None => thread::available_parallelism()?.get(),
        };

        let cfg = RuntimeConfig {
            worker_threads,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            max_steal_retries: builder.max_steal_retries,
            id_warning_threshold: builder.id_warning_threshold,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
