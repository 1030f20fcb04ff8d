use crate::job::{Fence, Lane, Lanes};
use crate::runtime::Scheduler;
use crossbeam_deque::{Stealer, Worker as CbWorker};
use std::iter;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub(crate) type Job = Arc<Fence>;

#[derive(Debug)]
pub(crate) struct Worker {
    lane_index: usize,

    lanes: Lanes,

    scheduler: Arc<Scheduler>,

    /// Local queue, jobs scheduled from this worker land here.
    local: CbWorker<Job>,

    /// Handle to all of the other worker's queues. If there are N workers we
    /// will have N-1 queues to steal from.
    stealers: Vec<Stealer<Job>>,

    should_unpark: Arc<AtomicBool>,
}

impl Worker {
    pub(super) fn new(
        lane_index: usize,
        scheduler: Arc<Scheduler>,
        local: CbWorker<Job>,
        mut stealers: Vec<Stealer<Job>>,
    ) -> Self {
        // Shuffle the stealers so that each worker's search order when trying to
        // steal work is different and hopefully unique to reduce contention.
        fastrand::shuffle(&mut stealers);

        Self {
            lane_index,
            lanes: scheduler.lanes,
            scheduler,
            local,
            stealers,
            should_unpark: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn lane(&self) -> Lane {
        Lane::new(self.lanes.pool(), self.lane_index)
    }

    pub(crate) fn belongs_to(&self, scheduler: &Scheduler) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.scheduler), scheduler)
    }

    pub(crate) fn push_local(&self, job: Job) {
        self.local.push(job);
    }

    fn find_task(&self) -> Option<Job> {
        // 1. Our own queue, LIFO so the cache is hot.
        self.local.pop().or_else(|| {
            // 2. No local work, repeatedly try the global injector and other
            //    workers queues.
            iter::repeat_with(|| {
                self.scheduler
                    .injector
                    .steal_batch_and_pop(&self.local)
                    .or_else(||
                        // The behavior of collect here is to return the first Success(T) so
                        // *we are not* iterating through all stealers everytime.
                        self.stealers.iter().map(|s| s.steal()).collect())
            })
            .take(self.scheduler.cfg.max_steal_retries)
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
        })
    }

    fn has_work(&self) -> bool {
        !self.scheduler.injector.is_empty() || self.stealers.iter().any(|s| !s.is_empty())
    }

    pub(super) fn run(&self) {
        tracing::trace!(lane = self.lane_index, "worker started");

        loop {
            if self.scheduler.shared.is_shutdown() {
                break;
            }

            if let Some(job) = self.find_task() {
                job.run(self.lane());
            } else {
                self.scheduler
                    .shared
                    .park_current_thread(&self.should_unpark, || self.has_work());
            }
        }

        self.shutdown();
    }

    // Jobs left in our queue never run. Cancel them so anything waiting on them
    // wakes up poisoned instead of hanging.
    fn shutdown(&self) {
        let mut cancelled = 0;
        while let Some(job) = self.local.pop() {
            job.cancel();
            cancelled += 1;
        }

        tracing::trace!(lane = self.lane_index, cancelled, "worker stopped");
    }
}
