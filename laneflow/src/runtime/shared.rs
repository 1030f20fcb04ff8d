use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};

#[derive(Debug)]
struct Parked {
    thread: Thread,
    should_unpark: Arc<AtomicBool>,
}

/// State shared by every worker of a pool.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) shutdown: AtomicBool,

    /// LIFO collection of parked threads. We unpark thread in LIFO order as the
    /// latest parked thread is the one where CPU cache will be the hotest.
    parked_threads: RwLock<VecDeque<Parked>>,
}

impl Shared {
    pub(crate) fn new(worker_threads: usize) -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            parked_threads: RwLock::new(VecDeque::with_capacity(worker_threads)),
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Parks the current thread until the scheduler unparks it. Returns right
    /// away if `has_work` reports work or the pool is shutting down.
    pub(crate) fn park_current_thread<F>(&self, should_unpark: &Arc<AtomicBool>, has_work: F)
    where
        F: FnOnce() -> bool,
    {
        {
            let mut parked_threads = self.parked_threads.write();

            // We need to check these signals *while holding the lock* to avoid race
            // conditions. These are used right before we call unpark.
            if has_work() || self.is_shutdown() {
                return;
            }

            should_unpark.store(false, Ordering::Release);
            parked_threads.push_back(Parked {
                thread: thread::current(),
                should_unpark: Arc::clone(should_unpark),
            });
        }

        // Release lock and spin until it is time to unpark. We use this loop to
        // account for spurious wakeups as per docs.
        while !should_unpark.load(Ordering::Acquire) {
            thread::park();
        }
    }

    pub(crate) fn unpark_one_thread(&self) -> bool {
        if let Some(parked) = self.parked_threads.write().pop_back() {
            parked.should_unpark.store(true, Ordering::Release);
            parked.thread.unpark();
            true
        } else {
            false
        }
    }

    pub(crate) fn unpark_all_threads(&self) -> usize {
        let mut num_unparked = 0;
        let mut parked_threads = self.parked_threads.write();

        while let Some(parked) = parked_threads.pop_back() {
            num_unparked += 1;
            parked.should_unpark.store(true, Ordering::Release);
            parked.thread.unpark();
        }

        num_unparked
    }

    pub(crate) fn num_parked(&self) -> usize {
        self.parked_threads.read().len()
    }
}
