use crate::runtime::context::init_worker_context;
use crate::runtime::worker::Worker;
use crate::runtime::{Handle, RuntimeConfig};
use anyhow::{Context as _, Result, anyhow};
use crossbeam_deque::Worker as CbWorker;
use crossbeam_utils::sync::WaitGroup;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Worker threads of a scheduler. Worker `i` owns lane `i`.
#[derive(Debug)]
pub(crate) struct ThreadPool {
    pub(crate) handles: Mutex<HashMap<ThreadId, thread::JoinHandle<()>>>,
}

impl ThreadPool {
    pub(crate) fn try_new(scheduler: &Handle) -> Result<Self> {
        Self::start(scheduler, spawn_worker_thread)
    }

    fn start<S>(scheduler: &Handle, mut spawn: S) -> Result<Self>
    where
        S: FnMut(&RuntimeConfig, Worker, WaitGroup) -> Result<thread::JoinHandle<()>>,
    {
        let num_workers = scheduler.cfg.worker_threads;

        // Create Crossbeam LIFO queues and their stealers
        let mut local_queues = Vec::with_capacity(num_workers);
        let mut stealers = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let w = CbWorker::new_lifo();
            stealers.push(w.stealer());
            local_queues.push(w);
        }

        let workers = local_queues
            .into_iter()
            .enumerate()
            .map(|(i, local_queue)| {
                // Give each worker a list of all *other* workers' stealers
                let other_stealers = stealers
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, s)| s.clone())
                    .collect::<Vec<_>>();

                Worker::new(i, Arc::clone(scheduler), local_queue, other_stealers)
            })
            .collect::<Vec<_>>();

        let started = WaitGroup::new();
        let mut handles = HashMap::with_capacity(num_workers);

        for worker in workers {
            match spawn(&scheduler.cfg, worker, started.clone()) {
                Ok(handle) => {
                    handles.insert(handle.thread().id(), handle);
                }
                Err(err) => {
                    started.wait();
                    let pool = Self {
                        handles: Mutex::new(handles),
                    };
                    pool.abort(scheduler);
                    return Err(err);
                }
            }
        }

        // Spawning threads is async, wait for all threads to be started...
        started.wait();

        Ok(Self {
            handles: Mutex::new(handles),
        })
    }

    /// Stops and joins the workers started so far.
    fn abort(&self, scheduler: &Handle) {
        scheduler
            .shared
            .shutdown
            .store(true, std::sync::atomic::Ordering::SeqCst);
        scheduler.shared.unpark_all_threads();

        if let Err(err) = self.join_all() {
            tracing::error!(%err, "worker failed while aborting pool startup");
        }
    }

    pub(crate) fn join_all(&self) -> Result<()> {
        let mut handles = self.handles.lock();

        let errors = handles
            .drain()
            .filter_map(|(thread_id, handle)| handle.join().err().map(|_| thread_id))
            .collect::<Vec<_>>();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} thread(s) panicked", errors.len()))
        }
    }
}

fn spawn_worker_thread(
    cfg: &RuntimeConfig,
    worker: Worker,
    started: WaitGroup,
) -> Result<thread::JoinHandle<()>> {
    let mut builder = thread::Builder::new().name(cfg.thread_name.0());

    if let Some(stack_size) = cfg.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }

    builder
        .spawn(move || {
            let worker = Rc::new(worker);
            init_worker_context(Rc::clone(&worker));
            drop(started);

            worker.run();
        })
        .context("failed to spawn worker thread")
}
