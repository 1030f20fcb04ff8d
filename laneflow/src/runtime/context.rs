use crate::job::Lane;
use crate::runtime::worker::Worker;
use std::cell::OnceCell;
use std::rc::Rc;
use std::thread_local;

thread_local! {
    static CONTEXT: OnceCell<Rc<Worker>> = const { OnceCell::new() };
}

#[track_caller]
pub(super) fn init_worker_context(worker: Rc<Worker>) {
    CONTEXT.with(|ctx| {
        if ctx.set(worker).is_err() {
            panic!("worker context already initialized on this thread");
        }
    });
}

/// Runs `f` with the worker owning the current thread, if any.
pub(crate) fn with_current_worker<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Rc<Worker>) -> R,
{
    CONTEXT.with(|ctx| ctx.get().map(f))
}

/// Lane of the current worker thread, `None` outside of the pool.
pub(crate) fn current_lane() -> Option<Lane> {
    with_current_worker(|w| w.lane())
}
