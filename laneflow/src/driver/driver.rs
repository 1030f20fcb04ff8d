use crate::cancel::CancelFlow;
use crate::driver::job::CyclePass;
use crate::id::ContextId;
use crate::instance::{Entity, InstanceId};
use crate::job::{JobHandle, Lane};
use crate::runtime::Runtime;
use crate::stream::{Consolidate, DataStream};
use std::fmt;
use std::sync::Arc;

pub(crate) struct Inner {
    pub(crate) name: String,
    pub(crate) context: ContextId,
    pub(crate) streams: Vec<Arc<dyn Consolidate>>,
    pub(crate) passes: Vec<Box<dyn CyclePass>>,
    pub(crate) cancel: CancelFlow,
}

/// Owns a set of streams and the jobs updating them, and schedules them
/// once per cycle.
///
/// Cloning shares the driver.
#[derive(Clone)]
pub struct TaskDriver {
    inner: Arc<Inner>,
}

impl TaskDriver {
    pub(crate) fn new(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    /// Asks for the instance of `entity` in this driver to be cancelled,
    /// starting next cycle.
    #[track_caller]
    pub fn request_cancel(&self, lane: &Lane, entity: Entity) {
        self.inner.cancel.request(lane, entity);
    }

    /// Schedules one cycle:
    ///
    /// 1. cancel requests are registered,
    /// 2. every stream is consolidated,
    /// 3. update and cancel passes run over the live records,
    /// 4. finished cancellations are swept and their completions published.
    pub fn schedule_cycle(&self, rt: &Runtime, dependency: &JobHandle) -> JobHandle {
        let cancel = &self.inner.cancel;

        let registered = cancel.schedule_register_requests(rt, dependency);
        let consolidated = self
            .inner
            .streams
            .iter()
            .map(|stream| stream.consolidate(rt, dependency))
            .collect::<Vec<_>>();

        let ready = JobHandle::combine(consolidated.iter().chain([&registered]));
        let passes = self
            .inner
            .passes
            .iter()
            .map(|pass| pass.schedule(rt, &ready, cancel))
            .collect::<Vec<_>>();

        let swept = cancel.schedule_sweep(rt, &JobHandle::combine(&passes));
        let done = cancel.consolidate_completions(rt, &swept);

        tracing::debug!(
            driver = %self.inner.name,
            context = %self.inner.context,
            streams = self.inner.streams.len(),
            passes = passes.len(),
            "cycle scheduled"
        );

        done
    }

    /// Instances whose cancellation completed during the last cycle. Blocks
    /// until that cycle completed.
    #[track_caller]
    pub fn cancel_completions(&self) -> Vec<InstanceId> {
        self.inner.cancel.completed()
    }

    pub fn completion_stream(&self) -> &DataStream<()> {
        self.inner.cancel.completions()
    }

    /// Cancellations registered but not completed yet.
    #[track_caller]
    pub fn pending_cancellations(&self) -> usize {
        self.inner.cancel.in_progress()
    }

    /// Last access to every stream of the driver.
    pub fn dispose(&self, dependency: &JobHandle) -> JobHandle {
        let cancelled = self.inner.cancel.dispose(dependency);
        let disposed = self
            .inner
            .streams
            .iter()
            .map(|stream| stream.dispose(dependency))
            .collect::<Vec<_>>();

        JobHandle::combine(disposed.iter().chain([&cancelled]))
    }
}

impl fmt::Debug for TaskDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDriver")
            .field("name", &self.inner.name)
            .field("context", &self.inner.context)
            .field(
                "streams",
                &self
                    .inner
                    .streams
                    .iter()
                    .map(|s| s.type_name())
                    .collect::<Vec<_>>(),
            )
            .field(
                "passes",
                &self
                    .inner
                    .passes
                    .iter()
                    .map(|p| p.type_name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
