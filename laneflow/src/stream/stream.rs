use crate::access::{AccessController, AccessKind};
use crate::collections::{DeferredArray, LaneBuffer};
use crate::id::{ActiveId, ContextId};
use crate::instance::{Entity, Entry, InstanceId};
use crate::job::{JobContext, JobHandle, Lane, Lanes};
use crate::runtime::Runtime;
use crate::stream::{Appender, LiveReader, PendingWriter};
use bitflags::bitflags;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StreamOpts: u8 {
        /// Records of this stream can be cancelled. Resolving into it from the
        /// same context keeps a cancellation in flight.
        const CANCELLABLE = 1 << 0;
    }
}

pub(crate) struct Inner<T> {
    pub(crate) context: ContextId,
    pub(crate) active_id: ActiveId,
    pub(crate) opts: StreamOpts,
    pub(crate) controller: AccessController,
    pub(crate) pending: LaneBuffer<Entry<T>>,
    pub(crate) live: DeferredArray<Entry<T>>,
}

/// Per-type record stream owned by one context.
///
/// Cloning shares the stream.
pub struct DataStream<T> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T> Clone for DataStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> DataStream<T> {
    pub fn new(context: ContextId, active_id: ActiveId, lanes: Lanes, opts: StreamOpts) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                active_id,
                opts,
                controller: AccessController::new(),
                pending: LaneBuffer::new(lanes),
                live: DeferredArray::new(),
            }),
        }
    }

    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    pub fn active_id(&self) -> ActiveId {
        self.inner.active_id
    }

    pub fn opts(&self) -> StreamOpts {
        self.inner.opts
    }

    pub fn is_cancellable(&self) -> bool {
        self.inner.opts.contains(StreamOpts::CANCELLABLE)
    }

    pub fn lanes(&self) -> Lanes {
        self.inner.pending.lanes()
    }

    pub fn controller(&self) -> &AccessController {
        &self.inner.controller
    }

    /// Record for `entity`, owned by this stream.
    pub fn new_entry(&self, entity: Entity, payload: T) -> Entry<T> {
        Entry::new(
            InstanceId::new(entity, self.inner.context, self.inner.active_id),
            payload,
        )
    }

    /// Shared-write grant on the pending buffer.
    #[track_caller]
    pub fn acquire_pending_writer(&self) -> (JobHandle, PendingWriter<T>) {
        let wait = self.inner.controller.acquire_async(AccessKind::SharedWrite);
        (wait, PendingWriter::new(Arc::clone(&self.inner)))
    }

    /// Appends a record coming from another stream, re-scoping its id to this
    /// one.
    ///
    /// # Safety
    ///
    /// The caller holds a shared-write grant on this stream.
    #[track_caller]
    pub(crate) unsafe fn push_routed(&self, lane: &Lane, id: InstanceId, payload: T) {
        let id = id.with_target(self.inner.context, self.inner.active_id);
        unsafe { self.inner.pending.push(lane, Entry::new(id, payload)) }
    }

    #[track_caller]
    pub fn release_pending_writer(&self, handle: &JobHandle) {
        self.inner.controller.release_async(handle);
    }

    /// Shared-read grant on the live array.
    #[track_caller]
    pub fn acquire_live_reader(&self) -> (JobHandle, LiveReader<T>) {
        let wait = self.inner.controller.acquire_async(AccessKind::SharedRead);
        (wait, LiveReader::new(Arc::clone(&self.inner)))
    }

    #[track_caller]
    pub fn release_live_reader(&self, handle: &JobHandle) {
        self.inner.controller.release_async(handle);
    }

    /// Schedules the pending→live move: live is cleared, then refilled with
    /// every pending record, lane by lane. Runs even if nothing is pending.
    #[track_caller]
    pub fn consolidate(&self, rt: &Runtime, dependency: &JobHandle) -> JobHandle {
        let wait = self
            .inner
            .controller
            .acquire_async(AccessKind::ExclusiveWrite);
        let inner = Arc::clone(&self.inner);

        let job = rt.schedule(&JobHandle::combine([dependency, &wait]), move |_| {
            // Safety: exclusive grant, released with this job.
            let live = unsafe { inner.live.as_mut_vec() };
            live.clear();
            let moved = unsafe { inner.pending.drain_into(live) };

            tracing::trace!(
                stream = type_name::<T>(),
                context = %inner.context,
                active_id = %inner.active_id,
                moved,
                "consolidated"
            );
        });

        self.inner.controller.release_async(&job);
        job
    }

    /// Schedules `f` with an [`Appender`] on the executing worker's lane.
    #[track_caller]
    pub fn schedule_append<F>(&self, rt: &Runtime, dependency: &JobHandle, f: F) -> JobHandle
    where
        F: FnOnce(&JobContext, &Appender<'_, T>) + Send + 'static,
    {
        let (wait, writer) = self.acquire_pending_writer();

        let job = rt.schedule(&JobHandle::combine([dependency, &wait]), move |ctx| {
            // Safety: shared-write grant, released with this job.
            let appender = unsafe { Appender::new(&writer, ctx.lane()) };
            f(ctx, &appender)
        });

        self.release_pending_writer(&job);
        job
    }

    /// Schedules `f` with the live records.
    #[track_caller]
    pub fn schedule_read<F>(&self, rt: &Runtime, dependency: &JobHandle, f: F) -> JobHandle
    where
        F: FnOnce(&JobContext, &[Entry<T>]) + Send + 'static,
    {
        let (wait, reader) = self.acquire_live_reader();

        let job = rt.schedule(&JobHandle::combine([dependency, &wait]), move |ctx| {
            // Safety: shared-read grant, released with this job.
            f(ctx, unsafe { reader.as_slice() })
        });

        self.release_live_reader(&job);
        job
    }

    /// Appends `entries` to `lane` from the calling thread, blocking until
    /// shared writes are allowed.
    #[track_caller]
    pub fn write_now<I>(&self, lane: &Lane, entries: I)
    where
        I: IntoIterator<Item = Entry<T>>,
    {
        let _guard = self
            .inner
            .controller
            .acquire_scoped(AccessKind::SharedWrite);

        // Safety: shared-write grant held by `_guard`.
        unsafe { self.inner.pending.extend(lane, entries) };
    }

    /// Copy of the live records, blocking until no write is scheduled ahead.
    #[track_caller]
    pub fn live_snapshot(&self) -> Vec<Entry<T>>
    where
        T: Clone,
    {
        let _guard = self
            .inner
            .controller
            .acquire_scoped(AccessKind::SharedRead);

        // Safety: shared-read grant held by `_guard`.
        unsafe { self.inner.live.as_slice() }.to_vec()
    }

    /// Number of live records, blocking like [`DataStream::live_snapshot`].
    #[track_caller]
    pub fn live_len(&self) -> usize {
        let _guard = self
            .inner
            .controller
            .acquire_scoped(AccessKind::SharedRead);

        // Safety: shared-read grant held by `_guard`.
        unsafe { self.inner.live.as_slice() }.len()
    }

    /// Number of records waiting for the next consolidation. Blocks until
    /// every scheduled access completed.
    #[track_caller]
    pub fn pending_len(&self) -> usize {
        let _guard = self
            .inner
            .controller
            .acquire_scoped(AccessKind::ExclusiveWrite);

        // Safety: exclusive grant held by `_guard`.
        unsafe { self.inner.pending.len() }
    }

    /// Rewrites the entity of every pending and live record found in
    /// `remap`. Used when the host database moves entities around.
    #[track_caller]
    pub fn schedule_remap(
        &self,
        rt: &Runtime,
        dependency: &JobHandle,
        remap: Arc<HashMap<Entity, Entity>>,
    ) -> JobHandle {
        let wait = self
            .inner
            .controller
            .acquire_async(AccessKind::ExclusiveWrite);
        let inner = Arc::clone(&self.inner);

        let job = rt.schedule(&JobHandle::combine([dependency, &wait]), move |_| {
            let patch = |entry: &mut Entry<T>| {
                if let Some(to) = remap.get(&entry.id.entity) {
                    entry.id.entity = *to;
                }
            };

            // Safety: exclusive grant, released with this job.
            unsafe {
                inner.pending.for_each_mut(patch);
                inner.live.as_mut_vec().iter_mut().for_each(patch);
            }
        });

        self.inner.controller.release_async(&job);
        job
    }

    /// Last access to the stream. Returns once everything scheduled on it so
    /// far completed, `dependency` included.
    #[track_caller]
    pub fn dispose(&self, dependency: &JobHandle) -> JobHandle {
        let wait = self.inner.controller.acquire_async(AccessKind::Disposal);
        let done = JobHandle::combine([dependency, &wait]);
        self.inner.controller.release_async(&done);
        done
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.controller.is_disposed()
    }
}

impl<T> fmt::Debug for DataStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream")
            .field("type", &type_name::<T>())
            .field("context", &self.inner.context)
            .field("active_id", &self.inner.active_id)
            .field("opts", &self.inner.opts)
            .field("controller", &self.inner.controller)
            .finish()
    }
}

/// Type-erased view a driver keeps of each stream it owns.
pub(crate) trait Consolidate: Send + Sync {
    fn consolidate(&self, rt: &Runtime, dependency: &JobHandle) -> JobHandle;

    fn dispose(&self, dependency: &JobHandle) -> JobHandle;

    fn type_name(&self) -> &'static str;
}

impl<T: Send + Sync + 'static> Consolidate for DataStream<T> {
    fn consolidate(&self, rt: &Runtime, dependency: &JobHandle) -> JobHandle {
        DataStream::consolidate(self, rt, dependency)
    }

    fn dispose(&self, dependency: &JobHandle) -> JobHandle {
        DataStream::dispose(self, dependency)
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}
