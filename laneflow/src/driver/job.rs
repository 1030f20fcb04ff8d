use crate::cancel::{CancelFlow, CancelProgress, CancelView};
use crate::id::ContextId;
use crate::instance::{Entity, Entry, InstanceId};
use crate::job::{JobHandle, Lane};
use crate::resolve::{ResolveTargets, Resolved};
use crate::runtime::Runtime;
use crate::stream::{DataStream, PendingWriter};
use std::any::type_name;
use std::sync::Arc;

pub(crate) type UpdateFn<T> = dyn Fn(&UpdateContext<'_, T>, &T) + Send + Sync;
pub(crate) type CancelFn<T> = dyn Fn(&mut CancelContext<'_, T>, &T) + Send + Sync;

/// What an update continuation can do with the record it was handed.
///
/// Records neither continued nor resolved are dropped.
pub struct UpdateContext<'a, T> {
    lane: Lane,
    id: InstanceId,
    own: &'a PendingWriter<T>,
    targets: &'a ResolveTargets,
}

impl<T> UpdateContext<'_, T> {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn entity(&self) -> Entity {
        self.id.entity
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Keeps the instance in this stream for the next cycle.
    pub fn continue_with(&self, payload: T) {
        // Safety: the update pass holds the shared-write grant on its own
        // stream while continuations run.
        unsafe { self.own.push(&self.lane, Entry::new(self.id, payload)) }
    }

    /// Routes `payload` to the first declared target of type `R`.
    pub fn resolve<R: Send + Sync + 'static>(&self, payload: R) -> Option<Resolved> {
        // Safety: the update pass holds the grants of every declared target.
        unsafe { self.targets.resolve(&self.lane, None, self.id, payload) }
    }

    /// Routes `payload` to the declared target of type `R` owned by `context`.
    pub fn resolve_to<R: Send + Sync + 'static>(
        &self,
        context: ContextId,
        payload: R,
    ) -> Option<Resolved> {
        // Safety: see `UpdateContext::resolve`.
        unsafe { self.targets.resolve(&self.lane, Some(context), self.id, payload) }
    }
}

/// What a cancel continuation can do with an instance being cancelled.
///
/// Unless the continuation keeps it in flight, the instance completes when
/// the continuation returns.
pub struct CancelContext<'a, T> {
    lane: Lane,
    id: InstanceId,
    pending_cancel: &'a PendingWriter<T>,
    targets: &'a ResolveTargets,
    in_flight: bool,
}

impl<T> CancelContext<'_, T> {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn entity(&self) -> Entity {
        self.id.entity
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Runs the cancel continuation again on `payload` next cycle.
    pub fn continue_cancelling(&mut self, payload: T) {
        // Safety: the pass holds the shared-write grant on the pending-cancel
        // stream while continuations run.
        unsafe {
            self.pending_cancel
                .push(&self.lane, Entry::new(self.id, payload))
        };
        self.in_flight = true;
    }

    /// Routes `payload` like [`UpdateContext::resolve`]. The cancellation
    /// stays in flight if the target is a cancellable stream of this context.
    pub fn resolve<R: Send + Sync + 'static>(&mut self, payload: R) -> Option<Resolved> {
        // Safety: the pass holds the grants of every declared target.
        let resolved = unsafe { self.targets.resolve(&self.lane, None, self.id, payload) };
        self.track(resolved)
    }

    pub fn resolve_to<R: Send + Sync + 'static>(
        &mut self,
        context: ContextId,
        payload: R,
    ) -> Option<Resolved> {
        // Safety: see `CancelContext::resolve`.
        let resolved =
            unsafe { self.targets.resolve(&self.lane, Some(context), self.id, payload) };
        self.track(resolved)
    }

    /// Drains the instance. Same as returning without keeping it in flight.
    #[track_caller]
    pub fn complete(&mut self) {
        debug_assert!(
            !self.in_flight,
            "instance {} completed after being kept in flight",
            self.id
        );
    }

    fn track(&mut self, resolved: Option<Resolved>) -> Option<Resolved> {
        if let Some(r) = resolved
            && r.cancellable
            && r.context == self.id.context
        {
            self.in_flight = true;
        }
        resolved
    }
}

pub(crate) struct CancelPass<T> {
    pub(crate) pending: DataStream<T>,
    pub(crate) on_cancel: Arc<CancelFn<T>>,
}

/// Update job of one stream type, and its cancel job when the stream is
/// cancellable.
pub(crate) struct UpdateJob<T> {
    pub(crate) stream: DataStream<T>,
    pub(crate) targets: Arc<ResolveTargets>,
    pub(crate) on_update: Arc<UpdateFn<T>>,
    pub(crate) cancel: Option<CancelPass<T>>,
}

/// Type-erased view the driver schedules every cycle.
pub(crate) trait CyclePass: Send + Sync {
    fn schedule(&self, rt: &Runtime, dependency: &JobHandle, cancel: &CancelFlow) -> JobHandle;

    fn type_name(&self) -> &'static str;
}

impl<T: Send + Sync + 'static> CyclePass for UpdateJob<T> {
    fn schedule(&self, rt: &Runtime, dependency: &JobHandle, cancel: &CancelFlow) -> JobHandle {
        let update = self.schedule_update(rt, dependency, cancel);
        match &self.cancel {
            Some(pass) => {
                let cancelled = self.schedule_cancel(rt, dependency, cancel, pass);
                JobHandle::combine([&update, &cancelled])
            }
            None => update,
        }
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl<T: Send + Sync + 'static> UpdateJob<T> {
    /// Every live record goes through the update continuation, except the
    /// ones being cancelled which go through the cancel continuation.
    fn schedule_update(
        &self,
        rt: &Runtime,
        dependency: &JobHandle,
        cancel: &CancelFlow,
    ) -> JobHandle {
        let (live_wait, live) = self.stream.acquire_live_reader();
        let (own_wait, own) = self.stream.acquire_pending_writer();
        let targets_wait = self.targets.acquire_all();
        let (view_wait, view) = cancel.acquire_view();
        let pending_cancel = self
            .cancel
            .as_ref()
            .map(|pass| pass.pending.acquire_pending_writer());

        let mut waits = vec![dependency, &live_wait, &own_wait, &targets_wait, &view_wait];
        if let Some((wait, _)) = &pending_cancel {
            waits.push(wait);
        }
        let wait = JobHandle::combine(waits);

        let targets = Arc::clone(&self.targets);
        let on_update = Arc::clone(&self.on_update);
        let on_cancel = self.cancel.as_ref().map(|pass| Arc::clone(&pass.on_cancel));
        let pending_cancel = pending_cancel.map(|(_, writer)| writer);

        let job = rt.schedule(&wait, move |ctx| {
            let lane = ctx.lane();
            // Safety: every grant is released with this job.
            let records = unsafe { live.as_slice() };

            for Entry { id, payload } in records {
                let cancelling = match (&pending_cancel, &on_cancel) {
                    (Some(writer), Some(on_cancel)) => {
                        // Safety: as above.
                        unsafe { view.progress(id) }.map(|progress| (writer, on_cancel, progress))
                    }
                    _ => None,
                };

                match cancelling {
                    Some((writer, on_cancel, progress)) => {
                        let mut cx = CancelContext {
                            lane,
                            id: *id,
                            pending_cancel: writer,
                            targets: &targets,
                            in_flight: false,
                        };
                        on_cancel(&mut cx, payload);
                        // Safety: as above.
                        unsafe { settle(&cx, progress, &view) };
                    }
                    None => {
                        let cx = UpdateContext {
                            lane,
                            id: *id,
                            own: &own,
                            targets: &targets,
                        };
                        on_update(&cx, payload);
                    }
                }
            }

            tracing::trace!(
                stream = type_name::<T>(),
                lane = lane.index(),
                records = records.len(),
                "update pass"
            );
        });

        self.stream.release_live_reader(&job);
        self.stream.release_pending_writer(&job);
        self.targets.release_all(&job);
        cancel.release_view(&job);
        if let Some(pass) = &self.cancel {
            pass.pending.release_pending_writer(&job);
        }
        job
    }

    /// Instances kept in flight last cycle go through the cancel continuation
    /// again.
    fn schedule_cancel(
        &self,
        rt: &Runtime,
        dependency: &JobHandle,
        cancel: &CancelFlow,
        pass: &CancelPass<T>,
    ) -> JobHandle {
        let (live_wait, live) = pass.pending.acquire_live_reader();
        let (pending_wait, pending) = pass.pending.acquire_pending_writer();
        let targets_wait = self.targets.acquire_all();
        let (view_wait, view) = cancel.acquire_view();

        let wait = JobHandle::combine([
            dependency,
            &live_wait,
            &pending_wait,
            &targets_wait,
            &view_wait,
        ]);

        let targets = Arc::clone(&self.targets);
        let on_cancel = Arc::clone(&pass.on_cancel);

        let job = rt.schedule(&wait, move |ctx| {
            let lane = ctx.lane();
            // Safety: every grant is released with this job.
            let records = unsafe { live.as_slice() };

            for Entry { id, payload } in records {
                let mut cx = CancelContext {
                    lane,
                    id: *id,
                    pending_cancel: &pending,
                    targets: &targets,
                    in_flight: false,
                };
                on_cancel(&mut cx, payload);

                // Safety: as above.
                unsafe {
                    match view.progress(id) {
                        Some(progress) => settle(&cx, progress, &view),
                        None if !cx.in_flight => view.complete(&lane, *id),
                        None => {}
                    }
                }
            }

            tracing::trace!(
                stream = type_name::<T>(),
                lane = lane.index(),
                records = records.len(),
                "cancel pass"
            );
        });

        pass.pending.release_live_reader(&job);
        pass.pending.release_pending_writer(&job);
        self.targets.release_all(&job);
        cancel.release_view(&job);
        job
    }
}

/// Keeps the cancellation alive or records its completion.
///
/// # Safety
///
/// Same as [`CancelView::complete`].
unsafe fn settle<T>(cx: &CancelContext<'_, T>, progress: &CancelProgress, view: &CancelView) {
    if cx.in_flight {
        progress.mark_in_flight();
    } else {
        unsafe { view.complete(&cx.lane, cx.id) }
    }
}
