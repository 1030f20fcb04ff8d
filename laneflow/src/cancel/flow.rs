use crate::access::{AccessControlledValue, AccessKind, ValueAccess};
use crate::id::{ContextId, IdProvider};
use crate::instance::{Entity, Entry, InstanceId};
use crate::job::{JobHandle, Lane, Lanes};
use crate::runtime::Runtime;
use crate::stream::{DataStream, PendingWriter, StreamOpts};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress of one cancellation. The flag is raised by whoever keeps the
/// instance alive for another cycle, and lowered by the sweep.
#[derive(Debug, Default)]
pub struct CancelProgress {
    in_flight: AtomicBool,
}

impl CancelProgress {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn mark_in_flight(&self) {
        self.in_flight.store(true, Ordering::Release);
    }
}

pub(crate) type Lookup = HashMap<InstanceId, CancelProgress>;

/// Cancellation bookkeeping of one driver.
///
/// Requests are collected in their own stream, registered in the lookup once
/// per cycle, and swept at the end of it. Each drained instance leaves one
/// record in the completion stream, which holds the last cycle's completions.
#[derive(Clone)]
pub struct CancelFlow {
    context: ContextId,
    requests: DataStream<()>,
    lookup: AccessControlledValue<Lookup>,
    completions: DataStream<()>,
}

impl CancelFlow {
    pub fn new(context: ContextId, ids: &IdProvider, lanes: Lanes) -> Self {
        Self {
            context,
            requests: DataStream::new(context, ids.next_active_id(), lanes, StreamOpts::empty()),
            lookup: AccessControlledValue::new(HashMap::new()),
            completions: DataStream::new(
                context,
                ids.next_active_id(),
                lanes,
                StreamOpts::empty(),
            ),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Records a cancellation request for `entity`, picked up by the next
    /// cycle. Blocks while the request stream is being consolidated.
    #[track_caller]
    pub fn request(&self, lane: &Lane, entity: Entity) {
        self.requests
            .write_now(lane, [self.requests.new_entry(entity, ())]);
    }

    /// Request stream, for jobs appending requests with
    /// [`DataStream::schedule_append`].
    pub fn requests(&self) -> &DataStream<()> {
        &self.requests
    }

    pub fn completions(&self) -> &DataStream<()> {
        &self.completions
    }

    /// Consolidates the request stream, then adds a progress entry for every
    /// request not already known.
    pub fn schedule_register_requests(&self, rt: &Runtime, dependency: &JobHandle) -> JobHandle {
        let consolidated = self.requests.consolidate(rt, dependency);

        let (requests_wait, requests) = self.requests.acquire_live_reader();
        let (lookup_wait, mut lookup) = self.lookup.acquire_async(AccessKind::ExclusiveWrite);
        let context = self.context;

        let job = rt.schedule(
            &JobHandle::combine([&consolidated, &requests_wait, &lookup_wait]),
            move |_| {
                // Safety: both grants are released with this job.
                let (requests, lookup) = unsafe { (requests.as_slice(), lookup.get_mut()) };

                let before = lookup.len();
                for request in requests {
                    lookup.entry(request.id).or_default();
                }

                tracing::trace!(
                    %context,
                    requested = requests.len(),
                    registered = lookup.len() - before,
                    "cancel requests registered"
                );
            },
        );

        self.requests.release_live_reader(&job);
        self.lookup.release_async(&job);
        job
    }

    /// Grants what the per-type passes need: reading the lookup and appending
    /// completions.
    #[track_caller]
    pub(crate) fn acquire_view(&self) -> (JobHandle, CancelView) {
        let (lookup_wait, lookup) = self.lookup.acquire_async(AccessKind::SharedRead);
        let (completions_wait, completions) = self.completions.acquire_pending_writer();

        let view = CancelView {
            lookup,
            completions,
        };
        (JobHandle::combine([&lookup_wait, &completions_wait]), view)
    }

    #[track_caller]
    pub(crate) fn release_view(&self, handle: &JobHandle) {
        self.lookup.release_async(handle);
        self.completions.release_pending_writer(handle);
    }

    /// Drops every progress entry nobody kept in flight this cycle and lowers
    /// the flag on the others.
    pub fn schedule_sweep(&self, rt: &Runtime, dependency: &JobHandle) -> JobHandle {
        let context = self.context;
        self.lookup.schedule_write(rt, dependency, move |_, lookup| {
            let before = lookup.len();
            lookup.retain(|_, progress| mem::take(progress.in_flight.get_mut()));

            tracing::trace!(
                %context,
                swept = before - lookup.len(),
                in_flight = lookup.len(),
                "cancel lookup swept"
            );
        })
    }

    /// Makes this cycle's completions readable in the completion stream.
    pub fn consolidate_completions(&self, rt: &Runtime, dependency: &JobHandle) -> JobHandle {
        self.completions.consolidate(rt, dependency)
    }

    /// Instances whose cancellation completed during the last cycle.
    #[track_caller]
    pub fn completed(&self) -> Vec<InstanceId> {
        self.completions
            .live_snapshot()
            .into_iter()
            .map(|entry| entry.id)
            .collect()
    }

    /// Number of cancellations still tracked.
    #[track_caller]
    pub fn in_progress(&self) -> usize {
        self.lookup.read().len()
    }

    pub(crate) fn dispose(&self, dependency: &JobHandle) -> JobHandle {
        let requests = self.requests.dispose(dependency);
        let completions = self.completions.dispose(dependency);
        let lookup = self.lookup.controller().acquire_async(AccessKind::Disposal);
        let done = JobHandle::combine([&requests, &completions, &lookup, dependency]);
        self.lookup.release_async(&done);
        done
    }
}

impl fmt::Debug for CancelFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelFlow")
            .field("context", &self.context)
            .field("lookup", &self.lookup)
            .finish_non_exhaustive()
    }
}

/// What the update and cancel passes of a cycle see of the cancellations.
pub(crate) struct CancelView {
    lookup: ValueAccess<Lookup>,
    completions: PendingWriter<()>,
}

impl CancelView {
    /// # Safety
    ///
    /// Only valid while the grants taken by [`CancelFlow::acquire_view`] are
    /// held.
    pub(crate) unsafe fn progress(&self, id: &InstanceId) -> Option<&CancelProgress> {
        unsafe { self.lookup.get() }.get(id)
    }

    /// # Safety
    ///
    /// Same as [`CancelView::progress`].
    pub(crate) unsafe fn complete(&self, lane: &Lane, id: InstanceId) {
        unsafe { self.completions.push(lane, Entry::new(id, ())) }
    }
}
