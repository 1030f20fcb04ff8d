use crate::access::AccessKind;
use crate::errors::ConfigError;
use crate::id::{ActiveId, ContextId};
use crate::instance::InstanceId;
use crate::job::{JobHandle, Lane};
use crate::resolve::table::{ResolveKey, ResolveTargetTable, RouteTarget};
use crate::stream::DataStream;
use smallvec::SmallVec;
use std::any::type_name;
use std::fmt;
use std::sync::Arc;

struct Slot {
    key: ResolveKey,
    target: Arc<dyn RouteTarget>,
}

/// Where a resolved record ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub context: ContextId,
    pub active_id: ActiveId,
    pub cancellable: bool,
}

/// The resolve targets one job declared, looked up once at configuration
/// time.
#[derive(Default)]
pub struct ResolveTargets {
    slots: SmallVec<[Slot; 2]>,
}

impl ResolveTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the target for records of type `R` owned by `context`.
    /// Declaring the same target twice is a no-op.
    pub fn declare<R: Send + Sync + 'static>(
        &mut self,
        table: &ResolveTargetTable,
        context: ContextId,
    ) -> Result<(), ConfigError> {
        let key = ResolveKey::of::<R>(context);
        if self.slots.iter().any(|s| s.key == key) {
            return Ok(());
        }

        let target = table.get::<R>(context)?;
        self.slots.push(Slot { key, target });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Shared-write grant on every target's pending buffer.
    #[track_caller]
    pub fn acquire_all(&self) -> JobHandle {
        let waits = self
            .slots
            .iter()
            .map(|s| s.target.controller().acquire_async(AccessKind::SharedWrite))
            .collect::<SmallVec<[JobHandle; 2]>>();

        JobHandle::combine(&waits)
    }

    #[track_caller]
    pub fn release_all(&self, handle: &JobHandle) {
        for slot in &self.slots {
            slot.target.controller().release_async(handle);
        }
    }

    /// Appends `payload` for `id` to the declared target of type `R`, owned
    /// by `context` or, when `None`, the first one declared for `R`.
    ///
    /// Returns `None` if no such target was declared, in which case the record
    /// is dropped.
    ///
    /// # Safety
    ///
    /// Only valid between the completion of [`ResolveTargets::acquire_all`]'s
    /// handle and the completion of the one passed to
    /// [`ResolveTargets::release_all`].
    pub unsafe fn resolve<R: Send + Sync + 'static>(
        &self,
        lane: &Lane,
        context: Option<ContextId>,
        id: InstanceId,
        payload: R,
    ) -> Option<Resolved> {
        let found = self.slots.iter().find_map(|slot| {
            let stream = slot.target.as_any().downcast_ref::<DataStream<R>>()?;
            match context {
                Some(ctx) if ctx != slot.key.context => None,
                _ => Some(stream),
            }
        });

        let Some(stream) = found else {
            debug_assert!(
                false,
                "resolving `{}` to an undeclared target",
                type_name::<R>()
            );
            return None;
        };

        // Safety: forwarded to the caller, the grant is held through `acquire_all`.
        unsafe { stream.push_routed(lane, id, payload) };

        Some(Resolved {
            context: stream.context(),
            active_id: stream.active_id(),
            cancellable: stream.is_cancellable(),
        })
    }
}

impl fmt::Debug for ResolveTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.slots
                    .iter()
                    .map(|s| (s.target.type_name(), s.key.context)),
            )
            .finish()
    }
}
