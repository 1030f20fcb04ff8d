use crate::instance::{Entity, Entry};
use crate::job::{Fence, JobHandle, Lanes, Schedule};
use crate::runtime::{Builder, Runtime};
use anyhow::Result;
use std::sync::Arc;

pub(crate) fn init_runtime(worker_threads: usize) -> Result<Runtime> {
    Builder::new().worker_threads(worker_threads).try_build()
}

/// Handle that stays pending until the returned [`Trigger`] fires.
pub(crate) fn pending() -> (JobHandle, Trigger) {
    let fence = Fence::barrier();
    (JobHandle::from_fence(Arc::clone(&fence)), Trigger(Some(fence)))
}

pub(crate) struct Trigger(Option<Arc<Fence>>);

impl Trigger {
    pub(crate) fn fire(mut self) {
        self.fire_inner();
    }

    fn fire_inner(&mut self) {
        if let Some(fence) = self.0.take() {
            fence.arm();
        }
    }
}

// Never leave a test hanging on a trigger that was never fired.
impl Drop for Trigger {
    fn drop(&mut self) {
        self.fire_inner();
    }
}

/// Runs every job inline, on lane 0 of its own detached lanes.
pub(crate) struct InlineScheduler {
    pub(crate) lanes: Lanes,
}

impl InlineScheduler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            lanes: Lanes::detached(1),
        })
    }
}

impl Schedule for InlineScheduler {
    fn schedule(&self, job: Arc<Fence>) {
        job.run(self.lanes.lane(0));
    }
}

pub(crate) fn entity(index: u32) -> Entity {
    Entity::new(index, 1)
}

pub(crate) fn entities<T>(entries: &[Entry<T>]) -> Vec<u32> {
    entries.iter().map(|e| e.id.entity.index).collect()
}
