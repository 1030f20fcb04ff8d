use crate::driver::{TaskDriver, TaskDriverBuilder};
use crate::id::IdProvider;
use crate::job::{JobHandle, Lanes};
use crate::resolve::ResolveTargetTable;
use crate::runtime::Runtime;
use std::sync::Arc;

/// Every driver of a session, and the routing table they share.
#[derive(Debug)]
pub struct TaskSystem {
    ids: Arc<IdProvider>,
    lanes: Lanes,
    routes: Arc<ResolveTargetTable>,
    drivers: Vec<TaskDriver>,
}

impl TaskSystem {
    pub fn new(rt: &Runtime) -> Self {
        Self {
            ids: Arc::clone(rt.ids()),
            lanes: rt.lanes(),
            routes: Arc::new(ResolveTargetTable::new()),
            drivers: Vec::new(),
        }
    }

    pub fn routes(&self) -> &ResolveTargetTable {
        &self.routes
    }

    /// Starts configuring a driver. Builders are independent: streams of one
    /// can be declared as resolve targets by jobs of another before either is
    /// built.
    pub fn driver(&self, name: impl Into<String>) -> TaskDriverBuilder {
        TaskDriverBuilder::new(
            name.into(),
            Arc::clone(&self.ids),
            self.lanes,
            Arc::clone(&self.routes),
        )
    }

    /// Adds `driver` to the ones scheduled every cycle, in insertion order.
    pub fn add(&mut self, driver: TaskDriver) -> TaskDriver {
        self.drivers.push(driver.clone());
        driver
    }

    pub fn drivers(&self) -> &[TaskDriver] {
        &self.drivers
    }

    /// Schedules one cycle of every driver.
    pub fn schedule_update(&self, rt: &Runtime, dependency: &JobHandle) -> JobHandle {
        let cycles = self
            .drivers
            .iter()
            .map(|driver| driver.schedule_cycle(rt, dependency))
            .collect::<Vec<_>>();

        JobHandle::combine(&cycles)
    }

    /// Runs one cycle of every driver to completion.
    ///
    /// # Panics
    ///
    /// If a job of the cycle panicked.
    #[track_caller]
    pub fn update(&self, rt: &Runtime) {
        self.schedule_update(rt, &JobHandle::completed()).complete();
    }

    pub fn dispose(&self, dependency: &JobHandle) -> JobHandle {
        let disposed = self
            .drivers
            .iter()
            .map(|driver| driver.dispose(dependency))
            .collect::<Vec<_>>();

        JobHandle::combine(&disposed)
    }
}
