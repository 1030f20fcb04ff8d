use crate::cancel::CancelFlow;
use crate::driver::driver::{Inner, TaskDriver};
use crate::driver::job::{
    CancelContext, CancelFn, CancelPass, CyclePass, UpdateContext, UpdateFn, UpdateJob,
};
use crate::errors::ConfigError;
use crate::id::{ContextId, IdProvider};
use crate::job::Lanes;
use crate::resolve::{ResolveTargetTable, ResolveTargets};
use crate::stream::{Consolidate, DataStream, StreamOpts};
use std::any::{TypeId, type_name};
use std::collections::HashSet;
use std::sync::Arc;

/// Configures a [`TaskDriver`]: its streams, and the job updating each of
/// them.
pub struct TaskDriverBuilder {
    name: String,
    context: ContextId,
    ids: Arc<IdProvider>,
    lanes: Lanes,
    routes: Arc<ResolveTargetTable>,
    streams: Vec<Arc<dyn Consolidate>>,
    passes: Vec<Box<dyn CyclePass>>,
    updated: HashSet<TypeId>,
    cancellable: Vec<(TypeId, &'static str)>,
}

impl TaskDriverBuilder {
    pub(crate) fn new(
        name: String,
        ids: Arc<IdProvider>,
        lanes: Lanes,
        routes: Arc<ResolveTargetTable>,
    ) -> Self {
        Self {
            name,
            context: ids.next_context_id(),
            ids,
            lanes,
            routes,
            streams: Vec::new(),
            passes: Vec::new(),
            updated: HashSet::new(),
            cancellable: Vec::new(),
        }
    }

    /// Context minted for the driver being built. Every stream it owns, and
    /// every record in them, is scoped to it.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Creates a stream of `T` owned by this driver and registers it as the
    /// resolve target for `T` in this context.
    pub fn stream<T: Send + Sync + 'static>(
        &mut self,
        opts: StreamOpts,
    ) -> Result<DataStream<T>, ConfigError> {
        let stream = DataStream::new(self.context, self.ids.next_active_id(), self.lanes, opts);
        self.routes.register(&stream)?;
        self.streams.push(Arc::new(stream.clone()));
        if stream.is_cancellable() {
            self.cancellable.push((TypeId::of::<T>(), type_name::<T>()));
        }

        tracing::trace!(
            driver = %self.name,
            stream = type_name::<T>(),
            active_id = %stream.active_id(),
            "stream registered"
        );
        Ok(stream)
    }

    /// Starts configuring the job updating `stream` every cycle.
    pub fn update<T: Send + Sync + 'static>(
        &mut self,
        stream: &DataStream<T>,
    ) -> UpdateJobBuilder<'_, T> {
        UpdateJobBuilder {
            driver: self,
            stream: stream.clone(),
            targets: ResolveTargets::new(),
            on_update: None,
            on_cancel: None,
        }
    }

    /// Fails if a cancellable stream has no update job: nothing would read
    /// the cancellations handed over to it.
    pub fn build(self) -> Result<TaskDriver, ConfigError> {
        if let Some((_, type_name)) = self
            .cancellable
            .iter()
            .find(|(type_id, _)| !self.updated.contains(type_id))
        {
            return Err(ConfigError::MissingUpdateJob {
                type_name,
                driver: self.context,
            });
        }

        tracing::debug!(
            driver = %self.name,
            context = %self.context,
            streams = self.streams.len(),
            passes = self.passes.len(),
            "driver built"
        );

        let cancel = CancelFlow::new(self.context, &self.ids, self.lanes);
        Ok(TaskDriver::new(Inner {
            name: self.name,
            context: self.context,
            streams: self.streams,
            passes: self.passes,
            cancel,
        }))
    }
}

pub struct UpdateJobBuilder<'a, T> {
    driver: &'a mut TaskDriverBuilder,
    stream: DataStream<T>,
    targets: ResolveTargets,
    on_update: Option<Arc<UpdateFn<T>>>,
    on_cancel: Option<Arc<CancelFn<T>>>,
}

impl<T: Send + Sync + 'static> UpdateJobBuilder<'_, T> {
    /// Declares that the job resolves records of type `R` into `context`.
    pub fn resolves<R: Send + Sync + 'static>(
        mut self,
        context: ContextId,
    ) -> Result<Self, ConfigError> {
        self.targets.declare::<R>(&self.driver.routes, context)?;
        Ok(self)
    }

    /// Continuation run on every live record not being cancelled. Without
    /// one, records are dropped after a cycle.
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&UpdateContext<'_, T>, &T) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(f));
        self
    }

    /// Continuation run on records being cancelled. Without one, they
    /// complete right away.
    pub fn on_cancel<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut CancelContext<'_, T>, &T) + Send + Sync + 'static,
    {
        self.on_cancel = Some(Arc::new(f));
        self
    }

    pub fn add(self) -> Result<(), ConfigError> {
        let driver = self.driver;
        let stream = self.stream;

        if stream.context() != driver.context {
            return Err(ConfigError::ForeignStream {
                owner: stream.context(),
                driver: driver.context,
            });
        }
        if driver.updated.contains(&TypeId::of::<T>()) {
            return Err(ConfigError::DuplicateUpdateJob {
                type_name: type_name::<T>(),
                driver: driver.context,
            });
        }
        if self.on_cancel.is_some() && !stream.is_cancellable() {
            return Err(ConfigError::NotCancellable {
                type_name: type_name::<T>(),
            });
        }

        let cancel = stream.is_cancellable().then(|| {
            let pending = DataStream::new(
                driver.context,
                driver.ids.next_active_id(),
                driver.lanes,
                StreamOpts::CANCELLABLE,
            );
            driver.streams.push(Arc::new(pending.clone()));

            CancelPass {
                pending,
                on_cancel: self
                    .on_cancel
                    .unwrap_or_else(|| Arc::new(complete_cancel::<T>)),
            }
        });

        tracing::trace!(
            driver = %driver.name,
            stream = type_name::<T>(),
            targets = self.targets.len(),
            cancellable = cancel.is_some(),
            "update job added"
        );

        driver.updated.insert(TypeId::of::<T>());
        driver.passes.push(Box::new(UpdateJob {
            stream,
            targets: Arc::new(self.targets),
            on_update: self.on_update.unwrap_or_else(|| Arc::new(drop_record::<T>)),
            cancel,
        }));
        Ok(())
    }
}

fn drop_record<T>(_: &UpdateContext<'_, T>, _: &T) {}

fn complete_cancel<T>(cx: &mut CancelContext<'_, T>, _: &T) {
    cx.complete();
}
