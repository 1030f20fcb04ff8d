//! Narrow interface to the host entity database.
//!
//! Queries run as jobs: their result is a [`DeferredArray`] whose contents
//! exist only once the job filling it completed.

use crate::collections::DeferredArray;
use crate::instance::Entity;
use crate::job::JobHandle;
use crate::runtime::Runtime;
use std::any::type_name;
use std::sync::Arc;

/// Collects the entities matching a query.
pub trait EntitySource: Send + Sync + 'static {
    fn collect(&self, out: &mut Vec<Entity>);
}

impl<F> EntitySource for F
where
    F: Fn(&mut Vec<Entity>) + Send + Sync + 'static,
{
    fn collect(&self, out: &mut Vec<Entity>) {
        self(out)
    }
}

/// Schedules `source` into a new array. Readers scheduled on the array run
/// after the returned handle.
pub fn materialize<S: EntitySource>(
    rt: &Runtime,
    source: Arc<S>,
    dependency: &JobHandle,
) -> (JobHandle, DeferredArray<Entity>) {
    let array = DeferredArray::new();
    let filled = materialize_into(rt, source, &array, dependency);
    (filled, array)
}

/// Schedules `source` to replace the contents of `array`, once every reader
/// scheduled on it so far completed.
pub fn materialize_into<S: EntitySource>(
    rt: &Runtime,
    source: Arc<S>,
    array: &DeferredArray<Entity>,
    dependency: &JobHandle,
) -> JobHandle {
    array.schedule_fill(rt, dependency, move |_, out| {
        out.clear();
        source.collect(out);
        tracing::trace!(source = type_name::<S>(), entities = out.len(), "materialized");
    })
}
