use crate::access::AccessController;
use crate::errors::ConfigError;
use crate::id::{ActiveId, ContextId};
use crate::stream::DataStream;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) struct ResolveKey {
    pub(crate) type_id: TypeId,
    pub(crate) context: ContextId,
}

impl ResolveKey {
    pub(crate) fn of<R: 'static>(context: ContextId) -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            context,
        }
    }
}

/// Type-erased stream a record can be routed into.
pub(crate) trait RouteTarget: Send + Sync {
    fn controller(&self) -> &AccessController;

    fn active_id(&self) -> ActiveId;

    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

impl<R: Send + Sync + 'static> RouteTarget for DataStream<R> {
    fn controller(&self) -> &AccessController {
        DataStream::controller(self)
    }

    fn active_id(&self) -> ActiveId {
        DataStream::active_id(self)
    }

    fn type_name(&self) -> &'static str {
        type_name::<R>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry of every stream records can be resolved into, keyed by record
/// type and owning context.
///
/// Filled while configuring drivers, only read afterwards.
#[derive(Default)]
pub struct ResolveTargetTable {
    entries: DashMap<ResolveKey, Arc<dyn RouteTarget>>,
}

impl ResolveTargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `stream` the target for records of type `R` resolved into its
    /// context.
    pub fn register<R: Send + Sync + 'static>(
        &self,
        stream: &DataStream<R>,
    ) -> Result<(), ConfigError> {
        let key = ResolveKey::of::<R>(stream.context());

        match self.entries.entry(key) {
            Entry::Occupied(_) => Err(ConfigError::DuplicateResolveTarget {
                type_name: type_name::<R>(),
                context: stream.context(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(stream.clone()));
                Ok(())
            }
        }
    }

    pub(crate) fn get<R: 'static>(
        &self,
        context: ContextId,
    ) -> Result<Arc<dyn RouteTarget>, ConfigError> {
        self.entries
            .get(&ResolveKey::of::<R>(context))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ConfigError::UnknownResolveTarget {
                type_name: type_name::<R>(),
                context,
            })
    }

    /// Remote active id of the target registered for `R` in `context`.
    pub fn active_id<R: 'static>(&self, context: ContextId) -> Option<ActiveId> {
        self.entries
            .get(&ResolveKey::of::<R>(context))
            .map(|entry| entry.active_id())
    }

    pub fn contains<R: 'static>(&self, context: ContextId) -> bool {
        self.entries.contains_key(&ResolveKey::of::<R>(context))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ResolveTargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveTargetTable")
            .field("len", &self.entries.len())
            .finish()
    }
}
