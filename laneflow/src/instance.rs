use crate::id::{ActiveId, ContextId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// External entity identifier supplied by the host entity database.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Entity {
    pub index: u32,
    pub version: u32,
}

impl Entity {
    pub const fn new(index: u32, version: u32) -> Self {
        Self { index, version }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.version)
    }
}

/// Identifies one in-flight unit of work: an entity, scoped to the context
/// (driver) that owns it.
///
/// Equality and hashing only consider `entity` and `context`. The `active_id`
/// is informational, it tells which stream the record was last written into.
#[derive(Clone, Copy, Debug)]
pub struct InstanceId {
    pub entity: Entity,
    pub context: ContextId,
    pub active_id: ActiveId,
}

impl InstanceId {
    pub fn new(entity: Entity, context: ContextId, active_id: ActiveId) -> Self {
        Self {
            entity,
            context,
            active_id,
        }
    }

    /// Same entity, re-scoped to another owner.
    pub fn with_target(self, context: ContextId, active_id: ActiveId) -> Self {
        Self {
            entity: self.entity,
            context,
            active_id,
        }
    }
}

impl PartialEq for InstanceId {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.context == other.context
    }
}

impl Eq for InstanceId {}

impl Hash for InstanceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.hash(state);
        self.context.hash(state);
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.context)
    }
}

/// The unit stored in pending lanes and live arrays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<T> {
    pub id: InstanceId,
    pub payload: T,
}

impl<T> Entry<T> {
    pub fn new(id: InstanceId, payload: T) -> Self {
        Self { id, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdProvider;
    use std::collections::HashSet;

    #[test]
    fn test_instance_identity_ignores_active_id() {
        let ctx = ContextId::from_raw(7);
        let entity = Entity::new(3, 1);

        let a = InstanceId::new(entity, ctx, ActiveId::UNSET);
        let b = a.with_target(ctx, IdProvider::default().next_active_id());
        assert_ne!(a.active_id, b.active_id);

        let mut set = HashSet::new();
        set.insert(a);

        assert_eq!(a, b);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_instance_identity_uses_context_and_version() {
        let entity = Entity::new(3, 1);
        let a = InstanceId::new(entity, ContextId::from_raw(1), ActiveId::UNSET);

        assert_ne!(a, a.with_target(ContextId::from_raw(2), ActiveId::UNSET));
        assert_ne!(
            a,
            InstanceId::new(Entity::new(3, 2), ContextId::from_raw(1), ActiveId::UNSET)
        );
    }

    #[test]
    fn test_display() {
        let id = InstanceId::new(Entity::new(4, 2), ContextId::from_raw(9), ActiveId::UNSET);
        assert_eq!(id.to_string(), "4v2@9");
    }
}
