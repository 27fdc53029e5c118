//! The authoritative entity store.

use std::collections::BTreeMap;
use std::rc::Rc;

use schema::ClassRegistry;

use crate::entity::{Entity, EntityDelta, EntityMutation, EntityOp};
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;
use crate::types::EntityHandle;

/// A delta after it has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityEvent {
    pub op: EntityOp,
    pub handle: EntityHandle,
    pub class_id: i32,
    pub mutations: Vec<EntityMutation>,
}

impl EntityEvent {
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.handle.index()
    }
}

/// Owns every entity, keyed by slot index.
///
/// Slot lifecycle is `absent -> active -> (active | inactive) -> absent`:
/// creates and updates activate, leaves deactivate and keep state, deletes
/// remove the slot. A create with a new serial replaces the occupant.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: BTreeMap<u32, Entity>,
    limits: CodecLimits,
}

impl EntityStore {
    #[must_use]
    pub fn new(limits: CodecLimits) -> Self {
        Self {
            entities: BTreeMap::new(),
            limits,
        }
    }

    /// Applies one decoded delta.
    pub fn apply(&mut self, delta: EntityDelta, classes: &ClassRegistry) -> CodecResult<EntityEvent> {
        let EntityDelta {
            op,
            index,
            serial,
            class_id,
            mutations,
        } = delta;

        match op {
            EntityOp::Create => {
                let reuse = self
                    .entities
                    .get(&index)
                    .is_some_and(|e| e.serial() == serial && e.class().id == class_id);
                if !reuse {
                    if !self.entities.contains_key(&index)
                        && self.entities.len() >= self.limits.max_entities
                    {
                        return Err(CodecError::LimitsExceeded {
                            kind: LimitKind::Entities,
                            limit: self.limits.max_entities,
                            actual: self.entities.len() + 1,
                        });
                    }
                    let class = classes.get(class_id)?;
                    self.entities
                        .insert(index, Entity::new(index, serial, Rc::clone(class)));
                }
                let entity = self.slot_mut(index)?;
                entity.set_active(true);
                entity.apply(&mutations);
            }
            EntityOp::Update => {
                let entity = self.slot_mut(index)?;
                entity.set_active(true);
                entity.apply(&mutations);
            }
            EntityOp::Leave => {
                self.slot_mut(index)?.set_active(false);
            }
            EntityOp::Delete => {
                self.entities
                    .remove(&index)
                    .ok_or(CodecError::EntityNotFound { index })?;
            }
        }

        let (handle, class_id) = match self.entities.get(&index) {
            Some(e) => (e.handle(), e.class().id),
            None => (EntityHandle::new(index, serial), class_id),
        };
        Ok(EntityEvent {
            op,
            handle,
            class_id,
            mutations,
        })
    }

    fn slot_mut(&mut self, index: u32) -> CodecResult<&mut Entity> {
        self.entities
            .get_mut(&index)
            .ok_or(CodecError::EntityNotFound { index })
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Option<&Entity> {
        self.entities.get(&index)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut Entity> {
        self.entities.get_mut(&index)
    }

    /// Resolves a handle; a stale serial resolves to nothing.
    #[must_use]
    pub fn get_by_handle(&self, handle: EntityHandle) -> Option<&Entity> {
        self.entities
            .get(&handle.index())
            .filter(|e| e.serial() == handle.serial())
    }

    pub fn get_by_handle_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.entities
            .get_mut(&handle.index())
            .filter(|e| e.serial() == handle.serial())
    }

    /// Follows a handle-typed property of one entity to the entity it names.
    pub fn follow_handle(&mut self, index: u32, property: &str) -> CodecResult<Option<&Entity>> {
        let handle = self.slot_mut(index)?.get_handle(property)?;
        Ok(handle.and_then(|h| self.get_by_handle(h)))
    }

    /// Entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.entities.values().filter(|e| e.is_active()).count()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{ClassInfo, Field, FieldPath, FieldProps, FieldValue, Serializer};

    fn classes() -> ClassRegistry {
        let field = |name: &str, ty: &str| {
            Rc::new(Field::from_declaration(name, ty, &FieldProps::default(), None).unwrap())
        };
        let mut classes = ClassRegistry::default();
        classes.insert(ClassInfo {
            id: 2,
            name: "CUnit".into(),
            serializer: Rc::new(Serializer::new(
                "CUnit",
                0,
                vec![
                    field("A", "int32"),
                    field("B", "int32"),
                    field("m_hOwnerEntity", "CHandle< CBaseEntity >"),
                ],
            )),
        });
        classes
    }

    fn delta(op: EntityOp, index: u32, serial: u32, values: &[(u16, i64)]) -> EntityDelta {
        EntityDelta {
            op,
            index,
            serial,
            class_id: 2,
            mutations: values
                .iter()
                .map(|&(field, value)| EntityMutation {
                    path: FieldPath::new(&[field]).unwrap(),
                    value: FieldValue::Signed(value),
                })
                .collect(),
        }
    }

    #[test]
    fn lifecycle() {
        let classes = classes();
        let mut store = EntityStore::new(CodecLimits::for_testing());

        store.apply(delta(EntityOp::Create, 5, 1, &[(0, 1)]), &classes).unwrap();
        store.apply(delta(EntityOp::Update, 5, 1, &[(1, 2)]), &classes).unwrap();
        store.apply(delta(EntityOp::Update, 5, 1, &[(0, 3)]), &classes).unwrap();
        store.apply(delta(EntityOp::Leave, 5, 1, &[]), &classes).unwrap();

        let e = store.get_mut(5).unwrap();
        assert!(!e.is_active());
        assert_eq!(e.get("A").unwrap(), Some(&FieldValue::Signed(3)));
        assert_eq!(e.get("B").unwrap(), Some(&FieldValue::Signed(2)));

        let event = store.apply(delta(EntityOp::Create, 5, 2, &[(0, 9)]), &classes).unwrap();
        assert_eq!(event.handle, EntityHandle::new(5, 2));
        let e = store.get_mut(5).unwrap();
        assert!(e.is_active());
        assert_eq!(e.serial(), 2);
        assert_eq!(e.get("B").unwrap(), None);

        store.apply(delta(EntityOp::Delete, 5, 2, &[]), &classes).unwrap();
        assert!(store.get(5).is_none());
        assert!(store.get_by_handle(EntityHandle::new(5, 2)).is_none());
    }

    #[test]
    fn recreate_same_serial_keeps_state() {
        let classes = classes();
        let mut store = EntityStore::new(CodecLimits::for_testing());
        store.apply(delta(EntityOp::Create, 1, 7, &[(0, 1), (1, 2)]), &classes).unwrap();
        store.apply(delta(EntityOp::Leave, 1, 7, &[]), &classes).unwrap();
        store.apply(delta(EntityOp::Create, 1, 7, &[(0, 4)]), &classes).unwrap();

        let e = store.get_mut(1).unwrap();
        assert!(e.is_active());
        assert_eq!(e.get("B").unwrap(), Some(&FieldValue::Signed(2)));
        assert_eq!(e.get("A").unwrap(), Some(&FieldValue::Signed(4)));
    }

    #[test]
    fn update_on_empty_slot_fails() {
        let classes = classes();
        let mut store = EntityStore::new(CodecLimits::for_testing());
        let err = store.apply(delta(EntityOp::Update, 9, 0, &[]), &classes).unwrap_err();
        assert_eq!(err, CodecError::EntityNotFound { index: 9 });
    }

    #[test]
    fn handles_reject_stale_serials() {
        let classes = classes();
        let mut store = EntityStore::new(CodecLimits::for_testing());
        store.apply(delta(EntityOp::Create, 3, 4, &[]), &classes).unwrap();
        assert!(store.get_by_handle(EntityHandle::new(3, 4)).is_some());
        assert!(store.get_by_handle(EntityHandle::new(3, 5)).is_none());
    }

    #[test]
    fn follows_owner_handles() {
        let classes = classes();
        let mut store = EntityStore::new(CodecLimits::for_testing());
        store.apply(delta(EntityOp::Create, 1, 1, &[(0, 100)]), &classes).unwrap();
        let mut child = delta(EntityOp::Create, 2, 1, &[]);
        child.mutations.push(EntityMutation {
            path: FieldPath::new(&[2]).unwrap(),
            value: FieldValue::Unsigned(u64::from(EntityHandle::new(1, 1).raw())),
        });
        store.apply(child, &classes).unwrap();

        let owner = store.follow_handle(2, "m_hOwnerEntity").unwrap().unwrap();
        assert_eq!(owner.index(), 1);
    }

    #[test]
    fn unknown_class_fails() {
        let classes = classes();
        let mut store = EntityStore::new(CodecLimits::for_testing());
        let mut d = delta(EntityOp::Create, 1, 1, &[]);
        d.class_id = 99;
        assert!(matches!(
            store.apply(d, &classes),
            Err(CodecError::Schema(schema::SchemaError::UnknownClass { id: 99 }))
        ));
    }

    #[test]
    fn entity_limit() {
        let classes = classes();
        let limits = CodecLimits {
            max_entities: 1,
            ..CodecLimits::for_testing()
        };
        let mut store = EntityStore::new(limits);
        store.apply(delta(EntityOp::Create, 1, 1, &[]), &classes).unwrap();
        let err = store.apply(delta(EntityOp::Create, 2, 1, &[]), &classes).unwrap_err();
        assert!(matches!(err, CodecError::LimitsExceeded { .. }));
        // replacing an occupied slot is not growth
        store.apply(delta(EntityOp::Create, 1, 2, &[]), &classes).unwrap();
    }
}
