//! # Relationship Engine
//!
//! Bidirectional bookkeeping for "this entity points at that entity"
//! component pairs. The relationship component holds a single `target`
//! entity id; the paired target-type component holds the `sources` set
//! of entities pointing back. The protocol runs on component add and
//! remove:
//!
//! - adding a relationship to a dead target removes the relationship
//!   again and aborts (never an error),
//! - adding to a live target ensures the target-type component exists
//!   and records the source in its set,
//! - removing drops the source from the set; an emptied set removes the
//!   target-type component entirely, so "has any source" is exactly
//!   "component present".
//!
//! `linked_spawn` is consumed only during entity deletion: deleting the
//! target cascades deletion to every source still pointing at it.
//!
//! Parent/child is the built-in instance of this machinery.

use std::collections::HashMap;

use strata_layout::{Heap, StructRef, Value};

use crate::component::{ComponentDef, ComponentRegistry};
use crate::entity::EntityId;
use crate::error::{EcsError, EcsResult};
use crate::events::{EventBuffer, EventData};
use crate::storage::{ArchetypeStorage, StorageBackend};

/// The built-in parent/child relationship component (held by the child).
pub const PARENT_RELATIONSHIP: &str = "child_of";
/// The built-in parent/child target component (held by the parent).
pub const PARENT_TARGET: &str = "children";
/// Field of a relationship component holding the target entity id.
pub const TARGET_FIELD: &str = "target";
/// Field of a target-type component holding the source entity set.
pub const SOURCES_FIELD: &str = "sources";

/// One registered relationship pairing.
#[derive(Clone, Debug)]
pub struct RelationshipMetadata {
    /// The component holding a single target entity id.
    pub relationship_type: String,
    /// The paired component holding the source-entity set.
    pub target_type: String,
    /// Whether deleting the target cascades deletion to all sources.
    pub linked_spawn: bool,
}

/// Registry of relationship pairings, owned by the world instance.
#[derive(Default)]
pub struct RelationshipRegistry {
    metas: Vec<RelationshipMetadata>,
    by_relationship: HashMap<String, usize>,
    by_target: HashMap<String, usize>,
}

impl RelationshipRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pairing, validating that both components exist and
    /// carry the fields the protocol reads.
    pub fn register(
        &mut self,
        components: &ComponentRegistry,
        meta: RelationshipMetadata,
    ) -> EcsResult<()> {
        if self.by_relationship.contains_key(&meta.relationship_type)
            || self.by_target.contains_key(&meta.target_type)
        {
            return Err(EcsError::DuplicateRelationship(meta.relationship_type));
        }

        let invalid = |reason: &str| EcsError::InvalidRelationship {
            relationship: meta.relationship_type.clone(),
            reason: reason.to_string(),
        };
        let rel_layout = components
            .layout(&meta.relationship_type)
            .map_err(|_| invalid("relationship component is not registered"))?;
        rel_layout
            .property(TARGET_FIELD)
            .map_err(|_| invalid("relationship component has no `target` field"))?;
        let target_layout = components
            .layout(&meta.target_type)
            .map_err(|_| invalid("target component is not registered"))?;
        target_layout
            .property(SOURCES_FIELD)
            .map_err(|_| invalid("target component has no `sources` field"))?;

        let index = self.metas.len();
        self.by_relationship
            .insert(meta.relationship_type.clone(), index);
        self.by_target.insert(meta.target_type.clone(), index);
        self.metas.push(meta);
        Ok(())
    }

    /// Looks up a pairing by its relationship component name.
    #[must_use]
    pub fn by_relationship(&self, name: &str) -> Option<&RelationshipMetadata> {
        self.by_relationship.get(name).map(|&i| &self.metas[i])
    }

    /// Looks up a pairing by its target component name.
    #[must_use]
    pub fn by_target(&self, name: &str) -> Option<&RelationshipMetadata> {
        self.by_target.get(name).map(|&i| &self.metas[i])
    }
}

/// Reads the target entity id out of a relationship component row.
pub(crate) fn read_target(
    heap: &Heap,
    registry: &ComponentRegistry,
    component: &str,
    row: strata_layout::Ptr,
) -> EcsResult<EntityId> {
    let layout = registry.layout(component)?;
    match StructRef::new(row, layout).get(heap, TARGET_FIELD)? {
        Value::U32(raw) => Ok(EntityId::from_raw(raw)),
        other => {
            tracing::error!(component, ?other, "relationship target field is not an entity id");
            Err(EcsError::InternalInvariant(format!(
                "`{component}` target field does not hold an entity id"
            )))
        }
    }
}

/// Runs after a relationship component lands on `source`.
pub(crate) fn on_relationship_added(
    storage: &mut ArchetypeStorage,
    heap: &mut Heap,
    registry: &ComponentRegistry,
    relationships: &RelationshipRegistry,
    source: EntityId,
    name: &str,
    old_target: Option<EntityId>,
    events: &mut EventBuffer,
) -> EcsResult<()> {
    let meta = relationships
        .by_relationship(name)
        .ok_or_else(|| EcsError::InternalInvariant(format!("`{name}` is not a relationship")))?
        .clone();

    let row = storage.component_row(source, name).ok_or_else(|| {
        tracing::error!(%source, name, "relationship component missing right after add");
        EcsError::InternalInvariant(format!("`{name}` missing on {source} after add"))
    })?;
    let new_target = read_target(heap, registry, name, row)?;

    // A relationship can never legally point at a dead entity: undo the
    // add and stop. Expected absence, not an error.
    if !storage.entity_is_alive(new_target) {
        tracing::trace!(%source, %new_target, name, "relationship target dead, removing");
        storage.remove_components_without_hooks(
            heap,
            registry,
            relationships,
            source,
            &[name.to_string()],
            events,
        )?;
        return Ok(());
    }

    let replacing = old_target.filter(|&old| old != new_target);
    if let Some(old) = replacing {
        on_relationship_removed(
            storage,
            heap,
            registry,
            relationships,
            source,
            name,
            old,
            true,
            events,
        )?;
    }

    if !storage.component_has(new_target, &meta.target_type) {
        storage.component_add_multiple(
            heap,
            registry,
            relationships,
            new_target,
            &[ComponentDef::new(&meta.target_type)],
            events,
        )?;
    }
    let target_row = storage
        .component_row(new_target, &meta.target_type)
        .ok_or_else(|| {
            tracing::error!(%new_target, target_type = %meta.target_type, "target component missing after add");
            EcsError::InternalInvariant(format!(
                "`{}` missing on {new_target} after add",
                meta.target_type
            ))
        })?;

    let target_layout = registry.layout(&meta.target_type)?;
    let sources = StructRef::new(target_row, target_layout).hash_set(SOURCES_FIELD)?;
    sources.insert(heap, &Value::U32(source.raw()))?;
    events.mark_dirty(&meta.target_type);

    events.push(EventData::RelationshipSourceAdded {
        source,
        target: new_target,
        relationship: name.to_string(),
    });
    if replacing.is_some() {
        events.push(EventData::RelationshipSet {
            source,
            relationship: name.to_string(),
            old_target,
            new_target: Some(new_target),
        });
    }
    if name == PARENT_RELATIONSHIP {
        events.push(EventData::EntityParentSet {
            entity: source,
            parent: Some(new_target),
        });
        events.push(EventData::EntityChildAdded {
            parent: new_target,
            child: source,
        });
    }
    Ok(())
}

/// Runs after a relationship component left `source`. `is_overwrite`
/// means a fresh add follows immediately and stale notifications are
/// suppressed.
#[allow(clippy::too_many_arguments)]
pub(crate) fn on_relationship_removed(
    storage: &mut ArchetypeStorage,
    heap: &mut Heap,
    registry: &ComponentRegistry,
    relationships: &RelationshipRegistry,
    source: EntityId,
    name: &str,
    target: EntityId,
    is_overwrite: bool,
    events: &mut EventBuffer,
) -> EcsResult<()> {
    let meta = relationships
        .by_relationship(name)
        .ok_or_else(|| EcsError::InternalInvariant(format!("`{name}` is not a relationship")))?
        .clone();

    if storage.entity_is_alive(target) {
        if let Some(target_row) = storage.component_row(target, &meta.target_type) {
            let target_layout = registry.layout(&meta.target_type)?;
            let sources = StructRef::new(target_row, target_layout).hash_set(SOURCES_FIELD)?;
            sources.remove(heap, &Value::U32(source.raw()))?;
            events.mark_dirty(&meta.target_type);

            // Component presence is exactly "has any source".
            if sources.is_empty(heap) {
                storage.component_remove_multiple(
                    heap,
                    registry,
                    relationships,
                    target,
                    &[meta.target_type.clone()],
                    events,
                )?;
            }
        } else {
            tracing::trace!(
                %target,
                target_type = %meta.target_type,
                "target-type component not found during removal"
            );
        }
    } else {
        tracing::trace!(%source, %target, name, "relationship target already dead");
    }

    if is_overwrite {
        tracing::trace!(%source, name, "stale relationship notification suppressed");
        return Ok(());
    }

    events.push(EventData::RelationshipSet {
        source,
        relationship: name.to_string(),
        old_target: Some(target),
        new_target: None,
    });
    if name == PARENT_RELATIONSHIP {
        events.push(EventData::EntityParentSet {
            entity: source,
            parent: None,
        });
        if storage.entity_is_alive(target) {
            events.push(EventData::EntityChildRemoved {
                parent: target,
                child: source,
            });
        }
    }
    Ok(())
}
