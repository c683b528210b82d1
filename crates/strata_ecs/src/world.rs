//! # World
//!
//! The root state object: the engine heap, the archetype storage, the
//! component/relationship registries, the observer lists, and the tick
//! state. Registries are owned here, never process-wide; two worlds
//! never share state.
//!
//! Every mutating operation funnels its notifications and component
//! write marks through an [`EventBuffer`], applied when the operation
//! completes: write ticks first, then sequential observer dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_layout::{EnumDef, FieldSpec, Heap, SchemaLayout, StructRef, Value};

use crate::component::{ComponentDef, ComponentRegistry, EntityDefinition};
use crate::config::EngineConfig;
use crate::entity::EntityId;
use crate::error::{EcsError, EcsResult};
use crate::events::{EventBuffer, EventData, EventKind, Observers};
use crate::relationship::{
    RelationshipMetadata, RelationshipRegistry, PARENT_RELATIONSHIP, PARENT_TARGET, SOURCES_FIELD,
    TARGET_FIELD,
};
use crate::storage::{ArchetypeStorage, StorageBackend};

/// The world: all engine state apart from the scheduler.
pub struct World {
    heap: Heap,
    storage: ArchetypeStorage,
    registry: ComponentRegistry,
    relationships: RelationshipRegistry,
    observers: Observers,
    /// Advanced once per fixed-update pass.
    tick: u64,
    /// Component type -> tick it was last mutated at.
    write_ticks: HashMap<String, u64>,
    /// Delta time handed to the current update pass.
    delta_time: f64,
    pub(crate) initialized: bool,
}

impl World {
    /// Creates a world, registering the built-in parent/child pairing.
    pub fn new(config: &EngineConfig) -> EcsResult<Self> {
        let mut registry = ComponentRegistry::new();
        registry.register_component(
            PARENT_RELATIONSHIP,
            &[FieldSpec::new(TARGET_FIELD, "u32")],
        )?;
        registry.register_component(
            PARENT_TARGET,
            &[FieldSpec::new(SOURCES_FIELD, "set<u32>")],
        )?;

        let mut relationships = RelationshipRegistry::new();
        relationships.register(
            &registry,
            RelationshipMetadata {
                relationship_type: PARENT_RELATIONSHIP.to_string(),
                target_type: PARENT_TARGET.to_string(),
                linked_spawn: true,
            },
        )?;

        Ok(Self {
            heap: Heap::new(config.heap_bytes),
            storage: ArchetypeStorage::new(),
            registry,
            relationships,
            observers: Observers::new(),
            tick: 0,
            write_ticks: HashMap::with_capacity(config.entity_capacity_hint.min(4096)),
            delta_time: 0.0,
            initialized: false,
        })
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Registers a component type.
    pub fn register_component(
        &mut self,
        name: &str,
        fields: &[FieldSpec],
    ) -> EcsResult<Arc<SchemaLayout>> {
        self.registry.register_component(name, fields)
    }

    /// Registers a plain struct type for use inside component schemas.
    pub fn register_struct(
        &mut self,
        name: &str,
        fields: &[FieldSpec],
    ) -> EcsResult<Arc<SchemaLayout>> {
        self.registry.register_struct(name, fields)
    }

    /// Registers an enum type.
    pub fn register_enum(&mut self, def: EnumDef) -> EcsResult<()> {
        self.registry.register_enum(def)
    }

    /// Registers a relationship pairing between two component types.
    pub fn register_relationship(
        &mut self,
        relationship_type: &str,
        target_type: &str,
        linked_spawn: bool,
    ) -> EcsResult<()> {
        self.relationships.register(
            &self.registry,
            RelationshipMetadata {
                relationship_type: relationship_type.to_string(),
                target_type: target_type.to_string(),
                linked_spawn,
            },
        )
    }

    /// Whether a component type is registered.
    #[must_use]
    pub fn component_is_registered(&self, name: &str) -> bool {
        self.registry.is_registered(name)
    }

    /// Validates that every named component is registered.
    pub fn validate_dependencies(&self, names: &[String]) -> EcsResult<()> {
        self.registry.validate_dependencies(names)
    }

    /// Subscribes a handler to one event kind.
    pub fn subscribe(&mut self, kind: EventKind, handler: Box<dyn FnMut(&EventData)>) {
        self.observers.subscribe(kind, handler);
    }

    // ========================================================================
    // ENTITY OPERATIONS
    // ========================================================================

    /// Creates an empty entity.
    pub fn entity_create(&mut self) -> EntityId {
        let mut events = EventBuffer::new();
        let id = self.storage.entity_create(&mut events);
        self.apply(events);
        id
    }

    /// Spawns an entity subtree from a declarative definition.
    pub fn entity_spawn(
        &mut self,
        definition: &EntityDefinition,
        parent: Option<EntityId>,
    ) -> EcsResult<EntityId> {
        let mut events = EventBuffer::new();
        let result = self.storage.entity_spawn(
            &mut self.heap,
            &self.registry,
            &self.relationships,
            definition,
            parent,
            &mut events,
        );
        self.apply(events);
        result
    }

    /// Deletes an entity, cascading through `linked_spawn`
    /// relationships. Deleting a dead entity is a no-op.
    pub fn entity_delete(&mut self, id: EntityId) -> EcsResult<()> {
        let mut events = EventBuffer::new();
        let mut visited = HashSet::new();
        let result = self.storage.entity_delete(
            &mut self.heap,
            &self.registry,
            &self.relationships,
            id,
            &mut visited,
            &mut events,
        );
        self.apply(events);
        result
    }

    /// True while the id refers to a live entity.
    #[must_use]
    pub fn entity_is_alive(&self, id: EntityId) -> bool {
        self.storage.entity_is_alive(id)
    }

    /// First entity holding every named component.
    #[must_use]
    pub fn entity_find(&self, with: &[&str]) -> Option<EntityId> {
        self.storage.entity_find(&owned(with))
    }

    /// Every entity holding every named component.
    #[must_use]
    pub fn entity_find_multiple(&self, with: &[&str]) -> Vec<EntityId> {
        self.storage.entity_find_multiple(&owned(with))
    }

    /// Entities matching the (with, without) filter, served through the
    /// query cache.
    pub fn entity_view(&mut self, with: &[&str], without: &[&str]) -> Vec<EntityId> {
        self.storage
            .entity_view(&owned(with), &owned(without), &self.write_ticks, self.tick)
    }

    /// Sets or replaces an entity's parent.
    pub fn entity_parent_set(&mut self, id: EntityId, parent: EntityId) -> EcsResult<()> {
        let mut events = EventBuffer::new();
        let result = self.storage.entity_parent_set(
            &mut self.heap,
            &self.registry,
            &self.relationships,
            id,
            parent,
            &mut events,
        );
        self.apply(events);
        result
    }

    /// The entity's parent, if any.
    #[must_use]
    pub fn entity_parent_get(&self, id: EntityId) -> Option<EntityId> {
        self.storage.entity_parent_get(&self.heap, &self.registry, id)
    }

    /// The entity's children, in id order.
    #[must_use]
    pub fn entity_children_get(&self, id: EntityId) -> Vec<EntityId> {
        self.storage
            .entity_children_get(&self.heap, &self.registry, id)
    }

    // ========================================================================
    // COMPONENT OPERATIONS
    // ========================================================================

    /// Adds one component.
    pub fn component_add(&mut self, id: EntityId, def: ComponentDef) -> EcsResult<()> {
        self.component_add_multiple(id, &[def])
    }

    /// Adds components, migrating the entity's archetype.
    pub fn component_add_multiple(
        &mut self,
        id: EntityId,
        defs: &[ComponentDef],
    ) -> EcsResult<()> {
        let mut events = EventBuffer::new();
        let result = self.storage.component_add_multiple(
            &mut self.heap,
            &self.registry,
            &self.relationships,
            id,
            defs,
            &mut events,
        );
        self.apply(events);
        result
    }

    /// Removes components, migrating the entity's archetype.
    pub fn component_remove_multiple(&mut self, id: EntityId, names: &[&str]) -> EcsResult<()> {
        let mut events = EventBuffer::new();
        let result = self.storage.component_remove_multiple(
            &mut self.heap,
            &self.registry,
            &self.relationships,
            id,
            &owned(names),
            &mut events,
        );
        self.apply(events);
        result
    }

    /// True when the entity holds the component.
    #[must_use]
    pub fn component_has(&self, id: EntityId, name: &str) -> bool {
        self.storage.component_has(id, name)
    }

    /// The entity's component names, sorted.
    #[must_use]
    pub fn component_names(&self, id: EntityId) -> Vec<String> {
        self.storage.component_names(id)
    }

    /// A struct view over one component instance. Mutations through the
    /// view go with [`Self::heap_mut`]; call
    /// [`Self::component_mark_written`] afterwards so change detection
    /// and the query cache observe the write.
    pub fn component_view(&self, id: EntityId, name: &str) -> EcsResult<StructRef> {
        if !self.storage.entity_is_alive(id) {
            return Err(EcsError::EntityNotFound(id));
        }
        let row = self
            .storage
            .component_row(id, name)
            .ok_or_else(|| EcsError::MissingComponent {
                entity: id,
                component: name.to_string(),
            })?;
        Ok(StructRef::new(row, self.registry.layout(name)?))
    }

    /// Struct views over several components of one entity, in request
    /// order; `None` where the component is absent.
    pub fn component_view_multiple(
        &self,
        id: EntityId,
        names: &[&str],
    ) -> EcsResult<Vec<Option<StructRef>>> {
        if !self.storage.entity_is_alive(id) {
            return Err(EcsError::EntityNotFound(id));
        }
        self.storage
            .component_row_multiple(id, &owned(names))
            .into_iter()
            .zip(names)
            .map(|(row, name)| {
                row.map(|row| Ok(StructRef::new(row, self.registry.layout(name)?)))
                    .transpose()
            })
            .collect()
    }

    /// `(entity, view)` pairs for every entity holding `name`, honoring
    /// an exclusion filter. The iteration counterpart of
    /// [`Self::entity_view`].
    pub fn component_iter(
        &mut self,
        name: &str,
        without: &[&str],
    ) -> EcsResult<Vec<(EntityId, StructRef)>> {
        let layout = self.registry.layout(name)?;
        Ok(self
            .storage
            .component_view(name, &owned(without), &self.write_ticks, self.tick)
            .into_iter()
            .map(|(id, row)| (id, StructRef::new(row, Arc::clone(&layout))))
            .collect())
    }

    /// Writes one scalar field of one component, recording the write.
    pub fn component_set(
        &mut self,
        id: EntityId,
        name: &str,
        field: &str,
        value: &Value,
    ) -> EcsResult<()> {
        let view = self.component_view(id, name)?;
        view.set(&mut self.heap, field, value)?;
        self.component_mark_written(name);
        Ok(())
    }

    /// Reads one scalar field of one component.
    pub fn component_get(&self, id: EntityId, name: &str, field: &str) -> EcsResult<Value> {
        let view = self.component_view(id, name)?;
        Ok(view.get(&self.heap, field)?)
    }

    /// Records a component-type write at the current tick. View-based
    /// mutation does not go through the world, so the caller marks it.
    pub fn component_mark_written(&mut self, name: &str) {
        self.write_ticks.insert(name.to_string(), self.tick);
    }

    // ========================================================================
    // TICKS, HEAP, LIFECYCLE
    // ========================================================================

    /// The world tick. Advanced only on fixed-update entry.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The tick `name` was last mutated at (0 = never).
    #[must_use]
    pub fn write_tick(&self, name: &str) -> u64 {
        self.write_ticks.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Delta time of the current update pass, in seconds.
    #[must_use]
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    pub(crate) fn set_delta_time(&mut self, delta: f64) {
        self.delta_time = delta;
    }

    /// Whether the engine completed initialization.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The engine heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The engine heap, mutably - for view-based component access.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Dispatches one event to subscribers (scheduler lifecycle events).
    pub(crate) fn emit(&mut self, event: EventData) {
        self.observers.notify(&event);
    }

    /// Releases all entity state and clears storage bookkeeping.
    pub(crate) fn cleanup_storage(&mut self) {
        self.storage.cleanup(&mut self.heap, &self.registry);
        self.write_ticks.clear();
        self.tick = 0;
    }

    /// Drops every observer subscription.
    pub(crate) fn clear_observers(&mut self) {
        self.observers.clear();
    }

    /// Applies an operation's buffer: write ticks first, then sequential
    /// observer notification in emission order.
    fn apply(&mut self, buffer: EventBuffer) {
        for name in &buffer.dirty_components {
            self.write_ticks.insert(name.clone(), self.tick);
        }
        for event in &buffer.events {
            self.observers.notify(event);
        }
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn world() -> World {
        let mut world = World::new(&EngineConfig::default()).unwrap();
        world
            .register_component(
                "position",
                &[FieldSpec::new("x", "f32"), FieldSpec::new("y", "f32")],
            )
            .unwrap();
        world
            .register_component("label", &[FieldSpec::new("text", "str")])
            .unwrap();
        world
    }

    #[test]
    fn test_spawn_subtree_depth_first() {
        let mut w = world();
        let definition = EntityDefinition::new()
            .component(ComponentDef::new("position"))
            .child(EntityDefinition::new().component(ComponentDef::new("position")))
            .child(EntityDefinition::new());

        let root = w.entity_spawn(&definition, None).unwrap();
        let children = w.entity_children_get(root);
        assert_eq!(children.len(), 2);
        for child in &children {
            assert_eq!(w.entity_parent_get(*child), Some(root));
        }
    }

    #[test]
    fn test_component_set_bumps_write_tick() {
        let mut w = world();
        let id = w.entity_create();
        w.component_add(id, ComponentDef::new("position")).unwrap();

        for _ in 0..3 {
            w.advance_tick();
        }
        w.component_set(id, "position", "x", &Value::F32(9.0)).unwrap();
        assert_eq!(w.write_tick("position"), 3);
        assert_eq!(
            w.component_get(id, "position", "x").unwrap(),
            Value::F32(9.0)
        );
    }

    #[test]
    fn test_events_reach_subscribers_in_order() {
        let mut w = world();
        let log = Rc::new(RefCell::new(Vec::new()));

        for kind in [EventKind::EntityCreated, EventKind::ComponentAdded] {
            let log = Rc::clone(&log);
            w.subscribe(
                kind,
                Box::new(move |event| log.borrow_mut().push(event.kind())),
            );
        }

        let id = w.entity_create();
        w.component_add(id, ComponentDef::new("position")).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![EventKind::EntityCreated, EventKind::ComponentAdded]
        );
    }

    #[test]
    fn test_string_component_lifecycle() {
        let mut w = world();
        let id = w.entity_create();
        w.component_add(
            id,
            ComponentDef::new("label").with("text", Value::Str("warden".into())),
        )
        .unwrap();

        assert_eq!(
            w.component_get(id, "label", "text").unwrap(),
            Value::Str("warden".into())
        );

        w.entity_delete(id).unwrap();
        // The component row and its string were both released.
        assert_eq!(w.heap().live_allocations(), 0);
    }

    #[test]
    fn test_view_reuse_and_invalidation() {
        let mut w = world();
        let a = w.entity_create();
        w.component_add(a, ComponentDef::new("position")).unwrap();

        let first = w.entity_view(&["position"], &[]);
        assert_eq!(first, vec![a]);

        let b = w.entity_create();
        w.component_add(b, ComponentDef::new("position")).unwrap();
        let second = w.entity_view(&["position"], &[]);
        assert_eq!(second, vec![a, b]);
    }
}
