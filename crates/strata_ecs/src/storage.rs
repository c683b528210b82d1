//! # Archetype Storage Backend
//!
//! The reference [`StorageBackend`]: entities grouped by their exact
//! component-type set, one archetype per set, columns of row pointers
//! into the engine heap. Component add/remove migrates the entity to the
//! archetype matching its new set; deletion is cycle-guarded and honors
//! `linked_spawn` cascades. A conforming backend of any other shape must
//! preserve these observable semantics, notifications included.

use std::collections::{BTreeSet, HashMap, HashSet};

use strata_layout::{free_struct_dynamic, Heap, Ptr, StructRef, Value};

use crate::archetype::{signature_key, Archetype, ArchetypeId};
use crate::component::{ComponentDef, ComponentRegistry, EntityDefinition};
use crate::entity::{EntityAllocator, EntityId};
use crate::error::{EcsError, EcsResult};
use crate::events::{EventBuffer, EventData};
use crate::query::{QueryCache, QueryKey};
use crate::relationship::{
    self, RelationshipRegistry, PARENT_RELATIONSHIP, PARENT_TARGET, SOURCES_FIELD, TARGET_FIELD,
};

/// The storage contract the world consumes. The archetype implementation
/// below is the reference; alternate backends must preserve the same
/// observable semantics (notifications, `linked_spawn`, migration).
pub trait StorageBackend {
    /// Creates an entity in the canonical empty archetype.
    fn entity_create(&mut self, events: &mut EventBuffer) -> EntityId;

    /// Spawns an entity subtree depth-first from a declarative
    /// definition, parenting children to their spawning entity.
    #[allow(clippy::too_many_arguments)]
    fn entity_spawn(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        definition: &EntityDefinition,
        parent: Option<EntityId>,
        events: &mut EventBuffer,
    ) -> EcsResult<EntityId>;

    /// Deletes an entity. `visited` is the cycle guard threaded through
    /// `linked_spawn` cascades; deletion of an already-visited or dead
    /// id is a no-op.
    #[allow(clippy::too_many_arguments)]
    fn entity_delete(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        visited: &mut HashSet<EntityId>,
        events: &mut EventBuffer,
    ) -> EcsResult<()>;

    /// True while the id refers to a live entity.
    fn entity_is_alive(&self, id: EntityId) -> bool;

    /// First entity (lowest id) holding every named component.
    fn entity_find(&self, with: &[String]) -> Option<EntityId>;

    /// Every entity holding every named component, in id order.
    fn entity_find_multiple(&self, with: &[String]) -> Vec<EntityId>;

    /// The entity's parent, if it has one.
    fn entity_parent_get(
        &self,
        heap: &Heap,
        registry: &ComponentRegistry,
        id: EntityId,
    ) -> Option<EntityId>;

    /// The entity's children, in id order.
    fn entity_children_get(
        &self,
        heap: &Heap,
        registry: &ComponentRegistry,
        id: EntityId,
    ) -> Vec<EntityId>;

    /// Sets or replaces the entity's parent.
    fn entity_parent_set(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        parent: EntityId,
        events: &mut EventBuffer,
    ) -> EcsResult<()>;

    /// True when the entity holds the component.
    fn component_has(&self, id: EntityId, name: &str) -> bool;

    /// The heap row of one component on one entity.
    fn component_row(&self, id: EntityId, name: &str) -> Option<Ptr>;

    /// Rows for several components of one entity, in request order.
    fn component_row_multiple(&self, id: EntityId, names: &[String]) -> Vec<Option<Ptr>>;

    /// The entity's component names, sorted.
    fn component_names(&self, id: EntityId) -> Vec<String>;

    /// Adds components, migrating the entity to the matching archetype.
    /// Components already present are re-initialized in place.
    #[allow(clippy::too_many_arguments)]
    fn component_add_multiple(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        defs: &[ComponentDef],
        events: &mut EventBuffer,
    ) -> EcsResult<()>;

    /// Removes components, migrating the entity to the matching
    /// archetype. Absent components are skipped.
    #[allow(clippy::too_many_arguments)]
    fn component_remove_multiple(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        names: &[String],
        events: &mut EventBuffer,
    ) -> EcsResult<()>;

    /// Entities matching the (with, without) filter, served through the
    /// query cache.
    fn entity_view(
        &mut self,
        with: &[String],
        without: &[String],
        write_ticks: &HashMap<String, u64>,
        now: u64,
    ) -> Vec<EntityId>;

    /// `(entity, row)` pairs of one component type across every entity
    /// holding it, honoring an exclusion filter. The iteration
    /// counterpart of [`Self::entity_view`].
    fn component_view(
        &mut self,
        component: &str,
        without: &[String],
        write_ticks: &HashMap<String, u64>,
        now: u64,
    ) -> Vec<(EntityId, Ptr)>;

    /// Releases every entity row and clears all state.
    fn cleanup(&mut self, heap: &mut Heap, registry: &ComponentRegistry);
}

/// Archetype-based storage: the reference backend.
#[derive(Default)]
pub struct ArchetypeStorage {
    archetypes: Vec<Archetype>,
    archetype_index: HashMap<Vec<String>, ArchetypeId>,
    /// Entity id -> (archetype, row index).
    locations: HashMap<EntityId, (ArchetypeId, usize)>,
    /// Component type -> entities holding it. Drives `find` and deletion
    /// cleanup.
    component_index: HashMap<String, HashSet<EntityId>>,
    allocator: EntityAllocator,
    query_cache: QueryCache,
}

impl ArchetypeStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    /// The archetypes, for inspection.
    #[must_use]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    fn find_or_create_archetype(&mut self, names: BTreeSet<String>) -> ArchetypeId {
        let key = signature_key(&names);
        if let Some(&id) = self.archetype_index.get(&key) {
            return id;
        }
        let id = self.archetypes.len() as ArchetypeId;
        tracing::debug!(id, ?key, "archetype created");
        self.archetypes.push(Archetype::new(id, names));
        self.archetype_index.insert(key, id);
        id
    }

    fn location(&self, id: EntityId) -> EcsResult<(ArchetypeId, usize)> {
        self.locations
            .get(&id)
            .copied()
            .ok_or(EcsError::EntityNotFound(id))
    }

    /// Allocates and initializes a component row from its definition.
    fn create_row(
        heap: &mut Heap,
        registry: &ComponentRegistry,
        def: &ComponentDef,
    ) -> EcsResult<Ptr> {
        let layout = registry.layout(&def.name)?;
        let size = (layout.total_size as usize).max(1);
        let row = heap.allocate(size, "component_row");
        if row.is_null() {
            return Err(EcsError::Layout(strata_layout::LayoutError::OutOfMemory {
                owner: "component_row",
                size,
            }));
        }
        let view = StructRef::new(row, layout);
        for (field, value) in &def.values {
            view.set(heap, field, value)?;
        }
        Ok(row)
    }

    /// Releases a component row and its dynamic payloads.
    fn free_row(heap: &mut Heap, registry: &ComponentRegistry, name: &str, row: Ptr) {
        if let Ok(layout) = registry.layout(name) {
            free_struct_dynamic(heap, &layout, row);
        } else {
            tracing::error!(name, "freeing a row of an unregistered component");
        }
        heap.free(row);
    }

    /// Moves an entity out of its current archetype, returning its rows.
    fn take_rows(&mut self, id: EntityId) -> EcsResult<HashMap<String, Ptr>> {
        let (aid, index) = self.location(id)?;
        let archetype = &mut self.archetypes[aid as usize];
        let (rows, moved) = archetype.swap_remove_row(index);
        if let Some(moved) = moved {
            self.locations.insert(moved, (aid, index));
        }
        self.locations.remove(&id);
        Ok(rows)
    }

    /// Places an entity's rows into the archetype matching their names.
    fn place_rows(&mut self, id: EntityId, rows: HashMap<String, Ptr>) {
        let names: BTreeSet<String> = rows.keys().cloned().collect();
        let aid = self.find_or_create_archetype(names);
        let index = self.archetypes[aid as usize].push_row(id, rows);
        self.locations.insert(id, (aid, index));
    }

    /// Component removal with an opt-out of the relationship protocol,
    /// for the dead-target abort path.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn remove_components_without_hooks(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        names: &[String],
        events: &mut EventBuffer,
    ) -> EcsResult<()> {
        self.remove_components_inner(heap, registry, relationships, id, names, false, events)
    }

    #[allow(clippy::too_many_arguments)]
    fn remove_components_inner(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        names: &[String],
        run_hooks: bool,
        events: &mut EventBuffer,
    ) -> EcsResult<()> {
        let (aid, index) = self.location(id)?;

        let present: Vec<String> = names
            .iter()
            .filter(|n| self.archetypes[aid as usize].has_component(n))
            .cloned()
            .collect();
        if present.is_empty() {
            tracing::trace!(%id, ?names, "remove of absent components is a no-op");
            return Ok(());
        }

        // Capture relationship targets before the rows disappear.
        let mut removed_relationships = Vec::new();
        for name in &present {
            if relationships.by_relationship(name).is_some() {
                let row = self.archetypes[aid as usize]
                    .row(name, index)
                    .ok_or_else(|| {
                        EcsError::InternalInvariant(format!("`{name}` column lost its row"))
                    })?;
                let target = relationship::read_target(heap, registry, name, row)?;
                removed_relationships.push((name.clone(), target));
            }
        }

        let mut rows = self.take_rows(id)?;
        let mut removed = HashMap::with_capacity(present.len());
        for name in &present {
            let row = rows.remove(name).ok_or_else(|| {
                tracing::error!(%id, name, "archetype removal returned no row for a present component");
                EcsError::InternalInvariant(format!("no row captured for `{name}` on {id}"))
            })?;
            removed.insert(name.clone(), row);
        }
        // Migration changes archetype membership for the kept
        // components too; their cached queries must revalidate.
        for name in rows.keys() {
            events.mark_dirty(name);
        }
        self.place_rows(id, rows);

        for name in &present {
            if let Some(set) = self.component_index.get_mut(name) {
                set.remove(&id);
            }
            events.push(EventData::ComponentRemoved {
                entity: id,
                component: name.clone(),
            });
        }

        if run_hooks {
            for (name, target) in removed_relationships {
                relationship::on_relationship_removed(
                    self,
                    heap,
                    registry,
                    relationships,
                    id,
                    &name,
                    target,
                    false,
                    events,
                )?;
            }
        }

        for (name, row) in removed {
            Self::free_row(heap, registry, &name, row);
        }
        Ok(())
    }
}

impl StorageBackend for ArchetypeStorage {
    fn entity_create(&mut self, events: &mut EventBuffer) -> EntityId {
        let id = self.allocator.allocate();
        self.place_rows(id, HashMap::new());
        events.push(EventData::EntityCreated { entity: id });
        id
    }

    fn entity_spawn(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        definition: &EntityDefinition,
        parent: Option<EntityId>,
        events: &mut EventBuffer,
    ) -> EcsResult<EntityId> {
        let id = self.entity_create(events);
        if !definition.components.is_empty() {
            self.component_add_multiple(
                heap,
                registry,
                relationships,
                id,
                &definition.components,
                events,
            )?;
        }
        if let Some(parent) = parent {
            self.entity_parent_set(heap, registry, relationships, id, parent, events)?;
        }
        for child in &definition.children {
            self.entity_spawn(heap, registry, relationships, child, Some(id), events)?;
        }
        Ok(id)
    }

    fn entity_delete(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        visited: &mut HashSet<EntityId>,
        events: &mut EventBuffer,
    ) -> EcsResult<()> {
        // The cycle guard, not topology, is what guarantees termination.
        if !visited.insert(id) {
            return Ok(());
        }
        if !self.locations.contains_key(&id) {
            tracing::trace!(%id, "delete of a dead entity is a no-op");
            return Ok(());
        }

        let rows = self.take_rows(id)?;
        let mut names: Vec<String> = rows.keys().cloned().collect();
        names.sort();

        for name in &names {
            events.push(EventData::ComponentRemoved {
                entity: id,
                component: name.clone(),
            });
        }

        // Unlink this entity from every target it points at.
        for name in &names {
            if relationships.by_relationship(name).is_some() {
                let target = relationship::read_target(heap, registry, name, rows[name])?;
                relationship::on_relationship_removed(
                    self,
                    heap,
                    registry,
                    relationships,
                    id,
                    name,
                    target,
                    false,
                    events,
                )?;
            }
        }

        // Cascade to sources of linked-spawn target components.
        for name in &names {
            let cascade = relationships
                .by_target(name)
                .is_some_and(|meta| meta.linked_spawn);
            if cascade {
                let layout = registry.layout(name)?;
                let sources: Vec<EntityId> = StructRef::new(rows[name], layout)
                    .hash_set(SOURCES_FIELD)?
                    .items(heap)
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::U32(raw) => Some(EntityId::from_raw(raw)),
                        _ => None,
                    })
                    .collect();
                for source in sources {
                    self.entity_delete(heap, registry, relationships, source, visited, events)?;
                }
            }
        }

        for (name, row) in &rows {
            Self::free_row(heap, registry, name, *row);
        }
        for name in &names {
            if let Some(set) = self.component_index.get_mut(name) {
                set.remove(&id);
            }
        }
        self.allocator.release(id);
        events.push(EventData::EntityDeleted { entity: id });
        Ok(())
    }

    fn entity_is_alive(&self, id: EntityId) -> bool {
        self.locations.contains_key(&id)
    }

    fn entity_find(&self, with: &[String]) -> Option<EntityId> {
        self.entity_find_multiple(with).into_iter().next()
    }

    fn entity_find_multiple(&self, with: &[String]) -> Vec<EntityId> {
        if with.is_empty() {
            return Vec::new();
        }

        // Drive the scan from the smallest involved component set.
        let mut sets = Vec::with_capacity(with.len());
        for name in with {
            match self.component_index.get(name) {
                Some(set) if !set.is_empty() => sets.push(set),
                _ => return Vec::new(),
            }
        }
        sets.sort_by_key(|s| s.len());
        let Some((driver, rest)) = sets.split_first() else {
            return Vec::new();
        };

        let mut result: Vec<EntityId> = driver
            .iter()
            .filter(|id| rest.iter().all(|set| set.contains(*id)))
            .copied()
            .collect();
        result.sort();
        result
    }

    fn entity_parent_get(
        &self,
        heap: &Heap,
        registry: &ComponentRegistry,
        id: EntityId,
    ) -> Option<EntityId> {
        let row = self.component_row(id, PARENT_RELATIONSHIP)?;
        let layout = registry.layout(PARENT_RELATIONSHIP).ok()?;
        match StructRef::new(row, layout).get(heap, TARGET_FIELD) {
            Ok(Value::U32(raw)) => Some(EntityId::from_raw(raw)),
            _ => None,
        }
    }

    fn entity_children_get(
        &self,
        heap: &Heap,
        registry: &ComponentRegistry,
        id: EntityId,
    ) -> Vec<EntityId> {
        let Some(row) = self.component_row(id, PARENT_TARGET) else {
            return Vec::new();
        };
        let Ok(layout) = registry.layout(PARENT_TARGET) else {
            return Vec::new();
        };
        let Ok(sources) = StructRef::new(row, layout).hash_set(SOURCES_FIELD) else {
            return Vec::new();
        };
        let mut children: Vec<EntityId> = sources
            .items(heap)
            .into_iter()
            .filter_map(|v| match v {
                Value::U32(raw) => Some(EntityId::from_raw(raw)),
                _ => None,
            })
            .collect();
        children.sort();
        children
    }

    fn entity_parent_set(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        parent: EntityId,
        events: &mut EventBuffer,
    ) -> EcsResult<()> {
        self.component_add_multiple(
            heap,
            registry,
            relationships,
            id,
            &[ComponentDef::new(PARENT_RELATIONSHIP)
                .with(TARGET_FIELD, Value::U32(parent.raw()))],
            events,
        )
    }

    fn component_has(&self, id: EntityId, name: &str) -> bool {
        self.locations
            .get(&id)
            .is_some_and(|&(aid, _)| self.archetypes[aid as usize].has_component(name))
    }

    fn component_row(&self, id: EntityId, name: &str) -> Option<Ptr> {
        let &(aid, index) = self.locations.get(&id)?;
        self.archetypes[aid as usize].row(name, index)
    }

    fn component_row_multiple(&self, id: EntityId, names: &[String]) -> Vec<Option<Ptr>> {
        names
            .iter()
            .map(|name| self.component_row(id, name))
            .collect()
    }

    fn component_names(&self, id: EntityId) -> Vec<String> {
        let Some(&(aid, _)) = self.locations.get(&id) else {
            return Vec::new();
        };
        self.archetypes[aid as usize]
            .names()
            .iter()
            .cloned()
            .collect()
    }

    fn component_add_multiple(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        defs: &[ComponentDef],
        events: &mut EventBuffer,
    ) -> EcsResult<()> {
        let (aid, index) = self.location(id)?;

        // Fail before mutating anything if a schema is missing.
        for def in defs {
            registry.layout(&def.name)?;
        }

        let mut old_targets: HashMap<String, EntityId> = HashMap::new();
        let mut fresh: Vec<(String, Ptr)> = Vec::new();

        for def in defs {
            if self.archetypes[aid as usize].has_component(&def.name) {
                // Re-initialize in place; no migration for this one.
                let row = self.archetypes[aid as usize]
                    .row(&def.name, index)
                    .ok_or_else(|| {
                        EcsError::InternalInvariant(format!(
                            "`{}` column lost its row on {id}",
                            def.name
                        ))
                    })?;
                if relationships.by_relationship(&def.name).is_some() {
                    let old = relationship::read_target(heap, registry, &def.name, row)?;
                    old_targets.insert(def.name.clone(), old);
                }
                let layout = registry.layout(&def.name)?;
                free_struct_dynamic(heap, &layout, row);
                heap.fill(row, layout.total_size as usize, 0);
                let view = StructRef::new(row, layout);
                for (field, value) in &def.values {
                    view.set(heap, field, value)?;
                }
            } else {
                fresh.push((def.name.clone(), Self::create_row(heap, registry, def)?));
            }
        }

        if !fresh.is_empty() {
            let mut rows = self.take_rows(id)?;
            rows.extend(fresh.into_iter());
            self.place_rows(id, rows);
            // The migration changed archetype membership for every
            // component the entity holds, not just the new ones.
            for name in self.component_names(id) {
                events.mark_dirty(&name);
            }
        }

        for def in defs {
            self.component_index
                .entry(def.name.clone())
                .or_default()
                .insert(id);
            events.push(EventData::ComponentAdded {
                entity: id,
                component: def.name.clone(),
            });
        }

        for def in defs {
            if relationships.by_relationship(&def.name).is_some() {
                relationship::on_relationship_added(
                    self,
                    heap,
                    registry,
                    relationships,
                    id,
                    &def.name,
                    old_targets.get(&def.name).copied(),
                    events,
                )?;
            }
        }
        Ok(())
    }

    fn component_remove_multiple(
        &mut self,
        heap: &mut Heap,
        registry: &ComponentRegistry,
        relationships: &RelationshipRegistry,
        id: EntityId,
        names: &[String],
        events: &mut EventBuffer,
    ) -> EcsResult<()> {
        self.remove_components_inner(heap, registry, relationships, id, names, true, events)
    }

    fn entity_view(
        &mut self,
        with: &[String],
        without: &[String],
        write_ticks: &HashMap<String, u64>,
        now: u64,
    ) -> Vec<EntityId> {
        let key = QueryKey::new(with, without);
        let archetypes = &self.archetypes;
        let ids = self.query_cache.lookup(key, write_ticks, now, |key| {
            archetypes
                .iter()
                .filter(|a| a.matches(key.with(), key.without()))
                .map(Archetype::id)
                .collect()
        });

        let mut entities = Vec::new();
        for aid in ids {
            match self.archetypes.get(aid as usize) {
                Some(archetype) => entities.extend_from_slice(archetype.entities()),
                None => {
                    tracing::trace!(aid, "skipping stale archetype id in cached query");
                }
            }
        }
        entities.sort();
        entities
    }

    fn component_view(
        &mut self,
        component: &str,
        without: &[String],
        write_ticks: &HashMap<String, u64>,
        now: u64,
    ) -> Vec<(EntityId, Ptr)> {
        let with = vec![component.to_string()];
        self.entity_view(&with, without, write_ticks, now)
            .into_iter()
            .filter_map(|id| self.component_row(id, component).map(|row| (id, row)))
            .collect()
    }

    fn cleanup(&mut self, heap: &mut Heap, registry: &ComponentRegistry) {
        let ids: Vec<EntityId> = self.locations.keys().copied().collect();
        for id in ids {
            if let Ok(rows) = self.take_rows(id) {
                for (name, row) in rows {
                    Self::free_row(heap, registry, &name, row);
                }
            }
        }
        self.archetypes.clear();
        self.archetype_index.clear();
        self.locations.clear();
        self.component_index.clear();
        self.allocator.clear();
        self.query_cache.clear();
        tracing::debug!("storage cleared");
    }
}
