//! # Event Surface
//!
//! The fixed set of named events with typed payloads. Subscribers
//! register per event kind; notification is strictly sequential in
//! subscription order. Handlers receive payloads only - re-entrant world
//! mutation from inside a handler is not part of the contract.

use std::collections::HashMap;

use crate::entity::EntityId;
use crate::schedule::Schedule;

/// Which event a payload belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An entity was created.
    EntityCreated,
    /// An entity was deleted.
    EntityDeleted,
    /// An entity's parent was set or replaced.
    EntityParentSet,
    /// A child was attached to a parent.
    EntityChildAdded,
    /// A child was detached from a parent.
    EntityChildRemoved,
    /// A component was added to an entity.
    ComponentAdded,
    /// A component was removed from an entity.
    ComponentRemoved,
    /// A source entity was recorded on a relationship target.
    RelationshipSourceAdded,
    /// A relationship's target changed (set, replaced, or dropped).
    RelationshipSet,
    /// A system's one-time initialize hook ran.
    SystemInitialized,
    /// A system's cleanup hook ran.
    SystemCleanup,
    /// A plugin finished registration.
    PluginAdded,
    /// A plugin's remove hook ran.
    PluginCleanup,
    /// A schedule pass began.
    ScheduleStarted,
    /// A schedule pass ended.
    ScheduleEnded,
}

/// One event with its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum EventData {
    /// See [`EventKind::EntityCreated`].
    EntityCreated {
        /// The new entity.
        entity: EntityId,
    },
    /// See [`EventKind::EntityDeleted`].
    EntityDeleted {
        /// The deleted entity.
        entity: EntityId,
    },
    /// See [`EventKind::EntityParentSet`].
    EntityParentSet {
        /// The child entity.
        entity: EntityId,
        /// Its new parent, if any.
        parent: Option<EntityId>,
    },
    /// See [`EventKind::EntityChildAdded`].
    EntityChildAdded {
        /// The parent entity.
        parent: EntityId,
        /// The attached child.
        child: EntityId,
    },
    /// See [`EventKind::EntityChildRemoved`].
    EntityChildRemoved {
        /// The parent entity.
        parent: EntityId,
        /// The detached child.
        child: EntityId,
    },
    /// See [`EventKind::ComponentAdded`].
    ComponentAdded {
        /// The entity gaining the component.
        entity: EntityId,
        /// The component type name.
        component: String,
    },
    /// See [`EventKind::ComponentRemoved`].
    ComponentRemoved {
        /// The entity losing the component.
        entity: EntityId,
        /// The component type name.
        component: String,
    },
    /// See [`EventKind::RelationshipSourceAdded`].
    RelationshipSourceAdded {
        /// The entity holding the relationship component.
        source: EntityId,
        /// The entity being pointed at.
        target: EntityId,
        /// The relationship component name.
        relationship: String,
    },
    /// See [`EventKind::RelationshipSet`].
    RelationshipSet {
        /// The entity holding the relationship component.
        source: EntityId,
        /// The relationship component name.
        relationship: String,
        /// The previous target, if any.
        old_target: Option<EntityId>,
        /// The new target, if any.
        new_target: Option<EntityId>,
    },
    /// See [`EventKind::SystemInitialized`].
    SystemInitialized {
        /// The system name.
        system: String,
    },
    /// See [`EventKind::SystemCleanup`].
    SystemCleanup {
        /// The system name.
        system: String,
    },
    /// See [`EventKind::PluginAdded`].
    PluginAdded {
        /// The plugin name.
        plugin: String,
    },
    /// See [`EventKind::PluginCleanup`].
    PluginCleanup {
        /// The plugin name.
        plugin: String,
    },
    /// See [`EventKind::ScheduleStarted`].
    ScheduleStarted {
        /// The schedule.
        schedule: Schedule,
    },
    /// See [`EventKind::ScheduleEnded`].
    ScheduleEnded {
        /// The schedule.
        schedule: Schedule,
    },
}

impl EventData {
    /// The kind this payload belongs to.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::EntityCreated { .. } => EventKind::EntityCreated,
            Self::EntityDeleted { .. } => EventKind::EntityDeleted,
            Self::EntityParentSet { .. } => EventKind::EntityParentSet,
            Self::EntityChildAdded { .. } => EventKind::EntityChildAdded,
            Self::EntityChildRemoved { .. } => EventKind::EntityChildRemoved,
            Self::ComponentAdded { .. } => EventKind::ComponentAdded,
            Self::ComponentRemoved { .. } => EventKind::ComponentRemoved,
            Self::RelationshipSourceAdded { .. } => EventKind::RelationshipSourceAdded,
            Self::RelationshipSet { .. } => EventKind::RelationshipSet,
            Self::SystemInitialized { .. } => EventKind::SystemInitialized,
            Self::SystemCleanup { .. } => EventKind::SystemCleanup,
            Self::PluginAdded { .. } => EventKind::PluginAdded,
            Self::PluginCleanup { .. } => EventKind::PluginCleanup,
            Self::ScheduleStarted { .. } => EventKind::ScheduleStarted,
            Self::ScheduleEnded { .. } => EventKind::ScheduleEnded,
        }
    }
}

/// Events and write marks accumulated during one storage operation,
/// applied by the world when the operation completes.
#[derive(Debug, Default)]
pub struct EventBuffer {
    /// Events in emission order.
    pub events: Vec<EventData>,
    /// Component types mutated during the operation.
    pub dirty_components: Vec<String>,
}

impl EventBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event. Component add/remove events also mark the
    /// component type as written.
    pub fn push(&mut self, event: EventData) {
        match &event {
            EventData::ComponentAdded { component, .. }
            | EventData::ComponentRemoved { component, .. } => {
                self.mark_dirty(component);
            }
            _ => {}
        }
        self.events.push(event);
    }

    /// Marks a component type as written this operation.
    pub fn mark_dirty(&mut self, component: &str) {
        if !self.dirty_components.iter().any(|c| c == component) {
            self.dirty_components.push(component.to_string());
        }
    }
}

/// Per-event-kind subscriber lists.
#[derive(Default)]
pub struct Observers {
    handlers: HashMap<EventKind, Vec<Box<dyn FnMut(&EventData)>>>,
}

impl Observers {
    /// Creates an empty observer registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a handler to one event kind.
    pub fn subscribe(&mut self, kind: EventKind, handler: Box<dyn FnMut(&EventData)>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Notifies subscribers of one event, sequentially.
    pub fn notify(&mut self, event: &EventData) {
        if let Some(list) = self.handlers.get_mut(&event.kind()) {
            for handler in list.iter_mut() {
                handler(event);
            }
        }
    }

    /// Drops every subscription.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
