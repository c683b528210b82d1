//! # Strata ECS
//!
//! The entity-component-system core of the engine:
//!
//! - **Entities** are opaque reused ids; **components** are
//!   schema-described rows in the engine heap.
//! - **Archetype storage** groups entities by exact component set,
//!   migrating rows as the set changes, with a query cache keyed by
//!   (with, without) filters and validated against component write
//!   ticks.
//! - **Relationships** keep source→target pairs bidirectionally
//!   consistent, with optional `linked_spawn` cascade deletion.
//!   Parent/child is the built-in instance.
//! - **The scheduler** runs systems per schedule, strictly
//!   sequentially, gated by run criteria and change detection.
//!
//! Execution is single-threaded cooperative: no system runs while
//! another is mid-body, and no storage structure tolerates concurrent
//! mutation.

pub mod archetype;
pub mod component;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod events;
pub mod plugin;
pub mod query;
pub mod relationship;
pub mod schedule;
pub mod scheduler;
pub mod storage;
pub mod system;
pub mod world;

pub use archetype::{Archetype, ArchetypeId};
pub use component::{ComponentDef, ComponentRegistry, EntityDefinition};
pub use config::EngineConfig;
pub use engine::Engine;
pub use entity::{EntityAllocator, EntityId};
pub use error::{EcsError, EcsResult};
pub use events::{EventBuffer, EventData, EventKind, Observers};
pub use plugin::Plugin;
pub use query::{QueryCache, QueryKey};
pub use relationship::{
    RelationshipMetadata, RelationshipRegistry, PARENT_RELATIONSHIP, PARENT_TARGET, SOURCES_FIELD,
    TARGET_FIELD,
};
pub use schedule::Schedule;
pub use scheduler::{MasterScheduler, SystemEntry};
pub use storage::{ArchetypeStorage, StorageBackend};
pub use system::System;
pub use world::World;
