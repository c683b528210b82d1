//! # Strata Engine Core
//!
//! One surface over the two load-bearing subsystems:
//!
//! - [`strata_layout`] - schema layout calculation, the TLSF heap, and
//!   the raw-buffer dynamic containers.
//! - [`strata_ecs`] - archetype storage, relationships, the query
//!   cache, and the schedule pipeline.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! let mut engine = Engine::with_defaults()?;
//! engine.world.register_component(
//!     "position",
//!     &[FieldSpec::new("x", "f32"), FieldSpec::new("y", "f32")],
//! )?;
//! engine.initialize()?;
//!
//! let id = engine.world.entity_create();
//! engine.world.component_add(
//!     id,
//!     ComponentDef::new("position").with("x", Value::F32(4.0)),
//! )?;
//! engine.update(Schedule::FixedUpdate, 1.0 / 60.0)?;
//! ```

pub use strata_ecs;
pub use strata_layout;

/// The names an embedding application usually wants in scope.
pub mod prelude {
    pub use strata_ecs::{
        ComponentDef, EcsError, EcsResult, Engine, EngineConfig, EntityDefinition, EntityId,
        EventData, EventKind, Plugin, Schedule, System, World,
    };
    pub use strata_layout::{
        DynArray, DynMap, DynSet, EnumDef, FieldSpec, Heap, LayoutError, LayoutResult, Ptr,
        SchemaLayout, StructRef, TypeResolver, Value,
    };
}
