//! # ECS Error Types
//!
//! Configuration and registration failures are hard errors; internal
//! invariant violations are logged at error severity and thrown, never
//! healed. Expected-absence conditions (a relationship pointing at a
//! dead entity, a stale cache entry) are handled locally and do not
//! appear here.

use thiserror::Error;

use crate::entity::EntityId;

/// Errors that can occur in the ECS core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A plugin named a dependency that is not registered.
    #[error("plugin `{plugin}` depends on `{dependency}`, which is not registered")]
    MissingPluginDependency {
        /// The plugin being registered.
        plugin: String,
        /// The missing dependency, by exact name.
        dependency: String,
    },

    /// A plugin was registered twice.
    #[error("plugin `{0}` is already registered")]
    DuplicatePlugin(String),

    /// A plugin's build hook returned false or failed.
    #[error("plugin `{0}` build aborted registration")]
    PluginBuildFailed(String),

    /// A component name has no registered schema.
    #[error("component `{0}` is not registered")]
    ComponentNotRegistered(String),

    /// An entity id does not refer to a live entity.
    #[error("entity {0} does not exist")]
    EntityNotFound(EntityId),

    /// A component was expected on an entity but is absent.
    #[error("entity {entity} has no `{component}` component")]
    MissingComponent {
        /// The entity.
        entity: EntityId,
        /// The missing component type.
        component: String,
    },

    /// A relationship pairing was registered twice.
    #[error("relationship `{0}` is already registered")]
    DuplicateRelationship(String),

    /// A relationship pairing references components without the required
    /// fields.
    #[error("relationship `{relationship}` is invalid: {reason}")]
    InvalidRelationship {
        /// The relationship component name.
        relationship: String,
        /// What was wrong.
        reason: String,
    },

    /// The engine configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal consistency was violated. Not recovered from.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// A layout-engine failure surfaced through an ECS operation.
    #[error(transparent)]
    Layout(#[from] strata_layout::LayoutError),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;
