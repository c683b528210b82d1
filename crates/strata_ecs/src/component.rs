//! # Component Registry
//!
//! Component types are schema-described structs registered by name. A
//! live component instance is one heap row of the component's layout;
//! the registry owns the resolver and the name→layout table.

use std::collections::HashMap;
use std::sync::Arc;

use strata_layout::{EnumDef, FieldSpec, SchemaLayout, TypeResolver, Value};

use crate::error::{EcsError, EcsResult};

/// Initial field values for one component on one entity.
#[derive(Clone, Debug)]
pub struct ComponentDef {
    /// The component type name.
    pub name: String,
    /// Scalar field values applied in order after the row is zeroed.
    /// Container fields start empty and are filled through views.
    pub values: Vec<(String, Value)>,
}

impl ComponentDef {
    /// A component with all-default (zeroed) fields.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: Vec::new(),
        }
    }

    /// Adds an initial field value.
    #[must_use]
    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.values.push((field.to_string(), value));
        self
    }
}

/// A declarative entity subtree: initial components plus children spawned
/// depth-first with this entity as their parent.
#[derive(Clone, Debug, Default)]
pub struct EntityDefinition {
    /// Components the entity starts with.
    pub components: Vec<ComponentDef>,
    /// Child subtrees.
    pub children: Vec<EntityDefinition>,
}

impl EntityDefinition {
    /// An empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an initial component.
    #[must_use]
    pub fn component(mut self, def: ComponentDef) -> Self {
        self.components.push(def);
        self
    }

    /// Adds a child subtree.
    #[must_use]
    pub fn child(mut self, child: EntityDefinition) -> Self {
        self.children.push(child);
        self
    }
}

/// Name→layout registry for component types, plus the underlying type
/// resolver for plain structs and enums. One per world.
#[derive(Default)]
pub struct ComponentRegistry {
    resolver: TypeResolver,
    components: HashMap<String, Arc<SchemaLayout>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component type, computing its layout.
    pub fn register_component(
        &mut self,
        name: &str,
        fields: &[FieldSpec],
    ) -> EcsResult<Arc<SchemaLayout>> {
        let layout = self.resolver.register_struct(name, fields)?;
        self.components.insert(name.to_string(), Arc::clone(&layout));
        Ok(layout)
    }

    /// Registers a plain struct type usable inside component schemas.
    pub fn register_struct(
        &mut self,
        name: &str,
        fields: &[FieldSpec],
    ) -> EcsResult<Arc<SchemaLayout>> {
        Ok(self.resolver.register_struct(name, fields)?)
    }

    /// Registers an enum type.
    pub fn register_enum(&mut self, def: EnumDef) -> EcsResult<()> {
        Ok(self.resolver.register_enum(def)?)
    }

    /// The layout of a registered component.
    pub fn layout(&self, name: &str) -> EcsResult<Arc<SchemaLayout>> {
        self.components
            .get(name)
            .cloned()
            .ok_or_else(|| EcsError::ComponentNotRegistered(name.to_string()))
    }

    /// Whether `name` is a registered component type.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Validates that every named component is registered.
    pub fn validate_dependencies(&self, names: &[String]) -> EcsResult<()> {
        for name in names {
            if !self.is_registered(name) {
                return Err(EcsError::ComponentNotRegistered(name.clone()));
            }
        }
        Ok(())
    }

    /// The underlying type resolver.
    #[must_use]
    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_registration_and_lookup() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_component(
                "position",
                &[FieldSpec::new("x", "f32"), FieldSpec::new("y", "f32")],
            )
            .unwrap();

        assert!(registry.is_registered("position"));
        assert!(!registry.is_registered("velocity"));
        assert_eq!(registry.layout("position").unwrap().total_size, 8);
        assert!(matches!(
            registry.layout("velocity").unwrap_err(),
            EcsError::ComponentNotRegistered(_)
        ));
    }

    #[test]
    fn test_plain_structs_are_not_components() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_struct("vec2", &[FieldSpec::new("x", "f32"), FieldSpec::new("y", "f32")])
            .unwrap();

        assert!(!registry.is_registered("vec2"));
        // But components can embed it.
        registry
            .register_component("transform", &[FieldSpec::new("translation", "vec2")])
            .unwrap();
        assert_eq!(registry.layout("transform").unwrap().total_size, 8);
    }

    #[test]
    fn test_validate_dependencies() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_component("health", &[FieldSpec::new("current", "u32")])
            .unwrap();

        assert!(registry.validate_dependencies(&["health".to_string()]).is_ok());
        let err = registry
            .validate_dependencies(&["health".to_string(), "mana".to_string()])
            .unwrap_err();
        assert!(matches!(err, EcsError::ComponentNotRegistered(n) if n == "mana"));
    }
}
