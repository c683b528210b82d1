//! # Archetypes
//!
//! An archetype is the set of entities sharing an identical
//! component-type set, plus per-component columns of row pointers into
//! the engine heap. Rows move between archetypes when an entity's
//! component set changes; removal is swap-remove, so row order inside an
//! archetype is not stable.

use std::collections::{BTreeSet, HashMap};

use strata_layout::Ptr;

use crate::entity::EntityId;

/// Index of an archetype within the storage's archetype list.
pub type ArchetypeId = u32;

/// One archetype: a component-name set and its member entities' rows.
pub struct Archetype {
    id: ArchetypeId,
    names: BTreeSet<String>,
    /// Member entities, indexed by row.
    entities: Vec<EntityId>,
    /// Row pointers per component type, parallel to `entities`.
    columns: HashMap<String, Vec<Ptr>>,
}

impl Archetype {
    /// Creates an empty archetype for a component-name set.
    #[must_use]
    pub fn new(id: ArchetypeId, names: BTreeSet<String>) -> Self {
        let columns = names
            .iter()
            .map(|n| (n.clone(), Vec::new()))
            .collect();
        Self {
            id,
            names,
            entities: Vec::new(),
            columns,
        }
    }

    /// This archetype's id.
    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The exact component-name set.
    #[must_use]
    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    /// Member entities in row order.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of member entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entity is a member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// True when this archetype has the component type.
    #[must_use]
    pub fn has_component(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// True when the name set contains every `with` entry and no
    /// `without` entry.
    #[must_use]
    pub fn matches(&self, with: &[String], without: &[String]) -> bool {
        with.iter().all(|n| self.names.contains(n))
            && !without.iter().any(|n| self.names.contains(n))
    }

    /// Appends an entity's rows, returning the new row index.
    ///
    /// # Panics
    ///
    /// Panics if `rows` does not cover exactly this archetype's
    /// component set - that is an internal invariant violation.
    pub fn push_row(&mut self, entity: EntityId, mut rows: HashMap<String, Ptr>) -> usize {
        let index = self.entities.len();
        self.entities.push(entity);
        for (name, column) in &mut self.columns {
            let ptr = rows.remove(name).unwrap_or_else(|| {
                panic!("archetype {} missing row for `{name}`", self.id)
            });
            column.push(ptr);
        }
        assert!(
            rows.is_empty(),
            "archetype {} received rows for components it does not hold",
            self.id
        );
        index
    }

    /// Swap-removes a row, returning its component rows and the entity
    /// that was moved into the vacated index (if any).
    pub fn swap_remove_row(
        &mut self,
        index: usize,
    ) -> (HashMap<String, Ptr>, Option<EntityId>) {
        self.entities.swap_remove(index);
        let mut rows = HashMap::with_capacity(self.columns.len());
        for (name, column) in &mut self.columns {
            rows.insert(name.clone(), column.swap_remove(index));
        }
        (rows, self.entities.get(index).copied())
    }

    /// The row pointer for one component of the entity at `index`.
    #[must_use]
    pub fn row(&self, name: &str, index: usize) -> Option<Ptr> {
        self.columns.get(name)?.get(index).copied()
    }
}

/// Canonical map key for a component-name set.
#[must_use]
pub fn signature_key(names: &BTreeSet<String>) -> Vec<String> {
    names.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn rows(list: &[(&str, u32)]) -> HashMap<String, Ptr> {
        list.iter()
            .map(|(n, p)| ((*n).to_string(), Ptr::new(*p)))
            .collect()
    }

    #[test]
    fn test_push_and_row_lookup() {
        let mut arch = Archetype::new(0, names(&["a", "b"]));
        let idx = arch.push_row(EntityId::from_raw(1), rows(&[("a", 100), ("b", 200)]));
        assert_eq!(idx, 0);
        assert_eq!(arch.row("a", 0), Some(Ptr::new(100)));
        assert_eq!(arch.row("b", 0), Some(Ptr::new(200)));
        assert_eq!(arch.row("c", 0), None);
    }

    #[test]
    fn test_swap_remove_moves_last_row() {
        let mut arch = Archetype::new(0, names(&["a"]));
        arch.push_row(EntityId::from_raw(1), rows(&[("a", 10)]));
        arch.push_row(EntityId::from_raw(2), rows(&[("a", 20)]));
        arch.push_row(EntityId::from_raw(3), rows(&[("a", 30)]));

        let (removed, moved) = arch.swap_remove_row(0);
        assert_eq!(removed.get("a"), Some(&Ptr::new(10)));
        assert_eq!(moved, Some(EntityId::from_raw(3)));
        assert_eq!(arch.row("a", 0), Some(Ptr::new(30)));
        assert_eq!(arch.len(), 2);
    }

    #[test]
    fn test_matches_with_without() {
        let arch = Archetype::new(0, names(&["pos", "vel"]));
        assert!(arch.matches(&["pos".to_string()], &[]));
        assert!(arch.matches(&["pos".to_string(), "vel".to_string()], &[]));
        assert!(!arch.matches(&["pos".to_string()], &["vel".to_string()]));
        assert!(!arch.matches(&["hp".to_string()], &[]));
        assert!(arch.matches(&[], &["hp".to_string()]));
    }
}
