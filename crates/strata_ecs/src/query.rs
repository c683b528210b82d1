//! # Query Cache
//!
//! Caches the archetype-id result set per (with, without) filter key.
//! A cached entry is revalidated when any involved component's
//! last-write tick is at or after the tick the entry was validated at.
//! Replayed entries skip archetype ids that no longer resolve.

use std::collections::HashMap;

use crate::archetype::ArchetypeId;

/// Canonical cache key: sorted `with` and `without` name lists.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    with: Vec<String>,
    without: Vec<String>,
}

impl QueryKey {
    /// Builds a canonical key from filter lists.
    #[must_use]
    pub fn new(with: &[String], without: &[String]) -> Self {
        let mut with = with.to_vec();
        let mut without = without.to_vec();
        with.sort();
        with.dedup();
        without.sort();
        without.dedup();
        Self { with, without }
    }

    /// Every component name the key involves.
    pub fn involved(&self) -> impl Iterator<Item = &String> {
        self.with.iter().chain(self.without.iter())
    }

    /// The required-component list.
    #[must_use]
    pub fn with(&self) -> &[String] {
        &self.with
    }

    /// The excluded-component list.
    #[must_use]
    pub fn without(&self) -> &[String] {
        &self.without
    }
}

struct CacheEntry {
    archetypes: Vec<ArchetypeId>,
    validated_at: u64,
}

/// Per-filter-signature cache of matching archetype ids.
#[derive(Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, CacheEntry>,
}

impl QueryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the archetype ids for `key`, recomputing via `rebuild`
    /// when no entry exists or any involved component was written at or
    /// after the entry's validation tick.
    pub fn lookup(
        &mut self,
        key: QueryKey,
        write_ticks: &HashMap<String, u64>,
        now: u64,
        rebuild: impl FnOnce(&QueryKey) -> Vec<ArchetypeId>,
    ) -> Vec<ArchetypeId> {
        if let Some(entry) = self.entries.get(&key) {
            let stale = key
                .involved()
                .any(|name| write_ticks.get(name).copied().unwrap_or(0) >= entry.validated_at);
            if !stale {
                tracing::trace!(?key, "query cache hit");
                return entry.archetypes.clone();
            }
            tracing::trace!(?key, "query cache invalidated");
        }

        let archetypes = rebuild(&key);
        let result = archetypes.clone();
        self.entries.insert(
            key,
            CacheEntry {
                archetypes,
                validated_at: now,
            },
        );
        result
    }

    /// Drops every cached entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
