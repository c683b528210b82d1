//! # System Contract
//!
//! A system declares the component types it reads (for change-detection
//! gating), an optional run-criteria predicate, a one-time initialize
//! hook, a per-schedule update, and a cleanup hook. Execution order
//! within a schedule is registration order; change detection and run
//! criteria only ever skip a system, never reorder it.

use crate::error::EcsResult;
use crate::world::World;

/// One registered system.
pub trait System {
    /// Stable name, used in events and diagnostics.
    fn name(&self) -> &str;

    /// Component types whose writes should wake this system. Empty
    /// means "always run".
    fn component_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Extra per-tick gate; returning false skips this tick.
    fn run_criteria(&self, _world: &World) -> bool {
        true
    }

    /// One-time hook run during engine initialization.
    fn initialize(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// The system body.
    fn update(&mut self, world: &mut World) -> EcsResult<()>;

    /// Teardown hook run during engine cleanup.
    fn cleanup(&mut self, _world: &mut World) {}
}
