//! # Plugin Contract
//!
//! A plugin bundles component registration and systems. Registration
//! checks its dependencies by exact name against already-registered
//! plugins; `build` returning false or failing aborts registration.
//! Startup hooks fire when the matching startup schedule runs.

use crate::engine::Engine;
use crate::error::EcsResult;
use crate::world::World;

/// One registered plugin.
pub trait Plugin {
    /// Stable name, matched exactly by dependents.
    fn name(&self) -> &str;

    /// Names of plugins that must already be registered.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Registers components, relationships, and systems. Returning
    /// `Ok(false)` or an error aborts registration.
    fn build(&mut self, engine: &mut Engine) -> EcsResult<bool>;

    /// Teardown hook run during engine cleanup.
    fn remove(&mut self, _world: &mut World) {}

    /// Runs when the `FirstStartup` schedule completes.
    fn first_startup(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs when the `PreStartup` schedule completes.
    fn pre_startup(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs when the `PostStartup` schedule completes.
    fn post_startup(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Runs when the `LastStartup` schedule completes.
    fn last_startup(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }
}
