//! # Engine Root
//!
//! The object an embedding application drives: the world, the master
//! scheduler, and the plugins, with the `initialize` / `update` /
//! `cleanup` lifecycle. One engine instance owns everything; nothing
//! here is process-wide.

use crate::config::EngineConfig;
use crate::error::{EcsError, EcsResult};
use crate::events::EventData;
use crate::plugin::Plugin;
use crate::schedule::Schedule;
use crate::system::System;
use crate::scheduler::MasterScheduler;
use crate::world::World;

/// The engine: world + scheduler + plugins.
pub struct Engine {
    /// The world. Public: systems and the embedding application work
    /// through it directly between schedule passes.
    pub world: World,
    scheduler: MasterScheduler,
    plugins: Vec<Box<dyn Plugin>>,
    plugin_names: Vec<String>,
    /// Name of the plugin currently running `build`, for system
    /// attribution.
    building_plugin: Option<String>,
}

impl Engine {
    /// Creates an engine from its configuration.
    pub fn new(config: &EngineConfig) -> EcsResult<Self> {
        Ok(Self {
            world: World::new(config)?,
            scheduler: MasterScheduler::new(),
            plugins: Vec::new(),
            plugin_names: Vec::new(),
            building_plugin: None,
        })
    }

    /// An engine with default configuration.
    pub fn with_defaults() -> EcsResult<Self> {
        Self::new(&EngineConfig::default())
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Registers a plugin: dependency check by exact name, then `build`.
    /// A false or failed build aborts registration.
    pub fn add_plugin(&mut self, mut plugin: Box<dyn Plugin>) -> EcsResult<()> {
        let name = plugin.name().to_string();
        if self.plugin_names.contains(&name) {
            return Err(EcsError::DuplicatePlugin(name));
        }
        for dependency in plugin.dependencies() {
            if !self.plugin_names.contains(&dependency) {
                return Err(EcsError::MissingPluginDependency {
                    plugin: name,
                    dependency,
                });
            }
        }

        self.building_plugin = Some(name.clone());
        let built = plugin.build(self);
        self.building_plugin = None;
        match built {
            Ok(true) => {}
            Ok(false) => return Err(EcsError::PluginBuildFailed(name)),
            Err(error) => {
                tracing::error!(plugin = %name, %error, "plugin build failed");
                return Err(error);
            }
        }

        self.plugin_names.push(name.clone());
        self.plugins.push(plugin);
        self.world.emit(EventData::PluginAdded { plugin: name });
        Ok(())
    }

    /// Registers a system into a schedule. Called directly or from a
    /// plugin's `build`, which attributes the system to that plugin.
    pub fn add_system(&mut self, schedule: Schedule, system: Box<dyn System>) {
        self.scheduler
            .add_system(schedule, system, self.building_plugin.clone());
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Runs the startup schedules and one-time system initialization.
    /// Calling twice logs a warning and returns without re-running.
    pub fn initialize(&mut self) -> EcsResult<()> {
        if self.world.initialized {
            tracing::warn!("engine already initialized, ignoring repeated initialize");
            return Ok(());
        }

        self.update(Schedule::FirstStartup, 0.0)?;
        self.update(Schedule::PreStartup, 0.0)?;
        self.update(Schedule::Startup, 0.0)?;

        for index in 0..self.scheduler.systems.len() {
            let entry = &mut self.scheduler.systems[index];
            entry.system.initialize(&mut self.world)?;
            let name = entry.system.name().to_string();
            self.world.emit(EventData::SystemInitialized { system: name });
        }

        self.update(Schedule::PostStartup, 0.0)?;
        self.update(Schedule::FixedFlush, 0.0)?;
        self.update(Schedule::LastStartup, 0.0)?;

        self.world.initialized = true;
        Ok(())
    }

    /// Runs one schedule pass. Entering `FixedUpdate` advances the world
    /// tick before anything else; the tick boundary is defined here and
    /// nowhere else.
    pub fn update(&mut self, schedule: Schedule, delta_time: f64) -> EcsResult<()> {
        if schedule == Schedule::FixedUpdate {
            self.world.advance_tick();
        }
        self.world.set_delta_time(delta_time);
        self.world.emit(EventData::ScheduleStarted { schedule });

        let plan = self.scheduler.plan_for(schedule);
        for index in plan {
            let entry = &mut self.scheduler.systems[index];

            if !entry.system.run_criteria(&self.world) {
                tracing::trace!(system = entry.system.name(), "skipped by run criteria");
                continue;
            }

            // Change detection: a system that declared dependencies and
            // has run before is skipped until a dependency is written at
            // or after its last run. A coarse gate, never an ordering.
            let dependencies = entry.system.component_dependencies();
            if !dependencies.is_empty() && entry.last_run_tick >= 0 {
                let changed = dependencies
                    .iter()
                    .any(|name| self.world.write_tick(name) as i64 >= entry.last_run_tick);
                if !changed {
                    tracing::trace!(system = entry.system.name(), "skipped by change detection");
                    continue;
                }
            }

            entry.system.update(&mut self.world)?;
            entry.last_run_tick = self.world.tick() as i64;
        }

        if schedule.is_startup() {
            self.run_plugin_startup_hooks(schedule)?;
        }

        self.world.emit(EventData::ScheduleEnded { schedule });
        Ok(())
    }

    /// Full teardown: storage cleanup, per-system cleanup, plugin
    /// removal, then all registries and observers. The engine returns to
    /// its pre-initialize state.
    pub fn cleanup(&mut self) {
        self.world.cleanup_storage();

        for index in 0..self.scheduler.systems.len() {
            let entry = &mut self.scheduler.systems[index];
            entry.system.cleanup(&mut self.world);
            let name = entry.system.name().to_string();
            self.world.emit(EventData::SystemCleanup { system: name });
        }

        let mut plugins = std::mem::take(&mut self.plugins);
        for plugin in &mut plugins {
            plugin.remove(&mut self.world);
            self.world.emit(EventData::PluginCleanup {
                plugin: plugin.name().to_string(),
            });
        }
        self.plugin_names.clear();

        self.scheduler.clear();
        self.world.clear_observers();
        self.world.initialized = false;
    }

    fn run_plugin_startup_hooks(&mut self, schedule: Schedule) -> EcsResult<()> {
        let mut plugins = std::mem::take(&mut self.plugins);
        let result = (|| {
            for plugin in &mut plugins {
                match schedule {
                    Schedule::FirstStartup => plugin.first_startup(&mut self.world)?,
                    Schedule::PreStartup => plugin.pre_startup(&mut self.world)?,
                    Schedule::PostStartup => plugin.post_startup(&mut self.world)?,
                    Schedule::LastStartup => plugin.last_startup(&mut self.world)?,
                    _ => {}
                }
            }
            Ok(())
        })();
        self.plugins = plugins;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDef;
    use std::cell::RefCell;
    use std::rc::Rc;
    use strata_layout::{FieldSpec, Value};

    struct CountingSystem {
        name: &'static str,
        dependencies: Vec<String>,
        runs: Rc<RefCell<u32>>,
    }

    impl System for CountingSystem {
        fn name(&self) -> &str {
            self.name
        }
        fn component_dependencies(&self) -> Vec<String> {
            self.dependencies.clone()
        }
        fn update(&mut self, _world: &mut World) -> EcsResult<()> {
            *self.runs.borrow_mut() += 1;
            Ok(())
        }
    }

    fn engine() -> Engine {
        let mut engine = Engine::with_defaults().unwrap();
        engine
            .world
            .register_component("position", &[FieldSpec::new("x", "f32")])
            .unwrap();
        engine
    }

    #[test]
    fn test_initialize_twice_is_tolerated() {
        let mut e = engine();
        e.initialize().unwrap();
        assert!(e.world.is_initialized());
        // Second call warns and returns.
        e.initialize().unwrap();
        assert!(e.world.is_initialized());
    }

    #[test]
    fn test_fixed_update_advances_tick() {
        let mut e = engine();
        e.initialize().unwrap();
        assert_eq!(e.world.tick(), 0);

        e.update(Schedule::FixedUpdate, 0.016).unwrap();
        assert_eq!(e.world.tick(), 1);
        e.update(Schedule::Update, 0.016).unwrap();
        assert_eq!(e.world.tick(), 1);
        e.update(Schedule::FixedUpdate, 0.016).unwrap();
        assert_eq!(e.world.tick(), 2);
    }

    #[test]
    fn test_change_detection_gates_system() {
        let mut e = engine();
        let runs = Rc::new(RefCell::new(0));
        e.add_system(
            Schedule::FixedUpdate,
            Box::new(CountingSystem {
                name: "watcher",
                dependencies: vec!["position".to_string()],
                runs: Rc::clone(&runs),
            }),
        );
        e.initialize().unwrap();

        // First run is unconditional.
        e.update(Schedule::FixedUpdate, 0.0).unwrap();
        assert_eq!(*runs.borrow(), 1);

        // No writes since: skipped.
        e.update(Schedule::FixedUpdate, 0.0).unwrap();
        e.update(Schedule::FixedUpdate, 0.0).unwrap();
        assert_eq!(*runs.borrow(), 1);

        // A write wakes it on the next pass.
        let id = e.world.entity_create();
        e.world
            .component_add(id, ComponentDef::new("position").with("x", Value::F32(1.0)))
            .unwrap();
        e.update(Schedule::FixedUpdate, 0.0).unwrap();
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn test_systems_without_dependencies_always_run() {
        let mut e = engine();
        let runs = Rc::new(RefCell::new(0));
        e.add_system(
            Schedule::Update,
            Box::new(CountingSystem {
                name: "always",
                dependencies: vec![],
                runs: Rc::clone(&runs),
            }),
        );
        e.initialize().unwrap();

        for _ in 0..3 {
            e.update(Schedule::Update, 0.0).unwrap();
        }
        assert_eq!(*runs.borrow(), 3);
    }

    struct RegisteringPlugin;
    impl Plugin for RegisteringPlugin {
        fn name(&self) -> &str {
            "registering"
        }
        fn build(&mut self, engine: &mut Engine) -> EcsResult<bool> {
            engine
                .world
                .register_component("marker", &[])
                .map(|_| true)
        }
    }

    struct NeedyPlugin;
    impl Plugin for NeedyPlugin {
        fn name(&self) -> &str {
            "needy"
        }
        fn dependencies(&self) -> Vec<String> {
            vec!["registering".to_string()]
        }
        fn build(&mut self, _engine: &mut Engine) -> EcsResult<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_plugin_dependency_check() {
        let mut e = engine();
        let err = e.add_plugin(Box::new(NeedyPlugin)).unwrap_err();
        assert!(matches!(err, EcsError::MissingPluginDependency { .. }));

        e.add_plugin(Box::new(RegisteringPlugin)).unwrap();
        e.add_plugin(Box::new(NeedyPlugin)).unwrap();
        assert!(e.world.component_is_registered("marker"));
    }

    #[test]
    fn test_cleanup_is_full_teardown() {
        let mut e = engine();
        let runs = Rc::new(RefCell::new(0));
        e.add_system(
            Schedule::Update,
            Box::new(CountingSystem {
                name: "s",
                dependencies: vec![],
                runs: Rc::clone(&runs),
            }),
        );
        e.initialize().unwrap();

        let id = e.world.entity_create();
        e.world
            .component_add(id, ComponentDef::new("position"))
            .unwrap();

        e.cleanup();
        assert!(!e.world.is_initialized());
        assert!(!e.world.entity_is_alive(id));
        assert_eq!(e.world.heap().live_allocations(), 0);

        // Post-cleanup updates run no systems.
        e.update(Schedule::Update, 0.0).unwrap();
        assert_eq!(*runs.borrow(), 0);
    }
}
