//! # Master Scheduler
//!
//! Owns the registered systems and the per-schedule execution plans.
//! A plan is the ordered list of system indices for one schedule,
//! rebuilt only when registration changes mark it dirty - plan
//! rebuilding reacts to registration, not to per-tick state.

use std::collections::{HashMap, HashSet};

use crate::schedule::Schedule;
use crate::system::System;

/// A registered system with its execution bookkeeping.
pub struct SystemEntry {
    /// The system.
    pub system: Box<dyn System>,
    /// The plugin that registered it, if any.
    pub plugin: Option<String>,
    /// The schedule it runs in.
    pub schedule: Schedule,
    /// World tick of its last run; -1 before the first run.
    pub last_run_tick: i64,
}

/// Systems plus per-schedule execution plans.
#[derive(Default)]
pub struct MasterScheduler {
    pub(crate) systems: Vec<SystemEntry>,
    plans: HashMap<Schedule, Vec<usize>>,
    dirty: HashSet<Schedule>,
}

impl MasterScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a system, marking its schedule's plan dirty.
    pub fn add_system(
        &mut self,
        schedule: Schedule,
        system: Box<dyn System>,
        plugin: Option<String>,
    ) {
        tracing::debug!(system = system.name(), ?schedule, "system registered");
        self.systems.push(SystemEntry {
            system,
            plugin,
            schedule,
            last_run_tick: -1,
        });
        self.dirty.insert(schedule);
    }

    /// The execution plan for a schedule: system indices in registration
    /// order. Rebuilt only when dirty.
    pub fn plan_for(&mut self, schedule: Schedule) -> Vec<usize> {
        if self.dirty.remove(&schedule) || !self.plans.contains_key(&schedule) {
            let plan: Vec<usize> = self
                .systems
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.schedule == schedule)
                .map(|(index, _)| index)
                .collect();
            tracing::debug!(?schedule, systems = plan.len(), "execution plan rebuilt");
            self.plans.insert(schedule, plan);
        }
        self.plans[&schedule].clone()
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// True when no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Drops every system and plan.
    pub fn clear(&mut self) {
        self.systems.clear();
        self.plans.clear();
        self.dirty.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcsResult;
    use crate::world::World;

    struct Noop(&'static str);
    impl System for Noop {
        fn name(&self) -> &str {
            self.0
        }
        fn update(&mut self, _world: &mut World) -> EcsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_plan_is_registration_order() {
        let mut scheduler = MasterScheduler::new();
        scheduler.add_system(Schedule::Update, Box::new(Noop("a")), None);
        scheduler.add_system(Schedule::FixedUpdate, Box::new(Noop("b")), None);
        scheduler.add_system(Schedule::Update, Box::new(Noop("c")), None);

        assert_eq!(scheduler.plan_for(Schedule::Update), vec![0, 2]);
        assert_eq!(scheduler.plan_for(Schedule::FixedUpdate), vec![1]);
        assert!(scheduler.plan_for(Schedule::Render).is_empty());
    }

    #[test]
    fn test_plan_rebuilds_only_when_dirty() {
        let mut scheduler = MasterScheduler::new();
        scheduler.add_system(Schedule::Update, Box::new(Noop("a")), None);
        assert_eq!(scheduler.plan_for(Schedule::Update), vec![0]);

        scheduler.add_system(Schedule::Update, Box::new(Noop("b")), None);
        assert_eq!(scheduler.plan_for(Schedule::Update), vec![0, 1]);
    }
}
