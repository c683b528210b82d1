//! # Schedules
//!
//! The fixed set of execution phases. Startup phases run once during
//! engine initialization; the rest run every frame in whatever order the
//! embedding application drives them. The world tick boundary is defined
//! by [`Schedule::FixedUpdate`] entry and nothing else.

/// Execution phases, in their conventional frame order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Schedule {
    /// Earliest one-time startup phase.
    FirstStartup,
    /// Runs before `Startup`.
    PreStartup,
    /// Main one-time startup phase.
    Startup,
    /// Runs after `Startup`.
    PostStartup,
    /// Final one-time startup phase.
    LastStartup,
    /// First per-frame phase.
    First,
    /// Runs before `Update`.
    PreUpdate,
    /// Main per-frame phase.
    Update,
    /// Fixed-timestep phase; entering it advances the world tick.
    FixedUpdate,
    /// Flush phase after fixed-timestep work.
    FixedFlush,
    /// Runs after `Update`.
    PostUpdate,
    /// Render phase.
    Render,
    /// Final per-frame phase.
    Last,
}

impl Schedule {
    /// True for the one-time startup phases.
    #[must_use]
    pub const fn is_startup(self) -> bool {
        matches!(
            self,
            Self::FirstStartup
                | Self::PreStartup
                | Self::Startup
                | Self::PostStartup
                | Self::LastStartup
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_classification() {
        assert!(Schedule::FirstStartup.is_startup());
        assert!(Schedule::LastStartup.is_startup());
        assert!(!Schedule::FixedUpdate.is_startup());
        assert!(!Schedule::Render.is_startup());
    }
}
