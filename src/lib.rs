//! Deterministic fixed-timestep simulation of a planar lander.
//!
//! The lander is integrated with RK4 at a fixed timestep. Each tick a
//! replaceable control routine (a Rust [`Control`] or a Rhai
//! [`ScriptControl`]) reads the state and sets throttle and RCS before the
//! physics step. Ground contact ends the run as a safe landing or a crash.

pub mod constants;
pub mod control;
pub mod events;
pub mod physics;
pub mod plugin;
pub mod scenario;
pub mod script;
pub mod simulation;

pub use control::{from_fn, Control, ControlContext, ControlError, Yield};
pub use events::{EventKind, SimEvent};
pub use physics::Physics;
pub use plugin::LanderSimPlugin;
pub use scenario::{Scenario, ScenarioLibrary};
pub use script::ScriptControl;
pub use simulation::{
    InitialState, LanderState, LoopCancelled, Simulation, StateSnapshot, Status, TickOutcome,
};
