use bevy::log::debug;

use crate::control::Control;
use crate::events::{EventKind, SimEvent};
use crate::physics::{self, Physics};

mod runner;
mod state;

pub use runner::{LoopCancelled, TickOutcome};
pub use state::{InitialState, LanderState, StateSnapshot, Status, Touchdown};

use runner::LoopInstance;

/// An owned simulation context: state, control hook and the one active
/// integration loop.
pub struct Simulation {
    physics: Physics,
    state: LanderState,
    control: Option<Box<dyn Control>>,
    // Registered while the active routine slept; installed at the next tick
    pending_control: Option<Box<dyn Control>>,
    runner: LoopInstance,
    events: Vec<SimEvent>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(Physics::default())
    }
}

impl Simulation {
    /// Create a simulation at the default initial conditions with its loop
    /// started.
    pub fn new(physics: Physics) -> Self {
        Self {
            physics,
            state: LanderState::default(),
            control: None,
            pending_control: None,
            runner: LoopInstance::new(1),
            events: Vec::new(),
        }
    }

    /// Restart from the default initial conditions.
    pub fn reset(&mut self) -> Option<LoopCancelled> {
        self.restart(LanderState::default())
    }

    /// Restart from caller-supplied initial conditions. Values are taken as
    /// given apart from the angle wrap and a floor of zero on fuel.
    pub fn load_scenario(&mut self, initial: InitialState) -> Option<LoopCancelled> {
        self.restart(LanderState::from_initial(&initial))
    }

    /// Cancel the current loop before installing the new state, so no tick
    /// from the old loop can commit afterwards.
    fn restart(&mut self, state: LanderState) -> Option<LoopCancelled> {
        let cancelled = self.runner.cancel(&self.state);
        if let Some(cancelled) = &cancelled {
            debug!(
                "physics loop {} cancelled after {} ticks",
                cancelled.generation, cancelled.ticks
            );
            self.events.push(SimEvent::new(
                self.state.current_time,
                EventKind::LoopCancelled {
                    generation: cancelled.generation,
                },
            ));
        }
        if let Some(control) = self.control.as_mut() {
            control.reset();
        }
        if let Some(control) = self.pending_control.take() {
            self.control = Some(control);
        }

        self.state = state;
        self.runner = LoopInstance::new(self.runner.generation + 1);
        cancelled
    }

    /// Register the control routine; it is first called on the next tick.
    ///
    /// If the current routine is asleep mid-tick it still gets its resume,
    /// and the replacement takes over once that tick commits.
    pub fn set_control(&mut self, control: impl Control + 'static) {
        self.set_control_boxed(Box::new(control));
    }

    pub fn set_control_boxed(&mut self, control: Box<dyn Control>) {
        if self.runner.is_suspended() && self.control.is_some() {
            self.pending_control = Some(control);
        } else {
            self.control = Some(control);
        }
    }

    /// Remove the control routine. A routine taken out while asleep is reset
    /// and its tick completes without it.
    pub fn clear_control(&mut self) -> Option<Box<dyn Control>> {
        self.pending_control = None;
        let mut control = self.control.take();
        if self.runner.is_suspended() {
            if let Some(control) = control.as_mut() {
                control.reset();
            }
        }
        control
    }

    pub fn has_control(&self) -> bool {
        self.control.is_some() || self.pending_control.is_some()
    }

    /// Replace the physics parameters. Takes effect from the next tick.
    pub fn set_physics(&mut self, physics: Physics) {
        self.physics = physics;
    }

    pub fn physics(&self) -> &Physics {
        &self.physics
    }

    // -- control inputs ------------------------------------------------------

    pub fn set_throttle(&mut self, value: f64) {
        self.state.set_throttle(value);
    }

    pub fn set_rcs(&mut self, value: f64) {
        self.state.set_rcs(value);
    }

    /// Legacy helper: full throttle.
    pub fn fire_thruster(&mut self) {
        self.state.set_throttle(1.0);
    }

    // -- reads ---------------------------------------------------------------

    pub fn state(&self) -> &LanderState {
        &self.state
    }

    pub fn status(&self) -> Status {
        self.state.status
    }

    pub fn running(&self) -> bool {
        self.state.running()
    }

    pub fn crashed(&self) -> bool {
        self.state.crashed()
    }

    pub fn landed_safely(&self) -> bool {
        self.state.landed_safely()
    }

    pub fn get_altitude(&self) -> f64 {
        self.state.y
    }

    pub fn get_velocity(&self) -> f64 {
        self.state.vy
    }

    pub fn get_horizontal_position(&self) -> f64 {
        self.state.x
    }

    pub fn get_horizontal_velocity(&self) -> f64 {
        self.state.vx
    }

    pub fn get_angle(&self) -> f64 {
        self.state.angle
    }

    pub fn get_angular_velocity(&self) -> f64 {
        self.state.angular_velocity
    }

    pub fn get_fuel(&self) -> f64 {
        self.state.fuel
    }

    pub fn get_initial_fuel(&self) -> f64 {
        self.state.initial_fuel
    }

    pub fn fuel_fraction(&self) -> f64 {
        self.state.fuel_fraction()
    }

    pub fn get_throttle(&self) -> f64 {
        self.state.throttle
    }

    pub fn get_rcs(&self) -> f64 {
        self.state.rcs
    }

    pub fn get_time(&self) -> f64 {
        self.state.current_time
    }

    pub fn is_first_timestep(&self) -> bool {
        self.state.first_timestep
    }

    pub fn angle_error(target: f64, current: f64) -> f64 {
        physics::angle_error(target, current)
    }

    /// Generation of the active loop; bumps on every reset or load.
    pub fn generation(&self) -> u64 {
        self.runner.generation
    }

    /// Ticks committed by the active loop.
    pub fn ticks(&self) -> u64 {
        self.runner.ticks
    }

    /// True while the control routine is asleep in the middle of a tick.
    pub fn is_suspended(&self) -> bool {
        self.runner.is_suspended()
    }

    // -- export --------------------------------------------------------------

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        self.snapshot().to_json()
    }

    /// Take every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }
}
