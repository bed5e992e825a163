use thiserror::Error;

use crate::events::{EventKind, SimEvent};
use crate::physics;
use crate::simulation::LanderState;

/// What a control routine wants after an invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Yield {
    /// Finished for this tick; integration may proceed.
    Done,
    /// Suspend for this many seconds, then resume the routine in the same tick.
    ///
    /// Simulated time does not advance while a routine sleeps.
    Sleep(f64),
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("compilation error: {0}")]
    Compile(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("{0}")]
    Custom(String),
}

/// A replaceable control routine, invoked once per tick before integration.
///
/// Routines that need to wait return [`Yield::Sleep`] and are called again
/// when the sleep has elapsed; they keep track of where to resume themselves.
pub trait Control: Send + Sync {
    fn update(&mut self, ctx: &mut ControlContext<'_>) -> Result<Yield, ControlError>;

    /// Called when the loop that owned this routine is cancelled. Any
    /// in-flight invocation must be abandoned.
    fn reset(&mut self) {}

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Wraps a closure as a [`Control`].
pub struct FnControl<F> {
    name: String,
    f: F,
}

pub fn from_fn<F>(f: F) -> FnControl<F>
where
    F: FnMut(&mut ControlContext<'_>) -> Result<Yield, ControlError> + Send + Sync,
{
    FnControl {
        name: "closure".into(),
        f,
    }
}

impl<F> FnControl<F> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Control for FnControl<F>
where
    F: FnMut(&mut ControlContext<'_>) -> Result<Yield, ControlError> + Send + Sync,
{
    fn update(&mut self, ctx: &mut ControlContext<'_>) -> Result<Yield, ControlError> {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The lander as seen from inside a control routine.
pub struct ControlContext<'a> {
    state: &'a mut LanderState,
    events: &'a mut Vec<SimEvent>,
}

impl<'a> ControlContext<'a> {
    pub(crate) fn new(state: &'a mut LanderState, events: &'a mut Vec<SimEvent>) -> Self {
        Self { state, events }
    }

    pub fn state(&self) -> &LanderState {
        self.state
    }

    pub fn get_altitude(&self) -> f64 {
        self.state.y
    }

    /// Vertical velocity, positive up.
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

    pub fn get_time(&self) -> f64 {
        self.state.current_time
    }

    pub fn get_throttle(&self) -> f64 {
        self.state.throttle
    }

    pub fn get_rcs(&self) -> f64 {
        self.state.rcs
    }

    pub fn is_first_timestep(&self) -> bool {
        self.state.first_timestep
    }

    pub fn set_throttle(&mut self, value: f64) {
        self.state.set_throttle(value);
    }

    pub fn set_rcs(&mut self, value: f64) {
        self.state.set_rcs(value);
    }

    pub fn fire_thruster(&mut self) {
        self.state.set_throttle(1.0);
    }

    /// Suspend the routine for `seconds`: `return Ok(ctx.wait(1.5))`.
    pub fn wait(&self, seconds: f64) -> Yield {
        Yield::Sleep(seconds.max(0.0))
    }

    pub fn angle_error(&self, target: f64, current: f64) -> f64 {
        physics::angle_error(target, current)
    }

    pub fn print(&mut self, line: impl Into<String>) {
        self.events.push(SimEvent::new(
            self.state.current_time,
            EventKind::Console(line.into()),
        ));
    }
}
