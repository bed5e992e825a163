use bevy::log::{debug, info, warn};

use super::state::{LanderState, Status};
use super::Simulation;
use crate::control::{ControlContext, Yield};
use crate::events::{EventKind, SimEvent};
use crate::physics::rk4_step;

/// Where the active loop is within its tick cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Phase {
    /// Next action is a control invocation.
    Ready,
    /// The control routine is asleep mid-tick.
    Suspended { remaining: f64 },
    /// The sleep has elapsed; next action resumes the routine.
    Resume,
    /// The tick has committed; waiting out the rest of the timestep.
    Pacing { remaining: f64 },
}

/// One integration loop instance. Replaced wholesale on reset/load.
#[derive(Debug, Clone)]
pub(super) struct LoopInstance {
    pub(super) generation: u64,
    pub(super) phase: Phase,
    pub(super) ticks: u64,
    /// Throttle and RCS in effect when the current tick began.
    pub(super) tick_inputs: (f64, f64),
}

/// Teardown report for a loop cancelled by reset/load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopCancelled {
    pub generation: u64,
    pub ticks: u64,
    /// The control routine was asleep, so that tick was abandoned.
    pub mid_tick: bool,
    pub sim_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do: the simulation has terminated.
    Idle,
    Advanced,
    Landed,
    Crashed,
}

impl LoopInstance {
    pub(super) fn new(generation: u64) -> Self {
        Self {
            generation,
            phase: Phase::Ready,
            ticks: 0,
            tick_inputs: (0.0, 0.0),
        }
    }

    pub(super) fn is_suspended(&self) -> bool {
        matches!(self.phase, Phase::Suspended { .. } | Phase::Resume)
    }

    /// A loop over a terminated state has already exited; nothing to cancel.
    pub(super) fn cancel(&self, state: &LanderState) -> Option<LoopCancelled> {
        state.running().then(|| LoopCancelled {
            generation: self.generation,
            ticks: self.ticks,
            mid_tick: self.is_suspended(),
            sim_time: state.current_time,
        })
    }
}

impl Simulation {
    /// Advance by exactly one tick, without pacing.
    ///
    /// A sleeping control routine is resumed immediately, as often as it
    /// asks, before the tick commits.
    pub fn step(&mut self) -> TickOutcome {
        if !self.state.running() {
            return TickOutcome::Idle;
        }
        let generation = self.runner.generation;
        if self.runner.phase == Phase::Ready {
            self.begin_tick();
        }
        while let Yield::Sleep(_) = self.invoke_control() {}
        let outcome = self.commit_tick(generation);
        self.runner.phase = Phase::Ready;
        outcome
    }

    /// Free-running pace: let `elapsed` seconds of wall-clock time pass.
    ///
    /// Each tick sleeps one timestep after committing, and control routine
    /// sleeps hold the tick in place. Returns the number of ticks committed.
    pub fn advance(&mut self, elapsed: f64) -> usize {
        let dt = self.physics.dt;
        if !(dt > 0.0 && dt.is_finite()) {
            warn!("cannot pace a loop with timestep {dt}");
            return 0;
        }

        let generation = self.runner.generation;
        let mut budget = elapsed.max(0.0);
        let mut committed = 0;

        while self.runner.generation == generation && self.state.running() {
            match self.runner.phase {
                Phase::Pacing { remaining } => {
                    if budget < remaining {
                        self.runner.phase = Phase::Pacing {
                            remaining: remaining - budget,
                        };
                        break;
                    }
                    budget -= remaining;
                    self.runner.phase = Phase::Ready;
                }
                Phase::Suspended { remaining } => {
                    if budget < remaining {
                        self.runner.phase = Phase::Suspended {
                            remaining: remaining - budget,
                        };
                        break;
                    }
                    budget -= remaining;
                    self.runner.phase = Phase::Resume;
                }
                Phase::Ready | Phase::Resume => {
                    if self.runner.phase == Phase::Ready {
                        self.begin_tick();
                    }
                    match self.invoke_control() {
                        Yield::Sleep(seconds) => {
                            self.runner.phase = Phase::Suspended { remaining: seconds };
                        }
                        Yield::Done => {
                            self.commit_tick(generation);
                            committed += 1;
                            self.runner.phase = Phase::Pacing { remaining: dt };
                        }
                    }
                }
            }
        }

        committed
    }

    /// Start a fresh tick: a routine registered while the last one slept
    /// takes over here, and the inputs are recorded for rollback.
    fn begin_tick(&mut self) {
        if let Some(control) = self.pending_control.take() {
            self.control = Some(control);
        }
        self.runner.tick_inputs = (self.state.throttle, self.state.rcs);
    }

    /// Run (or resume) the control routine. A failure is logged and undone:
    /// the inputs from the start of the tick stay in effect.
    fn invoke_control(&mut self) -> Yield {
        let Some(control) = self.control.as_mut() else {
            return Yield::Done;
        };

        let (throttle, rcs) = self.runner.tick_inputs;
        let mut ctx = ControlContext::new(&mut self.state, &mut self.events);
        match control.update(&mut ctx) {
            Ok(Yield::Sleep(seconds)) => return Yield::Sleep(seconds.max(0.0)),
            Ok(Yield::Done) => {}
            Err(err) => {
                warn!("Error in control routine '{}': {}", control.name(), err);
                self.state.throttle = throttle;
                self.state.rcs = rcs;
                self.events.push(SimEvent::new(
                    self.state.current_time,
                    EventKind::ControlFailed {
                        message: err.to_string(),
                    },
                ));
            }
        }

        self.state.first_timestep = false;
        Yield::Done
    }

    /// Snapshot inputs, burn fuel, integrate, then resolve ground contact.
    fn commit_tick(&mut self, generation: u64) -> TickOutcome {
        if generation != self.runner.generation || !self.state.running() {
            debug!("discarding tick from stale loop {generation}");
            return TickOutcome::Idle;
        }

        let throttle = self.state.throttle;
        let rcs = self.state.rcs;
        let dt = self.physics.dt;

        if self.state.consume_fuel(throttle, &self.physics) {
            info!("OUT OF FUEL!");
            self.events
                .push(SimEvent::new(self.state.current_time, EventKind::OutOfFuel));
        }

        let next = rk4_step(
            &self.state.kinematics(),
            throttle,
            rcs,
            self.state.fuel,
            &self.physics,
            dt,
        );
        self.state.set_kinematics(next);
        self.state.current_time += dt;
        self.runner.ticks += 1;

        // No ceiling or horizontal boundaries
        let Some(touchdown) = self
            .state
            .resolve_ground_contact(self.physics.safe_landing_speed)
        else {
            return TickOutcome::Advanced;
        };

        let event = SimEvent::touchdown(
            self.state.current_time,
            touchdown.status,
            touchdown.speed,
            touchdown.x,
            touchdown.angle,
        );
        info!("{}", event);
        self.events.push(event);

        if touchdown.status == Status::Crashed {
            TickOutcome::Crashed
        } else {
            TickOutcome::Landed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{from_fn, ControlError};
    use crate::simulation::InitialState;

    #[test]
    fn first_advance_ticks_immediately() {
        let mut sim = Simulation::default();
        assert_eq!(sim.advance(0.0), 1);
        assert_eq!(sim.ticks(), 1);
        // Now pacing out the timestep
        assert_eq!(sim.advance(0.01), 0);
    }

    #[test]
    fn advance_paces_one_tick_per_timestep() {
        let mut sim = Simulation::default();
        sim.advance(0.0);
        // 0.1 s covers six more timesteps with room to spare
        assert_eq!(sim.advance(0.1), 6);
        assert_eq!(sim.ticks(), 7);
    }

    #[test]
    fn paced_and_stepped_trajectories_agree() {
        let mut paced = Simulation::default();
        let mut stepped = Simulation::default();
        paced.set_throttle(0.4);
        stepped.set_throttle(0.4);

        let ticks = paced.advance(0.5);
        for _ in 0..ticks {
            stepped.step();
        }
        assert_eq!(paced.state(), stepped.state());
    }

    #[test]
    fn sleeping_control_holds_the_tick() {
        let mut sim = Simulation::default();
        let mut slept = false;
        sim.set_control(from_fn(move |ctx| {
            if !slept {
                slept = true;
                return Ok(ctx.wait(0.5));
            }
            Ok(Yield::Done)
        }));

        assert_eq!(sim.advance(0.3), 0);
        assert!(sim.is_suspended());
        assert!(sim.is_first_timestep());
        assert_eq!(sim.get_time(), 0.0);

        // 0.2 s finishes the sleep, 0.1 s is left for pacing
        assert_eq!(sim.advance(0.3), 7);
        assert!(!sim.is_suspended());
        assert!(!sim.is_first_timestep());
    }

    #[test]
    fn step_resumes_sleepers_immediately() {
        let mut sim = Simulation::default();
        let mut calls = 0;
        sim.set_control(from_fn(move |ctx| {
            calls += 1;
            if calls % 2 == 1 {
                ctx.set_throttle(0.5);
                return Ok(ctx.wait(2.0));
            }
            Ok(Yield::Done)
        }));
        assert_eq!(sim.step(), TickOutcome::Advanced);
        assert_eq!(sim.ticks(), 1);
        assert_eq!(sim.get_throttle(), 0.5);
    }

    #[test]
    fn failing_control_keeps_prior_inputs() {
        let mut sim = Simulation::default();
        sim.set_throttle(0.25);
        sim.set_control(from_fn(|ctx| {
            ctx.set_throttle(1.0);
            Err(ControlError::Custom("boom".into()))
        }));

        assert_eq!(sim.step(), TickOutcome::Advanced);
        assert_eq!(sim.get_throttle(), 0.25);
        assert!(!sim.is_first_timestep());
        assert!(sim.running());

        let events = sim.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(&e.kind, EventKind::ControlFailed { message } if message == "boom")));

        // The loop keeps going
        assert_eq!(sim.step(), TickOutcome::Advanced);
        assert_eq!(sim.ticks(), 2);
    }

    #[test]
    fn replacement_waits_for_the_sleeping_routine() {
        let mut sim = Simulation::default();
        let mut calls = 0;
        sim.set_control(from_fn(move |ctx| {
            calls += 1;
            if calls == 1 {
                ctx.set_throttle(0.0);
                return Ok(ctx.wait(0.5));
            }
            ctx.set_rcs(0.5);
            Ok(Yield::Done)
        }));

        assert_eq!(sim.advance(0.1), 0);
        assert!(sim.is_suspended());
        sim.set_control(from_fn(|ctx| {
            ctx.set_throttle(1.0);
            Ok(Yield::Done)
        }));
        assert!(sim.has_control());

        // The sleeper finishes its own tick
        assert_eq!(sim.advance(0.41), 1);
        assert_eq!(sim.get_rcs(), 0.5);
        assert_eq!(sim.get_throttle(), 0.0);
        assert!(sim.get_velocity() < 0.0);

        // The replacement runs from the next tick on
        assert_eq!(sim.advance(0.02), 1);
        assert_eq!(sim.get_throttle(), 1.0);
    }

    #[test]
    fn clearing_a_sleeping_routine_completes_its_tick() {
        let mut sim = Simulation::default();
        sim.set_control(from_fn(|ctx| {
            ctx.set_throttle(0.6);
            Ok(ctx.wait(10.0))
        }));
        assert_eq!(sim.advance(0.0), 0);

        assert!(sim.clear_control().is_some());
        assert!(!sim.has_control());
        assert_eq!(sim.advance(10.0), 1);
        assert!(!sim.is_suspended());
        assert_eq!(sim.get_throttle(), 0.6);
    }

    #[test]
    fn failure_after_a_sleep_rolls_back_to_tick_start() {
        let mut sim = Simulation::default();
        sim.set_throttle(0.2);
        let mut calls = 0;
        sim.set_control(from_fn(move |ctx| {
            calls += 1;
            if calls == 1 {
                ctx.set_throttle(1.0);
                ctx.set_rcs(-0.7);
                return Ok(ctx.wait(0.3));
            }
            Err(ControlError::Custom("lost the plot".into()))
        }));

        assert_eq!(sim.step(), TickOutcome::Advanced);
        assert_eq!(sim.get_throttle(), 0.2);
        assert_eq!(sim.get_rcs(), 0.0);
    }

    #[test]
    fn advance_refuses_a_degenerate_timestep() {
        for dt in [0.0, -0.016, f64::NAN, f64::INFINITY] {
            let mut sim = Simulation::default();
            let mut physics = *sim.physics();
            physics.dt = dt;
            sim.set_physics(physics);

            assert_eq!(sim.advance(0.1), 0);
            assert_eq!(sim.ticks(), 0);
        }
    }

    #[test]
    fn terminated_simulation_is_idle() {
        let mut sim = Simulation::default();
        sim.load_scenario(InitialState {
            y: 0.001,
            vy: -1.0,
            ..Default::default()
        });
        assert_eq!(sim.step(), TickOutcome::Landed);
        assert_eq!(sim.step(), TickOutcome::Idle);
        assert_eq!(sim.advance(1.0), 0);
        assert_eq!(sim.ticks(), 1);
    }

    #[test]
    fn stale_generation_cannot_commit() {
        let mut sim = Simulation::default();
        let stale = sim.generation();
        sim.reset();
        let before = sim.state().clone();
        assert_eq!(sim.commit_tick(stale), TickOutcome::Idle);
        assert_eq!(sim.state(), &before);
    }
}
