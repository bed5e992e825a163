// src/plugin.rs
use bevy::prelude::*;

use crate::events::SimEvent;
use crate::physics::Physics;
use crate::simulation::{InitialState, Simulation};

/// The hosted simulation.
#[derive(Resource, Deref, DerefMut)]
pub struct ActiveSimulation(pub Simulation);

/// How the host clock drives the integration loop.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaceMode {
    /// One tick per timestep of elapsed frame time.
    #[default]
    RealTime,
    /// Exactly one tick per frame, regardless of frame time.
    Stepped,
}

// Message types for host -> simulation
#[derive(Event, Clone, Debug, PartialEq)]
pub enum HostCommand {
    SetThrottle(f64),
    SetRcs(f64),
    FireThruster,
    Reset,
    LoadScenario(InitialState),
}

/// Simulation events forwarded to the host.
#[derive(Event, Clone, Debug, PartialEq)]
pub struct SimulationEvent(pub SimEvent);

/// Sending half handed to other threads. Commands apply before the next
/// frame's ticks, so an input change never lands inside a tick.
#[derive(Resource, Clone)]
pub struct CommandSender(pub crossbeam_channel::Sender<HostCommand>);

impl CommandSender {
    pub fn send(&self, command: HostCommand) -> bool {
        self.0.try_send(command).is_ok()
    }
}

#[derive(Resource)]
pub struct CommandChannel {
    pub receiver: crossbeam_channel::Receiver<HostCommand>,
}

impl CommandChannel {
    pub fn new() -> (Self, CommandSender) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { receiver }, CommandSender(sender))
    }
}

/// Hosts a [`Simulation`] inside a bevy app and paces it from bevy's clock.
#[derive(Default)]
pub struct LanderSimPlugin {
    pub physics: Physics,
    pub pace: PaceMode,
}

impl Plugin for LanderSimPlugin {
    fn build(&self, app: &mut App) {
        let (channel, sender) = CommandChannel::new();

        app.add_event::<HostCommand>()
            .add_event::<SimulationEvent>()
            .insert_resource(ActiveSimulation(Simulation::new(self.physics)))
            .insert_resource(self.pace)
            .insert_resource(channel)
            .insert_resource(sender)
            .add_systems(
                Update,
                (receive_commands, apply_commands, drive_simulation).chain(),
            );
    }
}

fn receive_commands(channel: Res<CommandChannel>, mut events: EventWriter<HostCommand>) {
    while let Ok(command) = channel.receiver.try_recv() {
        events.send(command);
    }
}

fn apply_commands(mut commands: EventReader<HostCommand>, mut sim: ResMut<ActiveSimulation>) {
    for command in commands.read() {
        match command {
            HostCommand::SetThrottle(value) => sim.set_throttle(*value),
            HostCommand::SetRcs(value) => sim.set_rcs(*value),
            HostCommand::FireThruster => sim.fire_thruster(),
            HostCommand::Reset => {
                sim.reset();
            }
            HostCommand::LoadScenario(initial) => {
                sim.load_scenario(*initial);
            }
        }
    }
}

pub fn drive_simulation(
    time: Res<Time>,
    pace: Res<PaceMode>,
    mut sim: ResMut<ActiveSimulation>,
    mut events: EventWriter<SimulationEvent>,
) {
    match *pace {
        PaceMode::RealTime => {
            sim.advance(time.delta_secs_f64());
        }
        PaceMode::Stepped => {
            sim.step();
        }
    }
    for event in sim.drain_events() {
        events.send(SimulationEvent(event));
    }
}
