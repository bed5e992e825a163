#![allow(dead_code)]

use bevy::prelude::*;
use lander_sim::plugin::{ActiveSimulation, CommandSender, LanderSimPlugin, PaceMode, SimulationEvent};
use lander_sim::{Physics, SimEvent, Simulation, TickOutcome};

/// Step until the flight ends or `max_ticks` runs out. Returns the final
/// outcome and the number of ticks taken.
pub fn fly_until_done(sim: &mut Simulation, max_ticks: usize) -> (TickOutcome, usize) {
    for tick in 1..=max_ticks {
        match sim.step() {
            TickOutcome::Advanced => continue,
            outcome => return (outcome, tick),
        }
    }
    (TickOutcome::Advanced, max_ticks)
}

/// Events forwarded by the plugin, collected for inspection.
#[derive(Resource, Default)]
pub struct CollectedEvents(pub Vec<SimEvent>);

fn collect_events(mut reader: EventReader<SimulationEvent>, mut collected: ResMut<CollectedEvents>) {
    for SimulationEvent(event) in reader.read() {
        collected.0.push(event.clone());
    }
}

/// Headless bevy app hosting a simulation in stepped mode.
pub struct TestApp {
    pub app: App,
}

impl TestApp {
    pub fn new(physics: Physics) -> Self {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(LanderSimPlugin {
                physics,
                pace: PaceMode::Stepped,
            })
            .init_resource::<CollectedEvents>()
            .add_systems(PostUpdate, collect_events);
        Self { app }
    }

    pub fn run_frames(&mut self, frames: usize) {
        for _ in 0..frames {
            self.app.update();
        }
    }

    pub fn sender(&self) -> CommandSender {
        self.app.world().resource::<CommandSender>().clone()
    }

    pub fn sim(&self) -> &Simulation {
        &self.app.world().resource::<ActiveSimulation>().0
    }

    pub fn sim_mut(&mut self) -> Mut<ActiveSimulation> {
        self.app.world_mut().resource_mut::<ActiveSimulation>()
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.app.world().resource::<CollectedEvents>().0
    }
}
