use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use clap::Parser;

use lander_sim::events::EventKind;
use lander_sim::plugin::{ActiveSimulation, LanderSimPlugin, PaceMode, SimulationEvent};
use lander_sim::scenario::{Scenario, ScenarioLibrary};
use lander_sim::script::ScriptControl;

#[derive(Parser, Debug)]
#[command(name = "lander", about = "Planar lander simulation with scripted control")]
struct Args {
    /// Scenario file (RON); the default scenario when omitted
    #[arg(short, long, conflicts_with = "level")]
    scenario: Option<PathBuf>,

    /// Level number to load from the levels directory
    #[arg(short, long)]
    level: Option<usize>,

    /// Directory holding levelN.ron files
    #[arg(long, default_value = "assets/levels")]
    levels_dir: PathBuf,

    /// Control script (Rhai) defining `fn control()`
    #[arg(short, long)]
    control: Option<PathBuf>,

    /// Tick as fast as possible instead of in real time
    #[arg(long)]
    fast: bool,

    /// Stop after this many simulated seconds if still flying
    #[arg(long, default_value_t = 120.0)]
    max_time: f64,
}

#[derive(Resource)]
struct TimeLimit(f64);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let scenario = match (&args.scenario, args.level) {
        (Some(path), _) => Scenario::from_file(path)?,
        (None, Some(level)) => ScenarioLibrary::load_dir(&args.levels_dir)?
            .get_level(level)
            .cloned()
            .with_context(|| format!("no level {level} in {}", args.levels_dir.display()))?,
        (None, None) => Scenario::default(),
    };
    scenario.validate()?;

    let control = match &args.control {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "script".into());
            Some(ScriptControl::compile(&source)?.named(name))
        }
        None => None,
    };

    let (pace, wait) = if args.fast {
        (PaceMode::Stepped, Duration::ZERO)
    } else {
        (PaceMode::RealTime, Duration::from_secs_f64(scenario.physics.dt))
    };

    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(wait)),
        LogPlugin::default(),
        LanderSimPlugin {
            physics: scenario.physics,
            pace,
        },
    ))
    .insert_resource(TimeLimit(args.max_time))
    .add_systems(PostUpdate, (report_events, finish_when_done).chain());

    {
        let mut sim = app.world_mut().resource_mut::<ActiveSimulation>();
        scenario.apply(&mut sim);
        if let Some(control) = control {
            sim.set_control(control);
        }
    }

    info!("Level: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("{}", scenario.description);
    }

    match app.run() {
        AppExit::Success => Ok(()),
        AppExit::Error(code) => anyhow::bail!("simulation exited with code {code}"),
    }
}

fn report_events(mut events: EventReader<SimulationEvent>) {
    for SimulationEvent(event) in events.read() {
        if let EventKind::Console(line) = &event.kind {
            info!("[control] {line}");
        }
    }
}

fn finish_when_done(
    sim: Res<ActiveSimulation>,
    limit: Res<TimeLimit>,
    mut exit: EventWriter<AppExit>,
) {
    if sim.running() && sim.get_time() < limit.0 {
        return;
    }
    if sim.running() {
        warn!("time limit of {:.1}s reached while still flying", limit.0);
    }
    match sim.export_json() {
        Ok(json) => println!("{json}"),
        Err(err) => error!("failed to export state: {err}"),
    }
    exit.send(AppExit::Success);
}
