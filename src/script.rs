use rhai::{CallFnOptions, Dynamic, Engine, Map as RhaiMap, Scope, AST, FLOAT, INT};
use std::cell::RefCell;
use std::sync::Arc;

use crate::control::{Control, ControlContext, ControlError, Yield};
use crate::physics;

/// Name of the function a control script must define.
pub const ENTRY_POINT: &str = "control";

// Lander view exchanged with registered functions while a script runs
#[derive(Debug, Clone, Default)]
struct ScriptIo {
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    angle: f64,
    angular_velocity: f64,
    fuel: f64,
    time: f64,
    first_timestep: bool,
    throttle: f64,
    rcs: f64,
    wait: f64,
    console: Vec<String>,
}

impl ScriptIo {
    fn from_context(ctx: &ControlContext<'_>) -> Self {
        let state = ctx.state();
        Self {
            x: state.x,
            y: state.y,
            vx: state.vx,
            vy: state.vy,
            angle: state.angle,
            angular_velocity: state.angular_velocity,
            fuel: state.fuel,
            time: state.current_time,
            first_timestep: state.first_timestep,
            throttle: state.throttle,
            rcs: state.rcs,
            wait: 0.0,
            console: Vec::new(),
        }
    }
}

// Thread-local storage for the lander view during script execution
thread_local! {
    static SCRIPT_IO: RefCell<ScriptIo> = RefCell::new(ScriptIo::default());
}

fn with_io<T>(f: impl FnOnce(&mut ScriptIo) -> T) -> T {
    SCRIPT_IO.with(|io| f(&mut io.borrow_mut()))
}

fn build_engine() -> Engine {
    let mut engine = Engine::new();

    // Sensors
    engine.register_fn("get_altitude", || with_io(|io| io.y));
    engine.register_fn("get_velocity", || with_io(|io| io.vy));
    engine.register_fn("get_horizontal_position", || with_io(|io| io.x));
    engine.register_fn("get_horizontal_velocity", || with_io(|io| io.vx));
    engine.register_fn("get_angle", || with_io(|io| io.angle));
    engine.register_fn("get_angular_velocity", || {
        with_io(|io| io.angular_velocity)
    });
    engine.register_fn("get_fuel", || with_io(|io| io.fuel));
    engine.register_fn("get_time", || with_io(|io| io.time));
    engine.register_fn("get_throttle", || with_io(|io| io.throttle));
    engine.register_fn("get_rcs", || with_io(|io| io.rcs));
    engine.register_fn("is_first_timestep", || with_io(|io| io.first_timestep));

    // Actuators; integer overloads so `set_throttle(1)` works
    engine.register_fn("set_throttle", |value: FLOAT| {
        with_io(|io| io.throttle = value.clamp(0.0, 1.0))
    });
    engine.register_fn("set_throttle", |value: INT| {
        with_io(|io| io.throttle = (value as FLOAT).clamp(0.0, 1.0))
    });
    engine.register_fn("set_rcs", |value: FLOAT| {
        with_io(|io| io.rcs = value.clamp(-1.0, 1.0))
    });
    engine.register_fn("set_rcs", |value: INT| {
        with_io(|io| io.rcs = (value as FLOAT).clamp(-1.0, 1.0))
    });
    engine.register_fn("fire_thruster", || with_io(|io| io.throttle = 1.0));

    // Timing and helpers
    engine.register_fn("wait", |seconds: FLOAT| {
        with_io(|io| io.wait += seconds.max(0.0))
    });
    engine.register_fn("wait", |seconds: INT| {
        with_io(|io| io.wait += (seconds as FLOAT).max(0.0))
    });
    engine.register_fn("angle_error", |target: FLOAT, current: FLOAT| {
        physics::angle_error(target, current)
    });

    engine.on_print(|text| with_io(|io| io.console.push(text.to_string())));

    // Disable unsafe operations
    engine.set_max_expr_depths(64, 64);
    engine.set_max_operations(100_000);
    engine.set_max_modules(0);
    engine.set_max_string_size(1_000_000);
    engine.disable_symbol("eval");

    engine
}

/// A control routine written in Rhai.
///
/// The script defines `fn control()`, called once per tick. Variables that
/// must survive between ticks live on `this`, an object map that is cleared
/// whenever the simulation is reset:
///
/// ```rhai
/// fn control() {
///     if is_first_timestep() { this.burns = 0; }
///     if get_velocity() < -5.0 { set_throttle(1.0); this.burns += 1; }
///     else { set_throttle(0.0); }
/// }
/// ```
///
/// `wait(seconds)` suspends the routine once the call returns; the tick
/// resumes after the wait without re-running the script.
pub struct ScriptControl {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    scope: Scope<'static>,
    memory: Dynamic,
    sleeping: bool,
    name: String,
}

impl ScriptControl {
    pub fn compile(source: &str) -> Result<Self, ControlError> {
        let engine = build_engine();
        let ast = engine
            .compile(source)
            .map_err(|e| ControlError::Compile(e.to_string()))?;

        let has_entry = ast
            .iter_functions()
            .any(|f| f.name == ENTRY_POINT && f.params.is_empty());
        if !has_entry {
            return Err(ControlError::Compile(format!(
                "script must define `fn {ENTRY_POINT}()`"
            )));
        }

        Ok(Self {
            engine: Arc::new(engine),
            ast: Arc::new(ast),
            scope: Scope::new(),
            memory: Dynamic::from_map(RhaiMap::new()),
            sleeping: false,
            name: "script".into(),
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Variables the script has stored on `this`.
    pub fn memory(&self) -> Option<RhaiMap> {
        self.memory.clone().try_cast::<RhaiMap>()
    }
}

impl Control for ScriptControl {
    fn update(&mut self, ctx: &mut ControlContext<'_>) -> Result<Yield, ControlError> {
        // Woken from a wait: the script already ran to completion
        if self.sleeping {
            self.sleeping = false;
            return Ok(Yield::Done);
        }

        SCRIPT_IO.with(|io| *io.borrow_mut() = ScriptIo::from_context(ctx));

        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut self.memory);
        let result = self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut self.scope,
            &self.ast,
            ENTRY_POINT,
            (),
        );

        let io = SCRIPT_IO.with(|io| std::mem::take(&mut *io.borrow_mut()));
        for line in io.console {
            ctx.print(line);
        }
        if let Err(err) = result {
            return Err(ControlError::Runtime(err.to_string()));
        }

        ctx.set_throttle(io.throttle);
        ctx.set_rcs(io.rcs);

        if io.wait > 0.0 {
            self.sleeping = true;
            Ok(ctx.wait(io.wait))
        } else {
            Ok(Yield::Done)
        }
    }

    fn reset(&mut self) {
        self.memory = Dynamic::from_map(RhaiMap::new());
        self.scope.clear();
        self.sleeping = false;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::simulation::{Simulation, TickOutcome};

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = ScriptControl::compile("fn other() { 1 }").err().unwrap();
        assert!(matches!(err, ControlError::Compile(_)));
    }

    #[test]
    fn syntax_error_is_a_compile_error() {
        let err = ScriptControl::compile("fn control() { set_throttle(").err().unwrap();
        assert!(matches!(err, ControlError::Compile(_)));
    }

    #[test]
    fn script_sets_inputs() {
        let script = ScriptControl::compile(
            "fn control() { set_throttle(0.5); set_rcs(-2); }",
        )
        .unwrap();
        let mut sim = Simulation::default();
        sim.set_control(script);
        sim.step();
        assert_eq!(sim.get_throttle(), 0.5);
        assert_eq!(sim.get_rcs(), -1.0);
        assert!(!sim.is_first_timestep());
    }

    #[test]
    fn script_reads_lander_state() {
        let script = ScriptControl::compile(
            r#"
            fn control() {
                if get_altitude() > 80.0 && get_fuel() > 0.0 {
                    fire_thruster();
                }
            }
            "#,
        )
        .unwrap();
        let mut sim = Simulation::default();
        sim.set_control(script);
        sim.step();
        assert_eq!(sim.get_throttle(), 1.0);
    }

    #[test]
    fn this_persists_between_ticks() {
        let script = ScriptControl::compile(
            r#"
            fn control() {
                if is_first_timestep() { this.count = 0; }
                this.count += 1;
                if this.count >= 3 { set_throttle(1.0); }
            }
            "#,
        )
        .unwrap();
        let mut sim = Simulation::default();
        sim.set_control(script);
        sim.step();
        sim.step();
        assert_eq!(sim.get_throttle(), 0.0);
        sim.step();
        assert_eq!(sim.get_throttle(), 1.0);
    }

    #[test]
    fn memory_clears_on_reset() {
        let mut script = ScriptControl::compile(
            r#"
            fn control() {
                if is_first_timestep() { this.count = 0; }
                this.count += 1;
            }
            "#,
        )
        .unwrap();
        let mut state = crate::simulation::LanderState::default();
        let mut events = Vec::new();
        for _ in 0..3 {
            let mut ctx = ControlContext::new(&mut state, &mut events);
            script.update(&mut ctx).unwrap();
            state.first_timestep = false;
        }
        let memory = script.memory().unwrap();
        assert_eq!(memory["count"].as_int().unwrap(), 3);

        script.reset();
        assert!(script.memory().unwrap().is_empty());
    }

    #[test]
    fn runtime_error_is_contained() {
        let script = ScriptControl::compile(
            "fn control() { set_throttle(0.9); undefined_function(); }",
        )
        .unwrap();
        let mut sim = Simulation::default();
        sim.set_control(script);
        assert_eq!(sim.step(), TickOutcome::Advanced);
        assert_eq!(sim.get_throttle(), 0.0);
        assert!(sim
            .drain_events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::ControlFailed { .. })));
    }

    #[test]
    fn runaway_script_hits_operation_limit() {
        let script = ScriptControl::compile("fn control() { loop { } }").unwrap();
        let mut sim = Simulation::default();
        sim.set_control(script);
        assert_eq!(sim.step(), TickOutcome::Advanced);
        assert!(sim
            .drain_events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::ControlFailed { .. })));
    }

    #[test]
    fn print_goes_to_console_events() {
        let script = ScriptControl::compile(r#"fn control() { print("hello"); }"#).unwrap();
        let mut sim = Simulation::default();
        sim.set_control(script);
        sim.step();
        let events = sim.drain_events();
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::Console("hello".into())));
    }

    #[test]
    fn wait_suspends_after_the_call() {
        let script = ScriptControl::compile(
            r#"
            fn control() {
                if is_first_timestep() { set_throttle(1.0); wait(0.5); }
            }
            "#,
        )
        .unwrap();
        let mut sim = Simulation::default();
        sim.set_control(script);

        assert_eq!(sim.advance(0.2), 0);
        assert!(sim.is_suspended());
        assert_eq!(sim.get_throttle(), 1.0);

        assert_eq!(sim.advance(0.31), 1);
        assert!(!sim.is_suspended());
        assert!(!sim.is_first_timestep());
    }

    #[test]
    fn angle_error_is_registered() {
        let script = ScriptControl::compile(
            "fn control() { set_rcs(angle_error(0.0, 0.5)); }",
        )
        .unwrap();
        let mut sim = Simulation::default();
        sim.set_control(script);
        sim.step();
        approx::assert_relative_eq!(sim.get_rcs(), -0.5, epsilon = 1e-12);
    }
}
