use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DRY_MASS, DT, FUEL_CONSUMPTION_RATE, GRAVITY, MOMENT_OF_INERTIA, RCS_TORQUE,
    SAFE_LANDING_SPEED, THRUSTER_FORCE,
};

/// Vehicle and world parameters used by the integrator.
///
/// Every field falls back to the standard constant when omitted from a
/// scenario file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Physics {
    pub gravity: f64,               // gravity acceleration (m/s²)
    pub dry_mass: f64,              // inertial mass of the lander (kg)
    pub max_thrust: f64,            // main engine force at full throttle (N)
    pub rcs_torque: f64,            // RCS torque at full deflection (N·m)
    pub moment_of_inertia: f64,     // kg·m²
    pub fuel_consumption_rate: f64, // kg/s at full throttle
    pub safe_landing_speed: f64,    // m/s
    pub dt: f64,                    // fixed timestep (s)
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            dry_mass: DRY_MASS,
            max_thrust: THRUSTER_FORCE,
            rcs_torque: RCS_TORQUE,
            moment_of_inertia: MOMENT_OF_INERTIA,
            fuel_consumption_rate: FUEL_CONSUMPTION_RATE,
            safe_landing_speed: SAFE_LANDING_SPEED,
            dt: DT,
        }
    }
}

impl Physics {
    /// Throttle at which vertical thrust exactly cancels gravity when upright.
    pub fn hover_throttle(&self) -> f64 {
        self.gravity * self.dry_mass / self.max_thrust
    }
}

// ---------------------------------------------------------------------------
// State vector and its time derivative
// ---------------------------------------------------------------------------

/// The six integrated components of the lander state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kinematics {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub angle: f64,
    pub angular_velocity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Derivative {
    pub dx: f64,
    pub dy: f64,
    pub dvx: f64,
    pub dvy: f64,
    pub dangle: f64,
    pub domega: f64,
}

impl Kinematics {
    /// Extrapolate the state along `d` for `h` seconds.
    pub fn apply(&self, d: &Derivative, h: f64) -> Self {
        Self {
            x: self.x + d.dx * h,
            y: self.y + d.dy * h,
            vx: self.vx + d.dvx * h,
            vy: self.vy + d.dvy * h,
            angle: self.angle + d.dangle * h,
            angular_velocity: self.angular_velocity + d.domega * h,
        }
    }

    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

/// Time derivative of the state for fixed control inputs.
///
/// Pure: thrust is suppressed on an empty tank but fuel is never consumed
/// here. Mass stays at `dry_mass` regardless of remaining fuel.
pub fn derivatives(
    state: &Kinematics,
    throttle: f64,
    rcs: f64,
    fuel: f64,
    physics: &Physics,
) -> Derivative {
    let effective_throttle = if fuel > 0.0 { throttle } else { 0.0 };

    // Body frame rotated by `angle`; 0 points straight up
    let thrust_x = effective_throttle * physics.max_thrust * state.angle.sin();
    let thrust_y = effective_throttle * physics.max_thrust * state.angle.cos();

    // Positive rcs commands clockwise torque
    let angular_accel = -rcs * physics.rcs_torque / physics.moment_of_inertia;

    Derivative {
        dx: state.vx,
        dy: state.vy,
        dvx: thrust_x / physics.dry_mass,
        dvy: thrust_y / physics.dry_mass - physics.gravity,
        dangle: state.angular_velocity,
        domega: angular_accel,
    }
}

// ---------------------------------------------------------------------------
// Classical 4th-order Runge-Kutta integrator
// ---------------------------------------------------------------------------

/// Single RK4 step with controls and fuel held constant over the step.
pub fn rk4_step(
    state: &Kinematics,
    throttle: f64,
    rcs: f64,
    fuel: f64,
    physics: &Physics,
    dt: f64,
) -> Kinematics {
    let k1 = derivatives(state, throttle, rcs, fuel, physics);
    let k2 = derivatives(&state.apply(&k1, dt * 0.5), throttle, rcs, fuel, physics);
    let k3 = derivatives(&state.apply(&k2, dt * 0.5), throttle, rcs, fuel, physics);
    let k4 = derivatives(&state.apply(&k3, dt), throttle, rcs, fuel, physics);

    let combined = Derivative {
        dx: k1.dx + 2.0 * k2.dx + 2.0 * k3.dx + k4.dx,
        dy: k1.dy + 2.0 * k2.dy + 2.0 * k3.dy + k4.dy,
        dvx: k1.dvx + 2.0 * k2.dvx + 2.0 * k3.dvx + k4.dvx,
        dvy: k1.dvy + 2.0 * k2.dvy + 2.0 * k3.dvy + k4.dvy,
        dangle: k1.dangle + 2.0 * k2.dangle + 2.0 * k3.dangle + k4.dangle,
        domega: k1.domega + 2.0 * k2.domega + 2.0 * k3.domega + k4.domega,
    };

    state.apply(&combined, dt / 6.0)
}

// ---------------------------------------------------------------------------
// Angle helpers
// ---------------------------------------------------------------------------

/// Wrap an angle into (-π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `current` to `target`, in (-π, π].
pub fn angle_error(target: f64, current: f64) -> f64 {
    wrap_angle(target - current)
}
