use serde::{Deserialize, Serialize};

use crate::constants::{FUEL_MASS, START_ALTITUDE, START_X};
use crate::physics::{wrap_angle, Kinematics, Physics};

/// Flight status. `Crashed` and `Landed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Running,
    Crashed,
    Landed,
}

impl Status {
    pub fn is_running(self) -> bool {
        self == Status::Running
    }

    pub fn is_terminal(self) -> bool {
        !self.is_running()
    }
}

/// Initial conditions for a scenario load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialState {
    pub x: f64,                // horizontal position (m)
    pub y: f64,                // altitude (m)
    pub vx: f64,               // horizontal velocity (m/s)
    pub vy: f64,               // vertical velocity (m/s)
    pub angle: f64,            // orientation (radians, 0 = up)
    pub angular_velocity: f64, // rad/s
    pub fuel: Option<f64>,     // kg, full tank when omitted
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            x: START_X,
            y: START_ALTITUDE,
            vx: 0.0,
            vy: 0.0,
            angle: 0.0,
            angular_velocity: 0.0,
            fuel: None,
        }
    }
}

/// The canonical simulation record.
///
/// Only [`Simulation`](super::Simulation) hands out mutable access, which is
/// what keeps the field invariants (clamped inputs, wrapped angle, fuel
/// floor) intact.
#[derive(Debug, Clone, PartialEq)]
pub struct LanderState {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub angle: f64,
    pub angular_velocity: f64,
    pub fuel: f64,
    pub initial_fuel: f64,
    pub throttle: f64,
    pub rcs: f64,
    pub status: Status,
    pub current_time: f64,
    pub first_timestep: bool,
}

impl Default for LanderState {
    fn default() -> Self {
        Self::from_initial(&InitialState::default())
    }
}

/// Result of the ground-contact check for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touchdown {
    pub status: Status,
    pub speed: f64,
    pub x: f64,
    pub angle: f64,
}

impl LanderState {
    pub fn from_initial(initial: &InitialState) -> Self {
        let fuel = initial.fuel.unwrap_or(FUEL_MASS).max(0.0);
        Self {
            x: initial.x,
            y: initial.y,
            vx: initial.vx,
            vy: initial.vy,
            angle: wrap_angle(initial.angle),
            angular_velocity: initial.angular_velocity,
            fuel,
            initial_fuel: fuel,
            throttle: 0.0,
            rcs: 0.0,
            status: Status::Running,
            current_time: 0.0,
            first_timestep: true,
        }
    }

    pub fn kinematics(&self) -> Kinematics {
        Kinematics {
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            angle: self.angle,
            angular_velocity: self.angular_velocity,
        }
    }

    pub(crate) fn set_kinematics(&mut self, k: Kinematics) {
        self.x = k.x;
        self.y = k.y;
        self.vx = k.vx;
        self.vy = k.vy;
        self.angle = wrap_angle(k.angle);
        self.angular_velocity = k.angular_velocity;
    }

    pub(crate) fn set_throttle(&mut self, value: f64) {
        self.throttle = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
    }

    pub(crate) fn set_rcs(&mut self, value: f64) {
        self.rcs = if value.is_nan() {
            0.0
        } else {
            value.clamp(-1.0, 1.0)
        };
    }

    pub fn running(&self) -> bool {
        self.status.is_running()
    }

    pub fn crashed(&self) -> bool {
        self.status == Status::Crashed
    }

    pub fn landed_safely(&self) -> bool {
        self.status == Status::Landed
    }

    /// Remaining fuel as a fraction of the tank loaded at reset.
    pub fn fuel_fraction(&self) -> f64 {
        if self.initial_fuel > 0.0 {
            self.fuel / self.initial_fuel
        } else {
            0.0
        }
    }

    /// Burn fuel for one tick. Returns true when the tank just ran dry.
    pub(crate) fn consume_fuel(&mut self, throttle: f64, physics: &Physics) -> bool {
        if self.fuel <= 0.0 || throttle <= 0.0 {
            return false;
        }
        let consumed = physics.fuel_consumption_rate * throttle * physics.dt;
        self.fuel = (self.fuel - consumed).max(0.0);
        self.fuel == 0.0
    }

    /// Clamp to the ground and settle the flight outcome once `y <= 0`.
    pub(crate) fn resolve_ground_contact(&mut self, safe_speed: f64) -> Option<Touchdown> {
        if self.y > 0.0 {
            return None;
        }
        self.y = 0.0;
        let speed = self.kinematics().speed();
        self.status = if speed > safe_speed {
            Status::Crashed
        } else {
            Status::Landed
        };

        // The vehicle comes to rest whatever the outcome
        self.vx = 0.0;
        self.vy = 0.0;
        self.angular_velocity = 0.0;

        Some(Touchdown {
            status: self.status,
            speed,
            x: self.x,
            angle: self.angle,
        })
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            angle: self.angle,
            angular_velocity: self.angular_velocity,
            throttle: self.throttle,
            fuel: self.fuel,
            initial_fuel: self.initial_fuel,
            rcs_value: self.rcs,
            crashed: self.crashed(),
            landed_safely: self.landed_safely(),
        }
    }
}

/// Read-only export of the most recently committed tick, for renderers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub angle: f64,
    pub angular_velocity: f64,
    pub throttle: f64,
    pub fuel: f64,
    pub initial_fuel: f64,
    pub rcs_value: f64,
    pub crashed: bool,
    pub landed_safely: bool,
}

impl StateSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
