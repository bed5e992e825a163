// Physical constants (SI units)
pub const GRAVITY: f64 = 9.8; // m/s²
pub const DRY_MASS: f64 = 1.0; // kg, also the inertial mass (fuel is massless)
pub const FUEL_MASS: f64 = 0.5; // kg, standard full tank
pub const THRUSTER_FORCE: f64 = 50.0; // N (main engine at full throttle)
pub const RCS_TORQUE: f64 = 3.0; // N·m
pub const MOMENT_OF_INERTIA: f64 = 1.0; // kg·m²
pub const FUEL_CONSUMPTION_RATE: f64 = 0.15; // kg/s at full throttle

// Integration
pub const DT: f64 = 0.016; // seconds (~60 Hz)

// Touchdown faster than this is a crash
pub const SAFE_LANDING_SPEED: f64 = 10.0; // m/s

// Default initial conditions
pub const START_X: f64 = 0.0; // meters from center
pub const START_ALTITUDE: f64 = 90.0; // meters above ground
