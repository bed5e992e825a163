use crate::simulation::Status;

// ---------------------------------------------------------------------------
// Simulation events
// ---------------------------------------------------------------------------

/// Kinds of simulation events.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The tank reached exactly zero this tick.
    OutOfFuel,
    Landed {
        speed: f64,
        x: f64,
        angle_deg: f64,
    },
    Crashed {
        speed: f64,
        x: f64,
        angle_deg: f64,
    },
    /// The control routine failed; the tick went ahead with the prior inputs.
    ControlFailed { message: String },
    /// A reset or scenario load tore down a loop that was still flying.
    LoopCancelled { generation: u64 },
    /// Output printed by the control routine.
    Console(String),
}

/// A discrete event, stamped with the simulated time it occurred at.
#[derive(Debug, Clone, PartialEq)]
pub struct SimEvent {
    pub time: f64,
    pub kind: EventKind,
}

impl SimEvent {
    pub fn new(time: f64, kind: EventKind) -> Self {
        Self { time, kind }
    }

    pub(crate) fn touchdown(time: f64, status: Status, speed: f64, x: f64, angle: f64) -> Self {
        let angle_deg = angle.to_degrees();
        let kind = match status {
            Status::Crashed => EventKind::Crashed { speed, x, angle_deg },
            _ => EventKind::Landed { speed, x, angle_deg },
        };
        Self::new(time, kind)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Landed { .. } | EventKind::Crashed { .. })
    }
}

impl std::fmt::Display for SimEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[t={:.3}s] ", self.time)?;
        match &self.kind {
            EventKind::OutOfFuel => write!(f, "OUT OF FUEL!"),
            EventKind::Landed { speed, x, angle_deg } => write!(
                f,
                "LANDED SAFELY at {speed:.1} m/s (x={x:.1}m, angle={angle_deg:.1}°)"
            ),
            EventKind::Crashed { speed, x, angle_deg } => write!(
                f,
                "CRASHED at {speed:.1} m/s (x={x:.1}m, angle={angle_deg:.1}°)"
            ),
            EventKind::ControlFailed { message } => write!(f, "control error: {message}"),
            EventKind::LoopCancelled { generation } => {
                write!(f, "physics loop {generation} cancelled")
            }
            EventKind::Console(line) => write!(f, "{line}"),
        }
    }
}
