use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::physics::Physics;
use crate::simulation::{LoopCancelled, Simulation};

pub use crate::simulation::InitialState;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to parse {}: {source}", .path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("invalid scenario '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// A level: named initial conditions plus optional physics overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub initial: InitialState,
    #[serde(default)]
    pub physics: Physics,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Default".into(),
            description: "Free fall from 90 m with a full tank.".into(),
            initial: InitialState::default(),
            physics: Physics::default(),
        }
    }
}

impl Scenario {
    pub fn from_ron(content: &str) -> Result<Self, ScenarioError> {
        Ok(ron::de::from_str::<Scenario>(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::de::from_str(&content).map_err(|source| ScenarioError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject initial conditions the integrator cannot fly meaningfully.
    ///
    /// [`Simulation::load_scenario`] itself accepts anything; this check is
    /// for callers that load untrusted level files.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let initial = &self.initial;
        let values = [
            ("x", initial.x),
            ("y", initial.y),
            ("vx", initial.vx),
            ("vy", initial.vy),
            ("angle", initial.angle),
            ("angular_velocity", initial.angular_velocity),
            ("fuel", initial.fuel.unwrap_or(0.0)),
        ];
        if let Some((field, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(self.invalid(format!("{field} is not a finite number")));
        }
        if initial.y < 0.0 {
            return Err(self.invalid(format!("starts below ground (y = {})", initial.y)));
        }
        if initial.fuel.is_some_and(|fuel| fuel < 0.0) {
            return Err(self.invalid("fuel is negative".into()));
        }

        let physics = &self.physics;
        if physics.dt <= 0.0 || !physics.dt.is_finite() {
            return Err(self.invalid("timestep must be positive".into()));
        }
        if physics.dry_mass <= 0.0 || physics.moment_of_inertia <= 0.0 {
            return Err(self.invalid("mass and inertia must be positive".into()));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> ScenarioError {
        ScenarioError::Invalid {
            name: self.name.clone(),
            reason,
        }
    }

    /// Install this scenario's physics and initial conditions.
    pub fn apply(&self, sim: &mut Simulation) -> Option<LoopCancelled> {
        sim.set_physics(self.physics);
        sim.load_scenario(self.initial)
    }
}

/// Levels indexed by number, loaded from `levelN.ron` files.
#[derive(Debug, Default)]
pub struct ScenarioLibrary {
    levels: BTreeMap<usize, Scenario>,
}

impl ScenarioLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `levelN.ron` in `dir`. Other files are ignored.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let dir = dir.as_ref();
        let io_err = |source| ScenarioError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut library = Self::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let Some(level_num) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(level_number)
            else {
                continue;
            };
            library.insert(level_num, Scenario::from_file(&path)?);
        }
        Ok(library)
    }

    pub fn process_level(&mut self, level_num: usize, content: &str) -> Result<(), ScenarioError> {
        let scenario = Scenario::from_ron(content)?;
        self.insert(level_num, scenario);
        Ok(())
    }

    pub fn insert(&mut self, level_num: usize, scenario: Scenario) {
        self.levels.insert(level_num, scenario);
    }

    pub fn get_level(&self, number: usize) -> Option<&Scenario> {
        self.levels.get(&number)
    }

    /// (level number, name) pairs in level order.
    pub fn available_levels(&self) -> Vec<(usize, &str)> {
        self.levels
            .iter()
            .map(|(num, scenario)| (*num, scenario.name.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// "level12.ron" -> Some(12)
fn level_number(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix("level")?
        .strip_suffix(".ron")?
        .parse()
        .ok()
}
