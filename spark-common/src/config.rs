use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::rational::Rational;
use crate::sim_params::{LayerParams, Neighborhood, PhysicsParams, SpaceParams};

/// Malformed or unreadable configuration. Always fatal at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML from '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid rational number '{0}'")]
    InvalidRational(String),
    #[error("space '{space}': {reason}")]
    InvalidSpace { space: String, reason: String },
    #[error("layer '{layer}': {reason}")]
    InvalidLayer { layer: String, reason: String },
    #[error("{0}")]
    Invalid(String),
}

/// Order in which the agents of one kind are stepped within a tick.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Creation order, stable across ticks.
    #[default]
    Serial,
    /// Creation order shuffled each tick with the simulation RNG.
    Shuffled,
}

/// What the engine does when a single agent's step fails.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentErrorPolicy {
    /// Log the failure and continue with the next agent.
    #[default]
    Skip,
    /// Log the failure and abort the run.
    Abort,
}

// Run settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    pub model: String,
    #[serde(default)]
    pub seed: u64,
    /// Seed from the wall clock at setup instead of `seed`.
    #[serde(default)]
    pub time_seed: bool,
    pub ticks: u64,
    #[serde(default)]
    pub time_step: Rational,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub agent_errors: AgentErrorPolicy,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_record_interval")]
    pub record_interval: u64,
    /// Free-form numeric model parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

fn default_record_interval() -> u64 {
    1
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhysicsConfig {
    #[serde(default = "default_physics_dt")]
    pub dt: f64,
    #[serde(default = "default_damping")]
    pub damping: f64,
    #[serde(default)]
    pub max_speed: Option<f64>,
    #[serde(default)]
    pub collision_stiffness: f64,
}

fn default_physics_dt() -> f64 {
    1.0
}

fn default_damping() -> f64 {
    0.9
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SpaceConfig {
    pub name: String,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    #[serde(default)]
    pub wrap: Vec<bool>,
    pub cell_size: f64,
    #[serde(default)]
    pub physics: Option<PhysicsConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub space: String,
    pub step: Vec<f64>,
    #[serde(default)]
    pub diffusion: f64,
    #[serde(default = "default_evaporation")]
    pub evaporation: f64,
    #[serde(default)]
    pub neighborhood: Neighborhood,
    #[serde(default)]
    pub initial: f64,
}

fn default_evaporation() -> f64 {
    1.0
}

/// How per-agent values are folded into one number.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    #[default]
    Sum,
    Mean,
    Min,
    Max,
}

/// What a data collector measures. Names are resolved against the running model.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    AgentCount {
        kind: String,
    },
    AgentVariable {
        kind: String,
        variable: String,
        #[serde(default)]
        aggregate: Aggregate,
    },
    LayerTotal {
        layer: String,
    },
    LayerMax {
        layer: String,
    },
    LayerMin {
        layer: String,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub name: String,
    pub source: DataSource,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default)]
    pub save_snapshots: bool,
    /// Include every node in recorded snapshots (can be large).
    #[serde(default = "default_true")]
    pub include_nodes: bool,
    #[serde(default)]
    pub save_positions: bool,
    #[serde(default)]
    pub save_data: bool,
    /// "json", "bincode" or "messagepack".
    #[serde(default)]
    pub format: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "spark".to_string(),
            save_snapshots: false,
            include_nodes: true,
            save_positions: false,
            save_data: false,
            format: None,
        }
    }
}

// Main simulation configuration, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub simulation: RunConfig,
    #[serde(default)]
    pub spaces: Vec<SpaceConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub collectors: Vec<CollectorConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads and validates the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let config_str = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        let config: SimulationConfig = toml::from_str(&config_str).map_err(|source| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.model.trim().is_empty() {
            return Err(ConfigError::Invalid("simulation.model must not be empty".into()));
        }
        if !self.simulation.time_step.is_positive() {
            return Err(ConfigError::Invalid(format!(
                "simulation.time_step must be positive (got {})",
                self.simulation.time_step
            )));
        }
        if self.simulation.record_interval == 0 {
            return Err(ConfigError::Invalid("simulation.record_interval must be at least 1".into()));
        }

        let mut spaces = Vec::with_capacity(self.spaces.len());
        for space in &self.spaces {
            if spaces.iter().any(|s: &SpaceParams| s.name == space.name) {
                return Err(ConfigError::InvalidSpace {
                    space: space.name.clone(),
                    reason: "duplicate space name".into(),
                });
            }
            space.physics_params()?;
            spaces.push(space.to_params()?);
        }

        for (i, layer) in self.layers.iter().enumerate() {
            if self.layers[..i].iter().any(|l| l.name == layer.name) {
                return Err(ConfigError::InvalidLayer {
                    layer: layer.name.clone(),
                    reason: "duplicate layer name".into(),
                });
            }
            let space = spaces.iter().find(|s| s.name == layer.space).ok_or_else(|| {
                ConfigError::InvalidLayer {
                    layer: layer.name.clone(),
                    reason: format!("unknown space '{}'", layer.space),
                }
            })?;
            layer.to_params(space)?;
        }
        Ok(())
    }

    /// Numeric model parameter with a fallback.
    pub fn parameter(&self, name: &str, default: f64) -> f64 {
        self.simulation.parameters.get(name).copied().unwrap_or(default)
    }
}

impl SpaceConfig {
    /// Converts the configuration into runtime space parameters.
    pub fn to_params(&self) -> Result<SpaceParams, ConfigError> {
        SpaceParams::from_bounds(&self.name, &self.min, &self.max, &self.wrap, self.cell_size)
    }

    /// Physics settings, if this space integrates forces.
    pub fn physics_params(&self) -> Result<Option<PhysicsParams>, ConfigError> {
        let Some(physics) = &self.physics else {
            return Ok(None);
        };
        let invalid = |reason: String| ConfigError::InvalidSpace { space: self.name.clone(), reason };
        if !(physics.dt > 0.0) {
            return Err(invalid(format!("physics.dt must be positive (got {})", physics.dt)));
        }
        if !(0.0..=1.0).contains(&physics.damping) {
            return Err(invalid(format!("physics.damping must be within [0, 1] (got {})", physics.damping)));
        }
        if physics.collision_stiffness < 0.0 {
            return Err(invalid("physics.collision_stiffness must be non-negative".into()));
        }
        let max_speed = physics.max_speed.unwrap_or(f64::INFINITY);
        if !(max_speed > 0.0) {
            return Err(invalid(format!("physics.max_speed must be positive (got {})", max_speed)));
        }
        Ok(Some(PhysicsParams {
            dt: physics.dt,
            damping: physics.damping,
            max_speed,
            collision_stiffness: physics.collision_stiffness,
        }))
    }
}

impl LayerConfig {
    pub fn to_params(&self, space: &SpaceParams) -> Result<LayerParams, ConfigError> {
        LayerParams::over_space(
            &self.name,
            space,
            &self.step,
            self.diffusion,
            self.evaporation,
            self.neighborhood,
            self.initial,
        )
    }
}
