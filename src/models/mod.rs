//! Built-in demo models, selected by name from `[simulation] model`.

pub mod random_walk;
pub mod worm;

use spark_common::SimulationConfig;

use crate::error::{Result, SparkError};
use crate::simulation::Model;

pub use random_walk::RandomWalk;
pub use worm::Worm;

pub const MODEL_NAMES: &[&str] = &[random_walk::NAME, worm::NAME];

/// Builds the model named in the configuration.
pub fn build_model(config: &SimulationConfig) -> Result<Box<dyn Model>> {
    match config.simulation.model.as_str() {
        random_walk::NAME => Ok(Box::new(RandomWalk::from_config(config))),
        worm::NAME => Ok(Box::new(Worm::from_config(config))),
        other => Err(SparkError::UnknownModel(other.to_string())),
    }
}
