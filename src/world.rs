//! Spaces, data layers, RNG and clock of one simulation.

use spark_common::{Rational, SimulationConfig};

use crate::data_layer::DataLayer;
use crate::error::{Result, SparkError};
use crate::random::RandomHelper;
use crate::space::Space;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) usize);

/// Everything the agents of a simulation share, other than each other.
#[derive(Debug)]
pub struct World {
    pub(crate) spaces: Vec<Space>,
    pub(crate) layers: Vec<DataLayer>,
    /// Owning space of each layer.
    pub(crate) layer_space: Vec<SpaceId>,
    pub(crate) rng: RandomHelper,
    pub(crate) tick: u64,
    pub(crate) time_step: Rational,
}

impl World {
    /// Builds spaces and layers from validated configuration.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        let mut spaces = Vec::with_capacity(config.spaces.len());
        for sc in &config.spaces {
            spaces.push(Space::new(sc.to_params()?).with_physics(sc.physics_params()?));
        }
        let mut world = World {
            spaces,
            layers: Vec::with_capacity(config.layers.len()),
            layer_space: Vec::with_capacity(config.layers.len()),
            rng: RandomHelper::new(config.simulation.seed),
            tick: 0,
            time_step: config.simulation.time_step,
        };
        for lc in &config.layers {
            let space = world.require_space(&lc.space)?;
            let params = lc.to_params(world.spaces[space.0].params())?;
            world.layers.push(DataLayer::new(params));
            world.layer_space.push(space);
        }
        Ok(world)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// `tick * time_step`, computed exactly before conversion.
    pub fn time(&self) -> f64 {
        self.time_step.times(self.tick).to_f64()
    }

    pub fn time_step(&self) -> Rational {
        self.time_step
    }

    pub fn rng(&mut self) -> &mut RandomHelper {
        &mut self.rng
    }

    /// Seed the generator streams were last derived from.
    pub fn rng_seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn space_id(&self, name: &str) -> Option<SpaceId> {
        self.spaces.iter().position(|s| s.name() == name).map(SpaceId)
    }

    pub fn require_space(&self, name: &str) -> Result<SpaceId> {
        self.space_id(name).ok_or_else(|| SparkError::UnknownSpace(name.to_string()))
    }

    pub fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.layers.iter().position(|l| l.name() == name).map(LayerId)
    }

    pub fn require_layer(&self, name: &str) -> Result<LayerId> {
        self.layer_id(name).ok_or_else(|| SparkError::UnknownLayer(name.to_string()))
    }

    pub fn space(&self, id: SpaceId) -> &Space {
        &self.spaces[id.0]
    }

    pub fn space_mut(&mut self, id: SpaceId) -> &mut Space {
        &mut self.spaces[id.0]
    }

    pub fn layer(&self, id: LayerId) -> &DataLayer {
        &self.layers[id.0]
    }

    pub fn layer_mut(&mut self, id: LayerId) -> &mut DataLayer {
        &mut self.layers[id.0]
    }

    pub fn layer_space(&self, id: LayerId) -> SpaceId {
        self.layer_space[id.0]
    }

    pub fn spaces(&self) -> &[Space] {
        &self.spaces
    }

    pub fn layers(&self) -> &[DataLayer] {
        &self.layers
    }
}
