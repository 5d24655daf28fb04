pub mod config;
pub mod rational;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    Aggregate, AgentErrorPolicy, CollectorConfig, ConfigError, DataSource, ExecutionMode, LayerConfig,
    OutputConfig, PhysicsConfig, RunConfig, SimulationConfig, SpaceConfig,
};
pub use rational::Rational;
pub use sim_params::{AxisParams, LayerParams, Neighborhood, PhysicsParams, SpaceParams};
pub use snapshot::{DataRow, KindCount, LayerSnapshot, NodeSnapshot, Shape, Snapshot};
pub use vecmath::{angle_to_vec, clamp, vec_to_angle, Rgba, Vector};
