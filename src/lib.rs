//! Spatial agent-based simulation engine.
//!
//! A [`Simulation`] owns one model's [`World`] (spaces, data layers, RNG, clock) and its
//! agents, and advances them tick by tick with staged commits.

pub mod agent;
pub mod agent_table;
pub mod collector;
pub mod context;
pub mod data_layer;
pub mod error;
pub mod grid;
pub mod models;
pub mod node;
pub mod physics;
pub mod random;
pub mod simulation;
pub mod space;
pub mod world;

pub use agent::{AgentBox, AgentId, KindFilter, KindId, KindRegistry, KindSpec, Steppable};
pub use agent_table::{AgentTable, LifeState};
pub use collector::{CsvProcessor, DataCollector, DataProcessor};
pub use context::Context;
pub use data_layer::DataLayer;
pub use error::{Result, SparkError};
pub use node::{Body, NodeId, NodeSpec, SpaceNode};
pub use random::{RandomHelper, SharedRandom, Stream};
pub use simulation::{CommitReport, Model, Simulation, StopHandle, TickReport};
pub use space::{IndexViolation, Space};
pub use world::{LayerId, SpaceId, World};
