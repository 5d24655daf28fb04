use spark_common::ConfigError;
use thiserror::Error;

use crate::agent::AgentId;

/// Engine-level failures.
///
/// Agent and model hooks report plain `anyhow` errors; the engine wraps them here
/// together with the identity of whoever failed.
#[derive(Debug, Error)]
pub enum SparkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown agent kind '{0}'")]
    UnknownKind(String),

    #[error("agent kind '{0}' is already registered")]
    DuplicateKind(String),

    #[error("unknown space '{0}'")]
    UnknownSpace(String),

    #[error("unknown data layer '{0}'")]
    UnknownLayer(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// A collector refers to a kind, layer or variable the running model does not have.
    #[error("bad data source for collector '{collector}': {reason}")]
    BadDataSource { collector: String, reason: String },

    #[error("agent {agent} ({kind}) failed at tick {tick}: {cause:#}")]
    AgentStep {
        agent: AgentId,
        kind: String,
        tick: u64,
        cause: anyhow::Error,
    },

    #[error("model {phase} hook failed at tick {tick}: {cause:#}")]
    Hook {
        phase: &'static str,
        tick: u64,
        cause: anyhow::Error,
    },

    #[error("agent kind '{kind}' {reason}")]
    Capability { kind: String, reason: String },

    #[error("agent {0} is not alive")]
    StaleAgent(AgentId),

    #[error("simulation has not been set up")]
    NotSetUp,
}

pub type Result<T, E = SparkError> = std::result::Result<T, E>;
