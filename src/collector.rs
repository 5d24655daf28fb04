//! Per-tick data collection and the sinks that receive it.

use std::fs::File;
use std::path::Path;

use anyhow::Context as _;
use spark_common::{Aggregate, CollectorConfig, DataRow, DataSource};

use crate::agent::{KindFilter, KindId, KindRegistry};
use crate::agent_table::AgentTable;
use crate::error::{Result, SparkError};
use crate::world::World;

/// One named value computed after every tick.
#[derive(Debug, Clone)]
pub struct DataCollector {
    config: CollectorConfig,
}

impl DataCollector {
    pub fn new(config: CollectorConfig) -> Self {
        DataCollector { config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn source(&self) -> &DataSource {
        &self.config.source
    }

    fn bad(&self, reason: String) -> SparkError {
        SparkError::BadDataSource { collector: self.config.name.clone(), reason }
    }

    /// Evaluates the source against the committed state. Kinds match their subtypes too.
    pub fn collect(&self, registry: &KindRegistry, agents: &AgentTable, world: &World) -> Result<f64> {
        match &self.config.source {
            DataSource::AgentCount { kind } => {
                let root = registry.id(kind).ok_or_else(|| self.bad(format!("unknown agent kind '{}'", kind)))?;
                Ok(registry
                    .iter()
                    .filter(|d| registry.matches(d.id, KindFilter::Family(root)))
                    .map(|d| agents.count_of_kind(d.id))
                    .sum::<usize>() as f64)
            }
            DataSource::AgentVariable { kind, variable, aggregate } => {
                let root = registry.id(kind).ok_or_else(|| self.bad(format!("unknown agent kind '{}'", kind)))?;
                let mut values = Vec::new();
                let mut population = 0;
                for desc in registry.iter().filter(|d| registry.matches(d.id, KindFilter::Family(root))) {
                    population += agents.of_kind(desc.id).len();
                    for &id in agents.of_kind(desc.id) {
                        let Some(agent) = agents.get(id) else {
                            continue;
                        };
                        let v = agent.variable(variable).ok_or_else(|| {
                            self.bad(format!("agents of kind '{}' have no variable '{}'", desc.name, variable))
                        })?;
                        values.push(v);
                    }
                }
                if population == 0 {
                    self.check_prototypes(registry, root, variable)?;
                }
                Ok(aggregate_values(*aggregate, &values))
            }
            DataSource::LayerTotal { layer } => Ok(self.layer(world, layer)?.total()),
            DataSource::LayerMax { layer } => Ok(self.layer(world, layer)?.max()),
            DataSource::LayerMin { layer } => Ok(self.layer(world, layer)?.min()),
        }
    }

    /// With nobody alive the variable is checked on a fresh agent of every kind in the
    /// family that has a factory.
    fn check_prototypes(&self, registry: &KindRegistry, root: KindId, variable: &str) -> Result<()> {
        for desc in registry.iter().filter(|d| registry.matches(d.id, KindFilter::Family(root))) {
            let Some(factory) = desc.factory else {
                continue;
            };
            if factory().variable(variable).is_none() {
                return Err(self.bad(format!("agents of kind '{}' have no variable '{}'", desc.name, variable)));
            }
        }
        Ok(())
    }

    fn layer<'w>(&self, world: &'w World, name: &str) -> Result<&'w crate::data_layer::DataLayer> {
        world
            .layer_id(name)
            .map(|id| world.layer(id))
            .ok_or_else(|| self.bad(format!("unknown data layer '{}'", name)))
    }
}

/// Aggregate of a population; an empty population yields 0.
pub fn aggregate_values(aggregate: Aggregate, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    match aggregate {
        Aggregate::Sum => values.iter().sum(),
        Aggregate::Mean => values.iter().sum::<f64>() / values.len() as f64,
        Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Receives every collected row.
pub trait DataProcessor {
    fn process(&mut self, row: &DataRow) -> anyhow::Result<()>;

    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes rows as CSV: `tick,time,<column>...`. Values missing for a tick stay empty.
pub struct CsvProcessor {
    writer: csv::Writer<File>,
    columns: Vec<String>,
}

impl CsvProcessor {
    pub fn create<P: AsRef<Path>>(path: P, columns: Vec<String>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("creating data file '{}'", path.display()))?;
        let mut header = vec!["tick".to_string(), "time".to_string()];
        header.extend(columns.iter().cloned());
        writer.write_record(&header)?;
        Ok(CsvProcessor { writer, columns })
    }
}

impl DataProcessor for CsvProcessor {
    fn process(&mut self, row: &DataRow) -> anyhow::Result<()> {
        let mut record = Vec::with_capacity(self.columns.len() + 2);
        record.push(row.tick.to_string());
        record.push(format!("{:.6}", row.time));
        for col in &self.columns {
            record.push(row.get(col).map(|v| v.to_string()).unwrap_or_default());
        }
        self.writer.write_record(&record)?;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
