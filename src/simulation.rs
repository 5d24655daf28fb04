use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use rand::seq::SliceRandom;
use spark_common::{
    AgentErrorPolicy, CollectorConfig, DataRow, ExecutionMode, KindCount, NodeSnapshot, SimulationConfig, Snapshot,
};

use crate::agent::{AgentBox, AgentId, KindId, KindRegistry};
use crate::agent_table::AgentTable;
use crate::collector::{DataCollector, DataProcessor};
use crate::context::Context;
use crate::error::{Result, SparkError};
use crate::node::NodeSpec;
use crate::physics;
use crate::world::World;

/// A model plugged into the engine: its kinds, its initial population and its global hooks.
pub trait Model {
    fn name(&self) -> &str;

    /// Registers the model's agent kinds. Registration order is processing order.
    fn register(&self, registry: &mut KindRegistry) -> Result<()>;

    /// Creates the initial population.
    fn setup(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()>;

    /// Runs before any agent steps.
    fn begin(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after the step phase and layer dynamics. Returning `true` stops the run after
    /// this tick.
    fn end(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Cloneable flag that asks a running simulation to stop at the next tick boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Counts of what a commit applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub moves: usize,
    pub layer_writes: usize,
    pub deaths: usize,
    pub births: usize,
}

impl CommitReport {
    fn absorb(&mut self, other: CommitReport) {
        self.moves += other.moves;
        self.layer_writes += other.layer_writes;
        self.deaths += other.deaths;
        self.births += other.births;
    }
}

/// What happened during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub tick: u64,
    pub stepped: usize,
    /// Agent failures that were logged and skipped.
    pub agent_errors: Vec<SparkError>,
    /// Collectors whose value was omitted this tick.
    pub data_errors: Vec<SparkError>,
    pub commits: CommitReport,
    pub stop_requested: bool,
}

/// Owns one model's world and drives it tick by tick.
pub struct Simulation {
    config: SimulationConfig,
    model: Box<dyn Model>,
    registry: KindRegistry,
    world: World,
    agents: AgentTable,
    collectors: Vec<DataCollector>,
    processors: Vec<Box<dyn DataProcessor>>,
    data_rows: Vec<DataRow>,
    recorded_snapshots: Vec<Snapshot>,
    stop: StopHandle,
    mode: ExecutionMode,
    ready: bool,
}

impl Simulation {
    /// Builds spaces and layers from `config` and registers the model's kinds.
    /// Configuration problems are reported here, before any tick runs.
    pub fn new(config: SimulationConfig, model: Box<dyn Model>) -> Result<Self> {
        config.validate()?;
        let world = World::from_config(&config)?;
        let mut registry = KindRegistry::new();
        model.register(&mut registry)?;
        info!(
            "Model '{}' registered {} kinds: {:?}",
            model.name(),
            registry.len(),
            registry.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
        );
        let collectors = config.collectors.iter().cloned().map(DataCollector::new).collect();
        let mode = config.simulation.execution_mode;
        Ok(Simulation {
            config,
            model,
            registry,
            world,
            agents: AgentTable::new(),
            collectors,
            processors: Vec::new(),
            data_rows: Vec::new(),
            recorded_snapshots: Vec::new(),
            stop: StopHandle::default(),
            mode,
            ready: false,
        })
    }

    /// (Re)creates the initial population. `seed` overrides the configured seed.
    pub fn setup(&mut self, seed: Option<u64>, mode: ExecutionMode) -> Result<()> {
        self.ready = false;
        self.world = World::from_config(&self.config)?;
        self.agents = AgentTable::new();
        self.data_rows.clear();
        self.recorded_snapshots.clear();
        self.stop.clear();
        self.mode = mode;

        let rng = self.world.rng();
        match seed {
            Some(s) => rng.set_seed(s),
            None if self.config.simulation.time_seed => rng.set_time_seed(),
            None => rng.set_seed(self.config.simulation.seed),
        }
        rng.reset();
        info!(
            "Setting up model '{}' (seed {}, {:?} execution)",
            self.model.name(),
            self.world.rng.seed(),
            mode
        );

        {
            let mut ctx = Context::new(&mut self.world, &mut self.agents, &self.registry, None);
            self.model
                .setup(&mut ctx)
                .map_err(|cause| SparkError::Hook { phase: "setup", tick: 0, cause })?;
        }
        self.commit(false);
        self.ready = true;
        info!("Initial population: {} agents", self.agents.len());
        self.record_snapshot();
        Ok(())
    }

    /// Applies everything staged since the last commit, in order: physics integration (only
    /// on the post-step commit), layer writes, moves, deaths, births.
    fn commit(&mut self, integrate: bool) -> CommitReport {
        let mut report = CommitReport::default();
        if integrate {
            for space in self.world.spaces.iter_mut().filter(|s| s.physics().is_some()) {
                physics::accumulate_collisions(space);
                physics::integrate(space);
            }
        }
        for layer in &mut self.world.layers {
            report.layer_writes += layer.commit_writes();
        }
        for space in &mut self.world.spaces {
            report.moves += space.commit();
        }
        report.deaths = self.agents.sweep_deaths(&mut self.world);
        report.births = self.agents.admit_births(&mut self.world);
        report
    }

    fn hook_error(phase: &'static str, tick: u64, cause: anyhow::Error) -> SparkError {
        error!("Model {} hook failed at tick {}: {:#}", phase, tick, cause);
        SparkError::Hook { phase, tick, cause }
    }

    /// Steps every live agent of one kind over a snapshot of that kind's population.
    fn step_kind(&mut self, kind: KindId, report: &mut TickReport) -> Result<()> {
        let mut batch: Vec<AgentId> = self.agents.of_kind(kind).to_vec();
        if self.mode == ExecutionMode::Shuffled {
            batch.shuffle(self.world.rng());
        }
        let tick = self.world.tick;
        for id in batch {
            // Agents marked earlier in this phase are not stepped.
            if !self.agents.is_alive(id) {
                continue;
            }
            let Some(mut agent) = self.agents.take(id) else {
                continue;
            };
            let outcome = {
                let mut ctx = Context::new(&mut self.world, &mut self.agents, &self.registry, Some(id));
                agent.step(&mut ctx)
            };
            self.agents.restore(id, agent);
            report.stepped += 1;

            if let Err(cause) = outcome {
                let kind_name = self.registry.name(kind).to_string();
                error!("Agent {} ({}) failed at tick {}: {:#}", id, kind_name, tick, cause);
                let err = SparkError::AgentStep { agent: id, kind: kind_name, tick, cause };
                match self.config.simulation.agent_errors {
                    AgentErrorPolicy::Skip => report.agent_errors.push(err),
                    AgentErrorPolicy::Abort => return Err(err),
                }
            }
        }
        Ok(())
    }

    /// Advances the simulation by one tick.
    ///
    /// A tick that fails part-way leaves staged state behind, so any error marks the
    /// simulation as not set up until the next [`Simulation::setup`].
    pub fn step(&mut self) -> Result<TickReport> {
        if !self.ready {
            return Err(SparkError::NotSetUp);
        }
        let result = self.advance();
        if result.is_err() {
            self.ready = false;
            warn!("Tick {} failed; call setup before stepping again", self.world.tick);
        }
        result
    }

    fn advance(&mut self) -> Result<TickReport> {
        self.world.tick += 1;
        let tick = self.world.tick;
        let mut report = TickReport { tick, ..TickReport::default() };

        {
            let mut ctx = Context::new(&mut self.world, &mut self.agents, &self.registry, None);
            self.model.begin(&mut ctx).map_err(|e| Self::hook_error("begin", tick, e))?;
        }
        report.commits.absorb(self.commit(false));

        let kinds: Vec<(KindId, u64)> = self.registry.iter().map(|d| (d.id, d.every)).collect();
        for (kind, every) in kinds {
            if tick % every != 0 {
                continue;
            }
            self.step_kind(kind, &mut report)?;
        }
        report.commits.absorb(self.commit(true));

        for layer in &mut self.world.layers {
            layer.tick_dynamics();
        }

        {
            let mut ctx = Context::new(&mut self.world, &mut self.agents, &self.registry, None);
            report.stop_requested = self.model.end(&mut ctx).map_err(|e| Self::hook_error("end", tick, e))?;
        }
        report.commits.absorb(self.commit(false));

        self.collect_data(&mut report);
        if tick % self.config.simulation.record_interval == 0 {
            self.record_snapshot();
        }
        if report.stop_requested {
            info!("Model requested stop at tick {}", tick);
            self.stop.request();
        }
        Ok(report)
    }

    /// Runs up to `ticks` ticks, honouring stop requests between ticks and the configured
    /// delay. Returns the number of ticks executed.
    pub fn run(&mut self, ticks: u64) -> Result<u64> {
        let delay = Duration::from_millis(self.config.simulation.delay_ms);
        let mut done = 0;
        while done < ticks {
            if self.stop.is_requested() {
                info!("Stopping at tick {}", self.world.tick);
                break;
            }
            let report = self.step()?;
            done += 1;
            trace!(
                "Tick {} stepped {} agents ({} births, {} deaths)",
                report.tick,
                report.stepped,
                report.commits.births,
                report.commits.deaths
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        Ok(done)
    }

    /// Asks the simulation to stop before the next tick.
    pub fn stop(&self) {
        self.stop.request();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn collect_data(&mut self, report: &mut TickReport) {
        if self.collectors.is_empty() {
            return;
        }
        let mut row = DataRow { tick: self.world.tick, time: self.world.time(), values: Vec::new() };
        for collector in &self.collectors {
            match collector.collect(&self.registry, &self.agents, &self.world) {
                Ok(v) => row.values.push((collector.name().to_string(), v)),
                Err(e) => {
                    warn!("{} (tick {})", e, row.tick);
                    report.data_errors.push(e);
                }
            }
        }
        for processor in &mut self.processors {
            if let Err(e) = processor.process(&row) {
                warn!("Data processor failed at tick {}: {:#}", row.tick, e);
            }
        }
        self.data_rows.push(row);
    }

    pub fn add_data_collector(&mut self, config: CollectorConfig) {
        debug!("Adding data collector '{}': {:?}", config.name, config.source);
        self.collectors.push(DataCollector::new(config));
    }

    pub fn add_data_processor(&mut self, processor: Box<dyn DataProcessor>) {
        self.processors.push(processor);
    }

    pub fn collector_names(&self) -> Vec<String> {
        self.collectors.iter().map(|c| c.name().to_string()).collect()
    }

    /// Flushes every processor.
    pub fn finish(&mut self) {
        for processor in &mut self.processors {
            if let Err(e) = processor.finish() {
                error!("Data processor failed to finish: {:#}", e);
            }
        }
    }

    /// Plain copies of all nodes owned by live agents.
    pub fn node_snapshots(&self) -> Vec<NodeSnapshot> {
        self.agents
            .spatial_agents()
            .map(|(id, kind, space, node)| {
                let space = self.world.space(space);
                let n = space.node(node);
                NodeSnapshot {
                    agent: id.to_u64(),
                    kind: self.registry.name(kind).to_string(),
                    space: space.name().to_string(),
                    position: n.position().to_array(),
                    radius: n.radius(),
                    shape: n.shape(),
                    rotation: n.rotation,
                    color: n.color.to_array(),
                    velocity: n.body.map(|b| b.velocity.to_array()),
                }
            })
            .collect()
    }

    pub fn agent_counts(&self) -> Vec<KindCount> {
        self.registry
            .iter()
            .map(|d| KindCount { kind: d.name.clone(), count: self.agents.count_of_kind(d.id) })
            .collect()
    }

    /// Collects the current state and stores it as a [`Snapshot`].
    pub fn record_snapshot(&mut self) {
        let tick = self.world.tick;
        debug!("Recording snapshot at tick {}...", tick);
        let data = self.data_rows.last().filter(|r| r.tick == tick).cloned();
        let snapshot = Snapshot {
            tick,
            time: self.world.time(),
            agent_counts: self.agent_counts(),
            nodes: self.config.output.include_nodes.then(|| self.node_snapshots()),
            layers: self.world.layers.iter().map(|l| l.snapshot()).collect(),
            data,
        };
        self.recorded_snapshots.push(snapshot);
    }

    pub fn recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }

    pub fn data_rows(&self) -> &[DataRow] {
        &self.data_rows
    }

    // --- cluster hooks ---

    /// Nodes within `margin` of the faces of `space`, for export to neighbouring ranks.
    pub fn border_agents(&self, space: &str, margin: f64) -> Result<Vec<NodeSnapshot>> {
        let sid = self.world.require_space(space)?;
        let wanted: Vec<AgentId> = self
            .world
            .space(sid)
            .nodes_near_border(margin)
            .into_iter()
            .filter_map(|n| self.world.space(sid).node(n).owner())
            .collect();
        Ok(self
            .node_snapshots()
            .into_iter()
            .filter(|s| wanted.contains(&AgentId::from_u64(s.agent)))
            .collect())
    }

    /// Admits an agent received from another rank straight into the live set and the space
    /// index. Without an explicit agent the kind's factory builds one.
    pub fn admit_remote(&mut self, kind: &str, agent: Option<AgentBox>, space: &str, spec: NodeSpec) -> Result<AgentId> {
        let kind_id = self.registry.require(kind)?;
        let desc = self.registry.descriptor(kind_id);
        if !desc.spatial {
            return Err(SparkError::Capability { kind: kind.to_string(), reason: "is not spatial".into() });
        }
        let agent = match (agent, desc.factory) {
            (Some(a), _) => a,
            (None, Some(factory)) => factory(),
            (None, None) => {
                return Err(SparkError::Capability { kind: kind.to_string(), reason: "has no factory".into() })
            }
        };
        let sid = self.world.require_space(space)?;
        let id = self.agents.insert_live(kind_id, agent);
        let node = self.world.space_mut(sid).admit(spec, Some(id), Some(kind_id));
        self.agents.set_node(id, sid, node);
        Ok(id)
    }

    /// Border cells of a layer for exchange.
    pub fn layer_border(&self, layer: &str, width: usize) -> Result<Vec<(usize, f64)>> {
        let id = self.world.require_layer(layer)?;
        Ok(self.world.layer(id).border_cells(width))
    }

    pub fn merge_layer_border(&mut self, layer: &str, cells: &[(usize, f64)]) -> Result<()> {
        let id = self.world.require_layer(layer)?;
        self.world.layer_mut(id).merge_cells(cells);
        Ok(())
    }

    // --- accessors ---

    pub fn tick(&self) -> u64 {
        self.world.tick
    }

    pub fn time(&self) -> f64 {
        self.world.time()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn agents(&self) -> &AgentTable {
        &self.agents
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Runs a closure with a model-level context, then commits what it staged.
    pub fn with_context<R>(&mut self, f: impl FnOnce(&mut Context<'_>) -> R) -> R {
        let result = {
            let mut ctx = Context::new(&mut self.world, &mut self.agents, &self.registry, None);
            f(&mut ctx)
        };
        self.commit(false);
        result
    }
}
