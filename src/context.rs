//! What an agent or model hook sees while it runs.

use spark_common::{Rgba, Vector};

use crate::agent::{AgentId, KindFilter, KindId, KindRegistry, Steppable};
use crate::agent_table::AgentTable;
use crate::error::{Result, SparkError};
use crate::node::{Body, NodeId, NodeSpec, SpaceNode};
use crate::random::RandomHelper;
use crate::space::Space;
use crate::world::{LayerId, SpaceId, World};

/// Borrowed view of one simulation for the duration of a single step or hook.
///
/// Reads see the state of the last commit. Moves, radius changes, layer writes, births
/// and deaths requested here are staged and applied at the next commit.
pub struct Context<'a> {
    world: &'a mut World,
    agents: &'a mut AgentTable,
    registry: &'a KindRegistry,
    me: Option<AgentId>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        world: &'a mut World,
        agents: &'a mut AgentTable,
        registry: &'a KindRegistry,
        me: Option<AgentId>,
    ) -> Self {
        Context { world, agents, registry, me }
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn time(&self) -> f64 {
        self.world.time()
    }

    pub fn rng(&mut self) -> &mut RandomHelper {
        self.world.rng()
    }

    /// The agent being stepped; `None` inside model hooks.
    pub fn me(&self) -> Option<AgentId> {
        self.me
    }

    pub fn registry(&self) -> &KindRegistry {
        self.registry
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn kind(&self, name: &str) -> Result<KindId> {
        self.registry.require(name)
    }

    pub fn space_id(&self, name: &str) -> Result<SpaceId> {
        self.world.require_space(name)
    }

    pub fn layer_id(&self, name: &str) -> Result<LayerId> {
        self.world.require_layer(name)
    }

    pub fn space(&self, id: SpaceId) -> &Space {
        self.world.space(id)
    }

    // --- life cycle ---

    /// Creates a non-spatial agent; it is stepped from the next phase on.
    pub fn spawn<A: Steppable>(&mut self, kind: KindId, agent: A) -> Result<AgentId> {
        let desc = self.registry.descriptor(kind);
        if desc.spatial {
            return Err(SparkError::Capability {
                kind: desc.name.clone(),
                reason: "is spatial and needs a node; use spawn_at".into(),
            });
        }
        Ok(self.agents.create(kind, Box::new(agent), None))
    }

    /// Creates a spatial agent whose node appears in `space` at the next commit.
    pub fn spawn_at<A: Steppable>(&mut self, kind: KindId, agent: A, space: SpaceId, mut spec: NodeSpec) -> Result<AgentId> {
        let desc = self.registry.descriptor(kind);
        if !desc.spatial {
            return Err(SparkError::Capability {
                kind: desc.name.clone(),
                reason: "is not spatial".into(),
            });
        }
        if desc.physical {
            if self.world.space(space).physics().is_none() {
                return Err(SparkError::Capability {
                    kind: desc.name.clone(),
                    reason: format!("is physical but space '{}' has no physics", self.world.space(space).name()),
                });
            }
            spec.body.get_or_insert_with(Body::default);
        }
        Ok(self.agents.create(kind, Box::new(agent), Some((space, spec))))
    }

    /// Marks an agent for death at the next commit. Idempotent.
    pub fn kill(&mut self, id: AgentId) -> bool {
        self.agents.kill(id)
    }

    /// Marks the running agent for death; it still finishes this step.
    pub fn kill_self(&mut self) -> bool {
        match self.me {
            Some(id) => self.agents.kill(id),
            None => false,
        }
    }

    pub fn is_alive(&self, id: AgentId) -> bool {
        self.agents.is_alive(id)
    }

    pub fn kind_of(&self, id: AgentId) -> Option<KindId> {
        self.agents.kind_of(id)
    }

    /// Typed read access to another agent. The running agent itself is not reachable here.
    pub fn agent<T: Steppable>(&self, id: AgentId) -> Option<&T> {
        self.agents.get(id).and_then(|a| a.as_any().downcast_ref::<T>())
    }

    pub fn agent_mut<T: Steppable>(&mut self, id: AgentId) -> Option<&mut T> {
        self.agents.get_mut(id).and_then(|a| a.as_any_mut().downcast_mut::<T>())
    }

    pub fn agents_of_kind(&self, kind: KindId) -> &[AgentId] {
        self.agents.of_kind(kind)
    }

    // --- nodes ---

    pub fn node_of(&self, id: AgentId) -> Option<(SpaceId, NodeId)> {
        self.agents.node_of(id)
    }

    pub fn node(&self, id: AgentId) -> Option<&SpaceNode> {
        let (space, node) = self.agents.node_of(id)?;
        self.world.space(space).get(node)
    }

    pub fn position_of(&self, id: AgentId) -> Option<Vector> {
        self.node(id).map(SpaceNode::position)
    }

    fn my_node(&self) -> Result<(SpaceId, NodeId)> {
        let me = self.me.ok_or_else(|| SparkError::Capability {
            kind: "model".into(),
            reason: "hooks have no node of their own".into(),
        })?;
        self.agents.node_of(me).ok_or_else(|| {
            let kind = self.agents.kind_of(me).map(|k| self.registry.name(k)).unwrap_or("?");
            SparkError::Capability { kind: kind.to_string(), reason: "has no node".into() }
        })
    }

    pub fn my_position(&self) -> Result<Vector> {
        let (space, node) = self.my_node()?;
        Ok(self.world.space(space).node(node).position())
    }

    /// Stages a move of the running agent's node.
    pub fn move_to(&mut self, target: Vector) -> Result<()> {
        let (space, node) = self.my_node()?;
        self.world.space_mut(space).stage_move(node, target);
        Ok(())
    }

    /// Stages a relative move of the running agent's node.
    pub fn translate(&mut self, delta: Vector) -> Result<()> {
        let (space, node) = self.my_node()?;
        self.world.space_mut(space).stage_translate(node, delta);
        Ok(())
    }

    pub fn set_radius(&mut self, radius: f64) -> Result<()> {
        let (space, node) = self.my_node()?;
        self.world.space_mut(space).stage_radius(node, radius);
        Ok(())
    }

    pub fn set_color(&mut self, color: Rgba) -> Result<()> {
        let (space, node) = self.my_node()?;
        self.world.space_mut(space).node_mut(node).color = color;
        Ok(())
    }

    pub fn set_rotation(&mut self, rotation: f64) -> Result<()> {
        let (space, node) = self.my_node()?;
        self.world.space_mut(space).node_mut(node).rotation = rotation;
        Ok(())
    }

    // --- queries ---

    /// Owners of nodes intersecting the circle around `center`, filtered by kind.
    pub fn agents_near(&self, space: SpaceId, center: Vector, radius: f64, filter: KindFilter) -> Vec<AgentId> {
        let registry = self.registry;
        self.world
            .space(space)
            .agents_near(center, radius, |n| match (n.owner(), n.kind()) {
                (Some(_), Some(kind)) => registry.matches(kind, filter),
                _ => false,
            })
            .into_iter()
            .filter_map(|node| self.world.space(space).node(node).owner())
            .collect()
    }

    /// Other agents within `radius` of the running agent, in its own space.
    pub fn neighbours(&self, radius: f64, filter: KindFilter) -> Result<Vec<AgentId>> {
        let (space, node) = self.my_node()?;
        let center = self.world.space(space).node(node).position();
        let me = self.me;
        let mut found = self.agents_near(space, center, radius, filter);
        found.retain(|id| Some(*id) != me);
        Ok(found)
    }

    /// Shortest displacement from `a`'s node to `b`'s node; `None` unless both are placed in
    /// the same space.
    pub fn vector_between(&self, a: AgentId, b: AgentId) -> Option<Vector> {
        let (sa, na) = self.agents.node_of(a)?;
        let (sb, nb) = self.agents.node_of(b)?;
        if sa != sb {
            return None;
        }
        let space = self.world.space(sa);
        Some(space.get_vector(space.get(na)?.position(), space.get(nb)?.position()))
    }

    // --- physics ---

    /// Adds to the force accumulated on an agent's body this tick.
    pub fn apply_force(&mut self, id: AgentId, force: Vector) -> Result<()> {
        let (space, node) = self.agents.node_of(id).ok_or(SparkError::StaleAgent(id))?;
        match self.world.space_mut(space).node_mut(node).body.as_mut() {
            Some(body) => {
                body.apply_force(force);
                Ok(())
            }
            None => {
                let kind = self.agents.kind_of(id).map(|k| self.registry.name(k)).unwrap_or("?");
                Err(SparkError::Capability { kind: kind.to_string(), reason: "has no physics body".into() })
            }
        }
    }

    pub fn velocity_of(&self, id: AgentId) -> Option<Vector> {
        self.node(id).and_then(|n| n.body.as_ref()).map(|b| b.velocity)
    }

    // --- data layers ---

    pub fn layer_value(&self, layer: LayerId, p: Vector) -> f64 {
        self.world.layer(layer).value(p)
    }

    pub fn add_layer_value(&mut self, layer: LayerId, p: Vector, delta: f64) {
        self.world.layer_mut(layer).stage_add(p, delta);
    }

    pub fn set_layer_value(&mut self, layer: LayerId, p: Vector, v: f64) {
        self.world.layer_mut(layer).stage_set(p, v);
    }

    pub fn gradient(&self, layer: LayerId, p: Vector) -> Vector {
        self.world.layer(layer).gradient(p)
    }
}
