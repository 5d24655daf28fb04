//! Arena of live agents with staged births and deaths.

use log::trace;

use crate::agent::{AgentBox, AgentId, KindId, Steppable};
use crate::node::{NodeId, NodeSpec};
use crate::world::{SpaceId, World};

/// Life cycle of one agent slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    /// Created this phase; becomes `Alive` at the next commit.
    Unborn,
    Alive,
    /// `die()` was called; swept at the next commit.
    MarkedForDeath,
    Removed,
}

struct AgentSlot {
    generation: u32,
    state: LifeState,
    kind: KindId,
    agent: Option<AgentBox>,
    node: Option<(SpaceId, NodeId)>,
    pending_node: Option<(SpaceId, NodeSpec)>,
}

/// Agents indexed by generation-checked [`AgentId`].
///
/// Slots are reused only inside [`AgentTable::sweep_deaths`], which runs at a phase
/// boundary, so an id taken during a phase stays valid until the next commit.
#[derive(Default)]
pub struct AgentTable {
    slots: Vec<AgentSlot>,
    free: Vec<u32>,
    by_kind: Vec<Vec<AgentId>>,
    births: Vec<AgentId>,
    deaths: Vec<AgentId>,
}

impl AgentTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: AgentId) -> Option<&AgentSlot> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation && s.state != LifeState::Removed)
    }

    fn slot_mut(&mut self, id: AgentId) -> Option<&mut AgentSlot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.state != LifeState::Removed)
    }

    /// Queues a new agent. It is admitted (and its node created) at the next commit.
    pub fn create(&mut self, kind: KindId, agent: AgentBox, node: Option<(SpaceId, NodeSpec)>) -> AgentId {
        let slot = AgentSlot {
            generation: 0,
            state: LifeState::Unborn,
            kind,
            agent: Some(agent),
            node: None,
            pending_node: node,
        };
        let id = match self.free.pop() {
            Some(index) => {
                let generation = self.slots[index as usize].generation;
                self.slots[index as usize] = AgentSlot { generation, ..slot };
                AgentId { index, generation }
            }
            None => {
                self.slots.push(slot);
                AgentId { index: (self.slots.len() - 1) as u32, generation: 0 }
            }
        };
        self.births.push(id);
        id
    }

    /// Admits an agent immediately, bypassing the birth queue (remote admission).
    pub(crate) fn insert_live(&mut self, kind: KindId, agent: AgentBox) -> AgentId {
        let id = self.create(kind, agent, None);
        self.births.pop();
        if let Some(slot) = self.slot_mut(id) {
            slot.state = LifeState::Alive;
        }
        self.kind_list(kind).push(id);
        id
    }

    pub(crate) fn set_node(&mut self, id: AgentId, space: SpaceId, node: NodeId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.node = Some((space, node));
        }
    }

    fn kind_list(&mut self, kind: KindId) -> &mut Vec<AgentId> {
        if self.by_kind.len() <= kind.index() {
            self.by_kind.resize_with(kind.index() + 1, Vec::new);
        }
        &mut self.by_kind[kind.index()]
    }

    pub fn state(&self, id: AgentId) -> Option<LifeState> {
        self.slot(id).map(|s| s.state)
    }

    pub fn is_alive(&self, id: AgentId) -> bool {
        self.state(id) == Some(LifeState::Alive)
    }

    /// Marks an agent for removal at the next commit. Returns `false` if it was already
    /// marked or is gone; calling it twice is harmless.
    pub fn kill(&mut self, id: AgentId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        match slot.state {
            LifeState::Alive | LifeState::Unborn => {
                slot.state = LifeState::MarkedForDeath;
                self.deaths.push(id);
                true
            }
            LifeState::MarkedForDeath | LifeState::Removed => false,
        }
    }

    pub fn kind_of(&self, id: AgentId) -> Option<KindId> {
        self.slot(id).map(|s| s.kind)
    }

    /// Committed node of a spatial agent.
    pub fn node_of(&self, id: AgentId) -> Option<(SpaceId, NodeId)> {
        self.slot(id).and_then(|s| s.node)
    }

    pub fn get(&self, id: AgentId) -> Option<&dyn Steppable> {
        self.slot(id).and_then(|s| s.agent.as_deref())
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut (dyn Steppable + 'static)> {
        self.slot_mut(id).and_then(|s| s.agent.as_deref_mut())
    }

    /// Takes the agent out of its slot for stepping.
    pub(crate) fn take(&mut self, id: AgentId) -> Option<AgentBox> {
        self.slot_mut(id).and_then(|s| s.agent.take())
    }

    pub(crate) fn restore(&mut self, id: AgentId, agent: AgentBox) {
        if let Some(slot) = self.slot_mut(id) {
            slot.agent = Some(agent);
        }
    }

    /// Admitted agents of one kind (alive or marked), in admission order.
    pub fn of_kind(&self, kind: KindId) -> &[AgentId] {
        self.by_kind.get(kind.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count_of_kind(&self, kind: KindId) -> usize {
        self.of_kind(kind).len()
    }

    pub fn len(&self) -> usize {
        self.by_kind.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_births(&self) -> usize {
        self.births.len()
    }

    pub fn pending_deaths(&self) -> usize {
        self.deaths.len()
    }

    /// Removes every marked agent: its node leaves the space, the slot is freed and its
    /// generation bumped.
    pub(crate) fn sweep_deaths(&mut self, world: &mut World) -> usize {
        if self.deaths.is_empty() {
            return 0;
        }
        let deaths = std::mem::take(&mut self.deaths);
        let mut touched_kinds = Vec::new();
        for id in &deaths {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation || slot.state != LifeState::MarkedForDeath {
                continue;
            }
            if let Some((space, node)) = slot.node.take() {
                world.space_mut(space).remove(node);
            }
            slot.pending_node = None;
            slot.agent = None;
            slot.state = LifeState::Removed;
            slot.generation = slot.generation.wrapping_add(1);
            if !touched_kinds.contains(&slot.kind) {
                touched_kinds.push(slot.kind);
            }
            self.free.push(id.index);
            trace!("Agent {} removed", id);
        }
        let slots = &self.slots;
        for kind in touched_kinds {
            if let Some(list) = self.by_kind.get_mut(kind.index()) {
                list.retain(|id| {
                    let s = &slots[id.index as usize];
                    s.generation == id.generation && s.state != LifeState::Removed
                });
            }
        }
        deaths.len()
    }

    /// Makes queued agents live, creating their nodes. Agents killed before admission
    /// never appear.
    pub(crate) fn admit_births(&mut self, world: &mut World) -> usize {
        let births = std::mem::take(&mut self.births);
        let mut admitted = 0;
        for id in births {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation || slot.state != LifeState::Unborn {
                continue;
            }
            if let Some((space, spec)) = slot.pending_node.take() {
                let node = world.space_mut(space).add_owned(spec, id, slot.kind);
                slot.node = Some((space, node));
            }
            slot.state = LifeState::Alive;
            let kind = slot.kind;
            self.kind_list(kind).push(id);
            admitted += 1;
        }
        admitted
    }

    /// All admitted agents with a node, in slot order.
    pub fn spatial_agents(&self) -> impl Iterator<Item = (AgentId, KindId, SpaceId, NodeId)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match (s.state, s.node) {
            (LifeState::Alive | LifeState::MarkedForDeath, Some((space, node))) => Some((
                AgentId { index: i as u32, generation: s.generation },
                s.kind,
                space,
                node,
            )),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    struct Idle;

    impl Steppable for Idle {
        fn step(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn empty_world() -> World {
        let config = spark_common::SimulationConfig::from_toml_str(
            "[simulation]\nmodel = \"t\"\nticks = 1\n[[spaces]]\nname = \"s\"\nmin = [0.0, 0.0]\nmax = [10.0, 10.0]\ncell_size = 1.0\n",
        )
        .unwrap();
        World::from_config(&config).unwrap()
    }

    #[test]
    fn births_become_live_at_commit() {
        let mut world = empty_world();
        let mut table = AgentTable::new();
        let kind = KindId(0);
        let id = table.create(kind, Box::new(Idle), None);
        assert_eq!(table.state(id), Some(LifeState::Unborn));
        assert!(table.of_kind(kind).is_empty());
        table.admit_births(&mut world);
        assert!(table.is_alive(id));
        assert_eq!(table.of_kind(kind), &[id]);
    }

    #[test]
    fn die_is_idempotent_and_frees_node() {
        let mut world = empty_world();
        let mut table = AgentTable::new();
        let kind = KindId(0);
        let spec = NodeSpec::circle(spark_common::Vector::xy(1.0, 1.0), 0.5);
        let id = table.create(kind, Box::new(Idle), Some((SpaceId(0), spec)));
        table.admit_births(&mut world);
        assert_eq!(world.space(SpaceId(0)).len(), 1);

        assert!(table.kill(id));
        assert!(!table.kill(id));
        assert_eq!(table.sweep_deaths(&mut world), 1);
        assert_eq!(table.state(id), None);
        assert_eq!(world.space(SpaceId(0)).len(), 0);
        world.space(SpaceId(0)).verify_index().unwrap();

        let reused = table.create(kind, Box::new(Idle), None);
        assert_eq!(reused.index, id.index);
        assert_ne!(reused.generation, id.generation);
    }

    #[test]
    fn killed_before_admission_never_lives() {
        let mut world = empty_world();
        let mut table = AgentTable::new();
        let id = table.create(KindId(0), Box::new(Idle), None);
        table.kill(id);
        table.sweep_deaths(&mut world);
        assert_eq!(table.admit_births(&mut world), 0);
        assert!(table.is_empty());
    }
}
