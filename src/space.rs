//! Continuous 2D/3D space backed by a hash grid of node rings.
//!
//! Every cell owns a circular, doubly linked ring of node slots. Links are slab indices,
//! so splicing a node in or out is O(1) and never touches other cells. Nodes only change
//! cells inside [`Space::commit`]; queries between commits see one consistent world.

use log::{debug, trace};
use spark_common::{PhysicsParams, Shape, SpaceParams, Vector};

use crate::grid::{cell_coords, for_each_cell_in_reach, get_grid_cell_idx};
use crate::node::{shapes_intersect, NodeId, NodeSpec, SpaceNode};
use crate::agent::{AgentId, KindId};

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct NodeSlot {
    generation: u32,
    next: u32,
    prev: u32,
    cell: u32,
    staged: bool,
    node: Option<SpaceNode>,
}

/// Result of a consistency check over all cell rings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexViolation {
    BrokenLink { cell: usize, slot: u32 },
    WrongCell { slot: u32, ring: usize, expected: usize },
    Duplicate { slot: u32 },
    Missing { slot: u32 },
    EmptySlotInRing { cell: usize, slot: u32 },
}

#[derive(Debug, Clone)]
pub struct Space {
    params: SpaceParams,
    physics: Option<PhysicsParams>,
    slots: Vec<NodeSlot>,
    free: Vec<u32>,
    heads: Vec<u32>,
    staged: Vec<u32>,
    max_radius: f64,
    len: usize,
}

/// Walks one cell ring, starting at its head.
pub struct RingIter<'a> {
    slots: &'a [NodeSlot],
    head: u32,
    current: u32,
}

impl Iterator for RingIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.current == NIL {
            return None;
        }
        let cur = self.current;
        let next = self.slots[cur as usize].next;
        self.current = if next == self.head { NIL } else { next };
        Some(cur)
    }
}

impl Space {
    pub fn new(params: SpaceParams) -> Self {
        debug!(
            "Creating space '{}' ({}D, {:?} cells, wrap {:?})",
            params.name,
            params.dimension,
            params.dims,
            params.axes.iter().map(|a| a.wrap).collect::<Vec<_>>()
        );
        let heads = vec![NIL; params.num_cells];
        Space {
            params,
            physics: None,
            slots: Vec::new(),
            free: Vec::new(),
            heads,
            staged: Vec::new(),
            max_radius: 0.0,
            len: 0,
        }
    }

    pub fn with_physics(mut self, physics: Option<PhysicsParams>) -> Self {
        self.physics = physics;
        self
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn params(&self) -> &SpaceParams {
        &self.params
    }

    pub fn physics(&self) -> Option<&PhysicsParams> {
        self.physics.as_ref()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Largest radius any node has had; widens query reach.
    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    /// Removes every node.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.heads.iter_mut().for_each(|h| *h = NIL);
        self.staged.clear();
        self.max_radius = 0.0;
        self.len = 0;
    }

    // --- ring splicing ---

    fn link(&mut self, idx: u32, cell: usize) {
        let head = self.heads[cell];
        if head == NIL {
            let slot = &mut self.slots[idx as usize];
            slot.next = idx;
            slot.prev = idx;
            self.heads[cell] = idx;
        } else {
            let tail = self.slots[head as usize].prev;
            {
                let slot = &mut self.slots[idx as usize];
                slot.next = head;
                slot.prev = tail;
            }
            self.slots[tail as usize].next = idx;
            self.slots[head as usize].prev = idx;
        }
        self.slots[idx as usize].cell = cell as u32;
    }

    fn unlink(&mut self, idx: u32) {
        let (cell, next, prev) = {
            let slot = &self.slots[idx as usize];
            (slot.cell as usize, slot.next, slot.prev)
        };
        if next == idx {
            self.heads[cell] = NIL;
        } else {
            self.slots[prev as usize].next = next;
            self.slots[next as usize].prev = prev;
            if self.heads[cell] == idx {
                self.heads[cell] = next;
            }
        }
        let slot = &mut self.slots[idx as usize];
        slot.next = NIL;
        slot.prev = NIL;
        slot.cell = NIL;
    }

    /// Iterates the slot indices of one cell ring.
    pub fn ring(&self, cell: usize) -> RingIter<'_> {
        let head = self.heads[cell];
        RingIter { slots: &self.slots, head, current: head }
    }

    // --- node lifecycle ---

    /// Registers a node at its (normalised) position. O(1).
    pub fn add(&mut self, spec: NodeSpec) -> NodeId {
        self.insert(spec, None, None)
    }

    /// Registers a node owned by an agent.
    pub fn add_owned(&mut self, spec: NodeSpec, owner: AgentId, kind: KindId) -> NodeId {
        self.insert(spec, Some(owner), Some(kind))
    }

    /// Registers a node constructed outside this process (e.g. received from another
    /// cluster rank). It is indexed immediately, independent of any staged commit.
    pub fn admit(&mut self, spec: NodeSpec, owner: Option<AgentId>, kind: Option<KindId>) -> NodeId {
        trace!("Admitting external node into space '{}' at {:?}", self.params.name, spec.position);
        self.insert(spec, owner, kind)
    }

    fn insert(&mut self, spec: NodeSpec, owner: Option<AgentId>, kind: Option<KindId>) -> NodeId {
        let mut node = SpaceNode::from_spec(spec, owner, kind);
        node.position = self.params.normalize(node.position);
        self.max_radius = self.max_radius.max(node.radius);
        let cell = get_grid_cell_idx(node.position, &self.params);

        let idx = match self.free.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.node = Some(node);
                slot.staged = false;
                idx
            }
            None => {
                self.slots.push(NodeSlot {
                    generation: 0,
                    next: NIL,
                    prev: NIL,
                    cell: NIL,
                    staged: false,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.link(idx, cell);
        self.len += 1;
        NodeId { index: idx, generation: self.slots[idx as usize].generation }
    }

    /// Unregisters a node and returns it. Panics if the handle is stale.
    pub fn remove(&mut self, id: NodeId) -> SpaceNode {
        self.check(id);
        self.unlink(id.index);
        let slot = &mut self.slots[id.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.staged = false;
        let node = slot.node.take();
        self.free.push(id.index);
        self.len -= 1;
        match node {
            Some(node) => node,
            None => unreachable!("checked slot lost its node"),
        }
    }

    fn check(&self, id: NodeId) {
        let live = self
            .slots
            .get(id.index as usize)
            .map(|s| s.generation == id.generation && s.node.is_some())
            .unwrap_or(false);
        assert!(live, "node {:?} is not registered in space '{}'", id, self.params.name);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&SpaceNode> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    /// The node behind `id`. Panics on an unregistered handle.
    pub fn node(&self, id: NodeId) -> &SpaceNode {
        self.check(id);
        self.node_at(id.index)
    }

    /// Mutable access to the non-index attributes (colour, rotation, body).
    pub fn node_mut(&mut self, id: NodeId) -> &mut SpaceNode {
        self.check(id);
        self.node_at_mut(id.index)
    }

    pub(crate) fn node_at(&self, idx: u32) -> &SpaceNode {
        match &self.slots[idx as usize].node {
            Some(n) => n,
            None => panic!("slot {} of space '{}' is empty", idx, self.params.name),
        }
    }

    pub(crate) fn node_at_mut(&mut self, idx: u32) -> &mut SpaceNode {
        match &mut self.slots[idx as usize].node {
            Some(n) => n,
            None => panic!("slot {} of space '{}' is empty", idx, self.params.name),
        }
    }

    pub(crate) fn id_at(&self, idx: u32) -> NodeId {
        NodeId { index: idx, generation: self.slots[idx as usize].generation }
    }

    /// All live nodes in slab order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SpaceNode)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.node
                .as_ref()
                .map(|n| (NodeId { index: i as u32, generation: s.generation }, n))
        })
    }

    // --- staged moves ---

    fn mark_staged(&mut self, idx: u32) {
        let slot = &mut self.slots[idx as usize];
        if !slot.staged {
            slot.staged = true;
            self.staged.push(idx);
        }
    }

    /// Stages an absolute move; visible to queries after the next commit.
    pub fn stage_move(&mut self, id: NodeId, target: Vector) {
        self.check(id);
        self.node_at_mut(id.index).new_position = Some(target);
        self.mark_staged(id.index);
    }

    /// Stages a relative move on top of any move already staged this phase.
    pub fn stage_translate(&mut self, id: NodeId, delta: Vector) {
        self.check(id);
        let node = self.node_at_mut(id.index);
        let base = node.new_position.unwrap_or(node.position);
        node.new_position = Some(base + delta);
        self.mark_staged(id.index);
    }

    /// Stages a radius change; applied with the moves.
    pub fn stage_radius(&mut self, id: NodeId, radius: f64) {
        self.check(id);
        self.node_at_mut(id.index).new_radius = Some(radius.max(0.0));
        self.mark_staged(id.index);
    }

    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Applies the staged move of one node: leave the old ring, join the ring of the new
    /// position's cell, and commit `position`.
    pub fn move_node(&mut self, id: NodeId) {
        self.check(id);
        self.apply_staged(id.index);
    }

    fn apply_staged(&mut self, idx: u32) {
        let (target, radius) = {
            let slot = &mut self.slots[idx as usize];
            slot.staged = false;
            match &mut slot.node {
                Some(node) => (node.new_position.take(), node.new_radius.take()),
                None => return,
            }
        };
        if let Some(r) = radius {
            self.max_radius = self.max_radius.max(r);
            self.node_at_mut(idx).radius = r;
        }
        if let Some(target) = target {
            let position = self.params.normalize(target);
            let cell = get_grid_cell_idx(position, &self.params);
            if self.slots[idx as usize].cell as usize != cell {
                self.unlink(idx);
                self.link(idx, cell);
            }
            self.node_at_mut(idx).position = position;
        }
    }

    /// Applies every staged change in staging order. Returns the number of nodes touched.
    pub fn commit(&mut self) -> usize {
        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();
        for idx in staged {
            if self.slots[idx as usize].staged {
                self.apply_staged(idx);
            }
        }
        count
    }

    // --- geometry ---

    /// Shortest displacement from `a` to `b`, wrapping where the topology wraps.
    pub fn get_vector(&self, a: Vector, b: Vector) -> Vector {
        self.params.displacement(a, b)
    }

    pub fn distance(&self, a: Vector, b: Vector) -> f64 {
        self.get_vector(a, b).length()
    }

    /// Normalises a position into this space's domain.
    pub fn normalize(&self, p: Vector) -> Vector {
        self.params.normalize(p)
    }

    /// Visits every node whose shape overlaps the given shape, with the displacement
    /// from `center` to the node. Scans only cells within reach.
    pub(crate) fn visit_overlaps<F>(
        &self,
        center: Vector,
        shape: Shape,
        radius: f64,
        exclude: Option<u32>,
        mut f: F,
    ) where
        F: FnMut(u32, &SpaceNode, Vector),
    {
        // the cell scan is a box, so per-axis reach also covers square corners
        let reach = radius + self.max_radius;
        for_each_cell_in_reach(center, reach, &self.params, |cell| {
            for idx in self.ring(cell) {
                if Some(idx) == exclude {
                    continue;
                }
                let node = self.node_at(idx);
                let d = self.params.displacement(center, node.position);
                if shapes_intersect(d, shape, radius, node.shape, node.radius) {
                    f(idx, node, d);
                }
            }
        });
    }

    /// Nodes intersecting the circle of `radius` around `center`, accepted by `filter`.
    pub fn agents_near<F>(&self, center: Vector, radius: f64, filter: F) -> Vec<NodeId>
    where
        F: Fn(&SpaceNode) -> bool,
    {
        let center = self.params.wrap_point(center);
        let mut result = Vec::new();
        self.visit_overlaps(center, Shape::Circle, radius, None, |idx, node, _| {
            if filter(node) {
                result.push(self.id_at(idx));
            }
        });
        result
    }

    /// Nodes intersecting the shape of node `id` (itself excluded). Panics on a stale handle.
    pub fn intersecting<F>(&self, id: NodeId, filter: F) -> Vec<NodeId>
    where
        F: Fn(&SpaceNode) -> bool,
    {
        let me = self.node(id);
        let mut result = Vec::new();
        self.visit_overlaps(me.position, me.shape, me.radius, Some(id.index), |idx, node, _| {
            if filter(node) {
                result.push(self.id_at(idx));
            }
        });
        result
    }

    /// Nodes within `margin` of a domain face, for exchange with neighbouring ranks.
    pub fn nodes_near_border(&self, margin: f64) -> Vec<NodeId> {
        let dim = self.params.dimension;
        self.iter()
            .filter(|(_, node)| {
                (0..dim).any(|axis| {
                    let a = &self.params.axes[axis];
                    let v = node.position.axis(axis);
                    v - a.min <= margin || a.max - v <= margin
                })
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Checks that every live node sits in exactly one ring, the one matching its position,
    /// and that ring links are symmetric.
    pub fn verify_index(&self) -> Result<(), IndexViolation> {
        let mut seen = vec![false; self.slots.len()];
        for cell in 0..self.heads.len() {
            for idx in self.ring(cell) {
                let slot = &self.slots[idx as usize];
                let Some(node) = &slot.node else {
                    return Err(IndexViolation::EmptySlotInRing { cell, slot: idx });
                };
                if self.slots[slot.next as usize].prev != idx || self.slots[slot.prev as usize].next != idx {
                    return Err(IndexViolation::BrokenLink { cell, slot: idx });
                }
                if seen[idx as usize] {
                    return Err(IndexViolation::Duplicate { slot: idx });
                }
                seen[idx as usize] = true;
                let expected = get_grid_cell_idx(node.position, &self.params);
                if expected != cell || slot.cell as usize != cell {
                    return Err(IndexViolation::WrongCell { slot: idx, ring: cell, expected });
                }
            }
        }
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.node.is_some() && !seen[idx] {
                return Err(IndexViolation::Missing { slot: idx as u32 });
            }
        }
        Ok(())
    }

    /// Cell coordinates of the ring a node currently sits in.
    pub fn cell_of(&self, id: NodeId) -> [usize; 3] {
        self.check(id);
        cell_coords(self.slots[id.index as usize].cell as usize, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapped_space(min: f64, max: f64, cell: f64) -> Space {
        Space::new(SpaceParams::from_bounds("s", &[min, min], &[max, max], &[true, true], cell).unwrap())
    }

    fn bounded_space() -> Space {
        Space::new(SpaceParams::from_bounds("b", &[0.0, 0.0], &[10.0, 10.0], &[false, false], 2.0).unwrap())
    }

    fn all(_: &SpaceNode) -> bool {
        true
    }

    #[test]
    fn wrapped_vector_takes_short_way() {
        let space = wrapped_space(-10.0, 10.0, 2.0);
        let v = space.get_vector(Vector::xy(-9.9, 0.0), Vector::xy(9.9, 0.0));
        assert!((v.x + 0.2).abs() < 1e-9, "got {}", v.x);
    }

    #[test]
    fn staged_move_wraps_and_is_invisible_until_commit() {
        let mut space = wrapped_space(0.0, 20.0, 2.0);
        let id = space.add(NodeSpec::circle(Vector::xy(19.0, 10.0), 0.5));
        space.stage_translate(id, Vector::xy(2.0, 0.0));

        assert_eq!(space.node(id).position().x, 19.0);
        assert_eq!(space.agents_near(Vector::xy(1.0, 10.0), 0.1, all).len(), 0);

        space.commit();
        assert!((space.node(id).position().x - 1.0).abs() < 1e-12);
        assert_eq!(space.agents_near(Vector::xy(1.0, 10.0), 0.1, all), vec![id]);
        assert_eq!(space.cell_of(id), [0, 5, 0]);
        space.verify_index().unwrap();
    }

    #[test]
    fn removal_keeps_ring_connected() {
        let mut space = wrapped_space(0.0, 10.0, 10.0);
        let ids: Vec<NodeId> = (0..5)
            .map(|i| space.add(NodeSpec::circle(Vector::xy(1.0 + i as f64, 1.0), 0.1)))
            .collect();
        space.remove(ids[0]);
        space.remove(ids[3]);
        space.verify_index().unwrap();
        let members: Vec<u32> = space.ring(0).collect();
        assert_eq!(members, vec![ids[1].index, ids[2].index, ids[4].index]);
        assert_eq!(space.len(), 3);
    }

    #[test]
    fn freed_slot_gets_new_generation() {
        let mut space = wrapped_space(0.0, 10.0, 1.0);
        let a = space.add(NodeSpec::circle(Vector::xy(1.0, 1.0), 0.1));
        space.remove(a);
        let b = space.add(NodeSpec::circle(Vector::xy(2.0, 2.0), 0.1));
        assert_eq!(a.index, b.index);
        assert!(!space.contains(a));
        assert!(space.contains(b));
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn querying_a_removed_node_panics() {
        let mut space = wrapped_space(0.0, 10.0, 1.0);
        let a = space.add(NodeSpec::circle(Vector::xy(1.0, 1.0), 0.1));
        space.remove(a);
        space.intersecting(a, all);
    }

    #[test]
    fn query_sees_across_wrapped_edge() {
        let mut space = wrapped_space(0.0, 20.0, 2.0);
        let a = space.add(NodeSpec::circle(Vector::xy(0.2, 5.0), 0.5));
        let b = space.add(NodeSpec::circle(Vector::xy(19.6, 5.0), 0.5));
        assert_eq!(space.intersecting(a, all), vec![b]);
        assert_eq!(space.intersecting(b, all), vec![a]);
    }

    #[test]
    fn bounded_axis_clamps_position() {
        let params = SpaceParams::from_bounds("b", &[0.0, 0.0], &[10.0, 10.0], &[false, false], 2.0).unwrap();
        let mut space = Space::new(params);
        let id = space.add(NodeSpec::circle(Vector::xy(5.0, 5.0), 0.5));
        space.stage_move(id, Vector::xy(12.0, -1.0));
        space.commit();
        assert_eq!(space.node(id).position(), Vector::xy(10.0, 0.0));
        space.verify_index().unwrap();
    }

    #[test]
    fn border_export_respects_margin() {
        let mut space = wrapped_space(0.0, 10.0, 1.0);
        let edge = space.add(NodeSpec::circle(Vector::xy(0.5, 5.0), 0.1));
        space.add(NodeSpec::circle(Vector::xy(5.0, 5.0), 0.1));
        let far_edge = space.add(NodeSpec::circle(Vector::xy(5.0, 9.8), 0.1));
        assert_eq!(space.nodes_near_border(1.0), vec![edge, far_edge]);
    }

    #[test]
    fn border_margin_is_inclusive_on_both_faces() {
        let mut space = bounded_space();
        let low = space.add(NodeSpec::circle(Vector::xy(1.0, 5.0), 0.1));
        let high = space.add(NodeSpec::circle(Vector::xy(9.0, 5.0), 0.1));
        space.add(NodeSpec::circle(Vector::xy(5.0, 5.0), 0.1));
        assert_eq!(space.nodes_near_border(1.0), vec![low, high]);
        assert!(space.nodes_near_border(0.5).is_empty());
    }

    #[test]
    fn query_centered_outside_a_bounded_domain() {
        let mut space = bounded_space();
        let id = space.add(NodeSpec::circle(Vector::xy(7.5, 5.0), 0.0));
        // 4.5 away from the centre
        assert!(space.agents_near(Vector::xy(12.0, 5.0), 3.0, all).is_empty());
        assert_eq!(space.agents_near(Vector::xy(12.0, 5.0), 5.0, all), vec![id]);
        assert!(space.agents_near(Vector::xy(5.0, -4.0), 8.0, all).is_empty());
    }

    #[test]
    fn three_dimensional_queries() {
        let params = SpaceParams::from_bounds(
            "cube",
            &[0.0, 0.0, 0.0],
            &[10.0, 10.0, 10.0],
            &[true, true, true],
            2.0,
        )
        .unwrap();
        let mut space = Space::new(params);
        let a = space.add(NodeSpec::circle(Vector::new(5.0, 5.0, 0.3), 0.5));
        let b = space.add(NodeSpec::circle(Vector::new(5.0, 5.0, 9.9), 0.5));
        space.add(NodeSpec::circle(Vector::new(5.0, 5.0, 5.0), 0.5));
        assert_eq!(space.intersecting(a, all), vec![b]);
        space.verify_index().unwrap();
    }
}
