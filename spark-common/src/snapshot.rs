use serde::{Deserialize, Serialize};

/// Shape tag of a space node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Circle,
    /// Axis-aligned square; the node radius is half the side length.
    Square,
}

/// Plain copy of one space node, detached from the live index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Agent index and generation, packed as `(index << 32) | generation`.
    pub agent: u64,
    pub kind: String,
    pub space: String,
    pub position: [f64; 3],
    pub radius: f64,
    pub shape: Shape,
    pub rotation: f64,
    pub color: [f32; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<[f64; 3]>,
}

/// Plain copy of a data layer's values in x-fastest order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub name: String,
    pub dims: [usize; 3],
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindCount {
    pub kind: String,
    pub count: usize,
}

/// One row of collected data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    pub tick: u64,
    pub time: f64,
    /// `(collector name, value)` in collector registration order; failed collectors are absent.
    pub values: Vec<(String, f64)>,
}

impl DataRow {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// A snapshot of the simulation state at a specific tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    /// Simulation time (tick * time step).
    pub time: f64,
    pub agent_counts: Vec<KindCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeSnapshot>>,
    pub layers: Vec<LayerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DataRow>,
}

impl Snapshot {
    pub fn count_of(&self, kind: &str) -> usize {
        self.agent_counts
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}
