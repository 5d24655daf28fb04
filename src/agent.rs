//! Agent capabilities and the explicit kind registry.
//!
//! Agents are trait objects implementing [`Steppable`]. Whether an agent occupies space or
//! takes part in force integration is a property of its kind, realised by the node the
//! engine creates for it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::context::Context;
use crate::error::{Result, SparkError};

/// Stable handle into the agent arena. The generation detects reuse of a freed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl AgentId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// `(index << 32) | generation`, as carried in snapshots.
    pub fn to_u64(&self) -> u64 {
        ((self.index as u64) << 32) | self.generation as u64
    }

    pub fn from_u64(packed: u64) -> Self {
        AgentId {
            index: (packed >> 32) as u32,
            generation: packed as u32,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Downcasting support for agent trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Anything the engine steps once per tick.
pub trait Steppable: AsAny {
    /// Advances the agent by one tick. Position changes, births, deaths and layer
    /// writes made through `ctx` take effect at the next commit.
    fn step(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()>;

    /// Named numeric state, read by data collectors.
    fn variable(&self, _name: &str) -> Option<f64> {
        None
    }
}

pub type AgentBox = Box<dyn Steppable>;

/// Builds a default agent of a kind, used when agents arrive by name (remote admission).
pub type AgentFactory = fn() -> AgentBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId(pub(crate) u16);

impl KindId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Which kinds a query accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Any,
    /// Exactly this kind.
    Exact(KindId),
    /// This kind or any kind derived from it.
    Family(KindId),
}

/// Registration request for an agent kind.
#[derive(Debug, Clone)]
pub struct KindSpec {
    name: String,
    parent: Option<String>,
    spatial: bool,
    physical: bool,
    every: u64,
    factory: Option<AgentFactory>,
}

impl KindSpec {
    pub fn new(name: &str) -> Self {
        KindSpec {
            name: name.to_string(),
            parent: None,
            spatial: false,
            physical: false,
            every: 1,
            factory: None,
        }
    }

    /// Agents of this kind own a node in a space.
    pub fn spatial(mut self) -> Self {
        self.spatial = true;
        self
    }

    /// Agents of this kind own a node with a physics body.
    pub fn physical(mut self) -> Self {
        self.spatial = true;
        self.physical = true;
        self
    }

    /// Derives from an already registered kind; family queries on the parent include this kind.
    pub fn child_of(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Step only on ticks divisible by `every`.
    pub fn every(mut self, every: u64) -> Self {
        self.every = every.max(1);
        self
    }

    pub fn factory(mut self, factory: AgentFactory) -> Self {
        self.factory = Some(factory);
        self
    }
}

#[derive(Debug, Clone)]
pub struct KindDescriptor {
    pub id: KindId,
    pub name: String,
    pub parent: Option<KindId>,
    pub spatial: bool,
    pub physical: bool,
    pub every: u64,
    pub factory: Option<AgentFactory>,
}

/// Name -> descriptor table. Registration order is processing order.
#[derive(Debug, Default, Clone)]
pub struct KindRegistry {
    kinds: Vec<KindDescriptor>,
    by_name: HashMap<String, KindId>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: KindSpec) -> Result<KindId> {
        if self.by_name.contains_key(&spec.name) {
            return Err(SparkError::DuplicateKind(spec.name));
        }
        let parent = match &spec.parent {
            Some(p) => Some(self.id(p).ok_or_else(|| SparkError::UnknownKind(p.clone()))?),
            None => None,
        };
        if let Some(p) = parent {
            let parent_desc = &self.kinds[p.index()];
            if parent_desc.spatial && !spec.spatial {
                return Err(SparkError::Capability {
                    kind: spec.name,
                    reason: format!("must be spatial like its parent '{}'", parent_desc.name),
                });
            }
        }
        let id = KindId(self.kinds.len() as u16);
        self.by_name.insert(spec.name.clone(), id);
        self.kinds.push(KindDescriptor {
            id,
            name: spec.name,
            parent,
            spatial: spec.spatial,
            physical: spec.physical,
            every: spec.every,
            factory: spec.factory,
        });
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Option<KindId> {
        self.by_name.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<KindId> {
        self.id(name).ok_or_else(|| SparkError::UnknownKind(name.to_string()))
    }

    pub fn descriptor(&self, id: KindId) -> &KindDescriptor {
        &self.kinds[id.index()]
    }

    pub fn name(&self, id: KindId) -> &str {
        &self.kinds[id.index()].name
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// All kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &KindDescriptor> {
        self.kinds.iter()
    }

    /// True if `kind` is `ancestor` or derives from it.
    pub fn is_a(&self, kind: KindId, ancestor: KindId) -> bool {
        let mut current = Some(kind);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.kinds[k.index()].parent;
        }
        false
    }

    pub fn matches(&self, kind: KindId, filter: KindFilter) -> bool {
        match filter {
            KindFilter::Any => true,
            KindFilter::Exact(k) => kind == k,
            KindFilter::Family(k) => self.is_a(kind, k),
        }
    }
}
