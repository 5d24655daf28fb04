#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use spark_common::{SimulationConfig, Vector};
use spark_engine::{Context, KindRegistry, KindSpec, Model, Steppable};

type SetupFn = Box<dyn FnMut(&mut Context<'_>) -> anyhow::Result<()>>;
type EndFn = Box<dyn FnMut(&mut Context<'_>) -> anyhow::Result<bool>>;

fn no_hook(_: &mut Context<'_>) -> anyhow::Result<()> {
    Ok(())
}

fn never_stop(_: &mut Context<'_>) -> anyhow::Result<bool> {
    Ok(false)
}

/// Model assembled from closures so each test only spells out what it needs.
pub struct TestModel {
    kinds: Vec<KindSpec>,
    setup: SetupFn,
    begin: SetupFn,
    end: EndFn,
}

impl TestModel {
    pub fn new(kinds: Vec<KindSpec>) -> Self {
        TestModel {
            kinds,
            setup: Box::new(no_hook),
            begin: Box::new(no_hook),
            end: Box::new(never_stop),
        }
    }

    pub fn on_setup(mut self, f: impl FnMut(&mut Context<'_>) -> anyhow::Result<()> + 'static) -> Self {
        self.setup = Box::new(f);
        self
    }

    pub fn on_begin(mut self, f: impl FnMut(&mut Context<'_>) -> anyhow::Result<()> + 'static) -> Self {
        self.begin = Box::new(f);
        self
    }

    pub fn on_end(mut self, f: impl FnMut(&mut Context<'_>) -> anyhow::Result<bool> + 'static) -> Self {
        self.end = Box::new(f);
        self
    }
}

impl Model for TestModel {
    fn name(&self) -> &str {
        "test"
    }

    fn register(&self, registry: &mut KindRegistry) -> spark_engine::Result<()> {
        for spec in &self.kinds {
            registry.register(spec.clone())?;
        }
        Ok(())
    }

    fn setup(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        (self.setup)(ctx)
    }

    fn begin(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        (self.begin)(ctx)
    }

    fn end(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<bool> {
        (self.end)(ctx)
    }
}

/// Does nothing.
#[derive(Debug, Default)]
pub struct Idle;

impl Steppable for Idle {
    fn step(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Translates its node by a fixed delta every step.
#[derive(Debug)]
pub struct Mover(pub Vector);

impl Steppable for Mover {
    fn step(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        ctx.translate(self.0)?;
        Ok(())
    }
}

/// Counts its own steps into a shared counter.
#[derive(Debug)]
pub struct Counter(pub Rc<Cell<u32>>);

impl Steppable for Counter {
    fn step(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }

    fn variable(&self, name: &str) -> Option<f64> {
        (name == "count").then(|| self.0.get() as f64)
    }
}

/// A 2D square domain of side 20 with cell size 2.
pub fn plane_config(wrap: bool, extra: &str) -> SimulationConfig {
    let text = format!(
        r#"
        [simulation]
        model = "test"
        seed = 42
        ticks = 10

        [[spaces]]
        name = "plane"
        min = [0.0, 0.0]
        max = [20.0, 20.0]
        wrap = [{wrap}, {wrap}]
        cell_size = 2.0

        {extra}
        "#
    );
    SimulationConfig::from_toml_str(&text).unwrap()
}

/// Same domain, bounded, with physics enabled and no damping.
pub fn physics_config(collision_stiffness: f64) -> SimulationConfig {
    plane_config(
        false,
        &format!(
            r#"
            [spaces.physics]
            dt = 1.0
            damping = 1.0
            collision_stiffness = {collision_stiffness:?}
            "#
        ),
    )
}
