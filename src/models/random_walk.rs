//! Foragers on a wrapped plane with a diffusing food field.
//!
//! Walkers drift up the food gradient with a noisy heading, eat what lies under them,
//! split when they have enough energy and starve when they run out. The model drops new
//! food at random spots every tick.

use std::f64::consts::PI;

use log::info;
use spark_common::{angle_to_vec, Rgba, SimulationConfig, Vector};

use crate::agent::{KindRegistry, KindSpec, Steppable};
use crate::context::Context;
use crate::error::Result;
use crate::node::NodeSpec;
use crate::simulation::Model;

pub const NAME: &str = "random_walk";
pub const WALKER: &str = "Walker";
pub const SPACE: &str = "world";
pub const FOOD: &str = "food";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkParams {
    pub step: f64,
    pub radius: f64,
    pub turn_sd: f64,
    pub gradient_bias: f64,
    pub bite: f64,
    pub metabolism: f64,
    pub birth_energy: f64,
}

#[derive(Debug, Clone)]
pub struct Walker {
    pub energy: f64,
    heading: f64,
    params: WalkParams,
}

impl Walker {
    pub fn new(energy: f64, heading: f64, params: WalkParams) -> Self {
        Walker { energy, heading, params }
    }
}

impl Steppable for Walker {
    fn step(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let p = self.params;
        let food = ctx.layer_id(FOOD)?;
        let pos = ctx.my_position()?;

        let bite = ctx.layer_value(food, pos).clamp(0.0, p.bite);
        if bite > 0.0 {
            self.energy += bite;
            ctx.add_layer_value(food, pos, -bite);
        }

        self.heading += ctx.rng().normal_with(0.0, p.turn_sd);
        let pull = ctx.gradient(food, pos).normalize_or_zero() * p.gradient_bias;
        let dir = (angle_to_vec(self.heading) + pull).normalize_or_zero();
        ctx.translate(dir * p.step)?;

        self.energy -= p.metabolism;
        if self.energy <= 0.0 {
            ctx.kill_self();
            return Ok(());
        }

        if self.energy >= p.birth_energy {
            self.energy *= 0.5;
            let me = ctx.me().ok_or_else(|| anyhow::anyhow!("walker stepped without identity"))?;
            let (space, _) = ctx.node_of(me).ok_or_else(|| anyhow::anyhow!("walker {} has no node", me))?;
            let kind = ctx.kind(WALKER)?;
            let child = Walker::new(self.energy, self.heading + PI, p);
            ctx.spawn_at(kind, child, space, NodeSpec::circle(pos, p.radius).with_color(Rgba::YELLOW))?;
        }

        let hunger = (1.0 - self.energy / p.birth_energy) as f32;
        ctx.set_color(Rgba::GREEN.lerp(Rgba::RED, hunger))?;
        Ok(())
    }

    fn variable(&self, name: &str) -> Option<f64> {
        match name {
            "energy" => Some(self.energy),
            "heading" => Some(self.heading),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomWalk {
    params: WalkParams,
    initial_walkers: usize,
    initial_energy: f64,
    drops_per_tick: usize,
    drop_amount: f64,
    stop_when_extinct: bool,
}

impl RandomWalk {
    pub fn from_config(config: &SimulationConfig) -> Self {
        let p = |name: &str, default: f64| config.parameter(name, default);
        RandomWalk {
            params: WalkParams {
                step: p("step", 0.5),
                radius: p("radius", 0.25),
                turn_sd: p("turn_sd", 0.4),
                gradient_bias: p("gradient_bias", 0.5),
                bite: p("bite", 0.2),
                metabolism: p("metabolism", 0.05),
                birth_energy: p("birth_energy", 4.0),
            },
            initial_walkers: p("walkers", 100.0).max(0.0) as usize,
            initial_energy: p("initial_energy", 2.0),
            drops_per_tick: p("drops_per_tick", 5.0).max(0.0) as usize,
            drop_amount: p("drop_amount", 2.0),
            stop_when_extinct: p("stop_when_extinct", 1.0) != 0.0,
        }
    }
}

impl Model for RandomWalk {
    fn name(&self) -> &str {
        NAME
    }

    fn register(&self, registry: &mut KindRegistry) -> Result<()> {
        registry.register(KindSpec::new(WALKER).spatial())?;
        Ok(())
    }

    fn setup(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let space = ctx.space_id(SPACE)?;
        ctx.layer_id(FOOD)?;
        let kind = ctx.kind(WALKER)?;
        let params = ctx.space(space).params().clone();

        for _ in 0..self.initial_walkers {
            let mut pos = Vector::ZERO;
            for axis in 0..params.dimension {
                let a = &params.axes[axis];
                pos = pos.with_axis(axis, ctx.rng().random_range(a.min, a.max));
            }
            let heading = ctx.rng().random_range(0.0, 2.0 * PI);
            let walker = Walker::new(self.initial_energy, heading, self.params);
            ctx.spawn_at(kind, walker, space, NodeSpec::circle(pos, self.params.radius).with_color(Rgba::GREEN))?;
        }
        info!("Placed {} walkers in '{}'", self.initial_walkers, SPACE);
        Ok(())
    }

    fn begin(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let food = ctx.layer_id(FOOD)?;
        let space = ctx.space_id(SPACE)?;
        let params = ctx.space(space).params().clone();
        for _ in 0..self.drops_per_tick {
            let mut pos = Vector::ZERO;
            for axis in 0..params.dimension {
                let a = &params.axes[axis];
                pos = pos.with_axis(axis, ctx.rng().random_range(a.min, a.max));
            }
            ctx.add_layer_value(food, pos, self.drop_amount);
        }
        Ok(())
    }

    fn end(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<bool> {
        let kind = ctx.kind(WALKER)?;
        Ok(self.stop_when_extinct && ctx.agents_of_kind(kind).is_empty())
    }
}
