//! Force integration for spaces with physics enabled.
//!
//! Forces accumulate on node bodies during a tick (springs, agent pushes), collision
//! repulsion is added at commit from the committed positions, then one explicit Euler
//! step turns everything into staged moves.

use log::trace;
use rayon::prelude::*;
use spark_common::{Shape, Vector};

use crate::agent::{AgentId, KindRegistry, KindSpec, Steppable};
use crate::context::Context;
use crate::error::Result;
use crate::space::Space;

const MIN_SEPARATION: f64 = 1e-12;

/// Name under which [`register_spring`] registers the spring kind.
pub const SPRING_KIND: &str = "Spring";

/// Adds pairwise collision repulsion to every body in `space`.
///
/// Each body's force is computed independently from the committed positions, so the
/// result does not depend on the order in which pairs are visited.
pub fn accumulate_collisions(space: &mut Space) {
    let Some(physics) = space.physics().copied() else {
        return;
    };
    let k = physics.collision_stiffness;
    if k <= 0.0 {
        return;
    }

    let bodies: Vec<u32> = space
        .iter()
        .filter(|(_, n)| n.body.is_some())
        .map(|(id, _)| id.index())
        .collect();

    let view = &*space;
    let dim = view.params().dimension;
    let forces: Vec<(u32, Vector)> = bodies
        .par_iter()
        .map(|&idx| {
            let me = view.node_at(idx);
            let mut force = Vector::ZERO;
            view.visit_overlaps(me.position(), me.shape(), me.radius(), Some(idx), |_, other, d| {
                if other.body.is_none() {
                    return;
                }
                let dist = d.length();
                if dist < MIN_SEPARATION {
                    return;
                }
                if me.shape() == Shape::Square && other.shape() == Shape::Square {
                    force += square_push(d, me.radius() + other.radius(), dim) * k;
                    return;
                }
                let overlap = me.radius() + other.radius() - dist;
                if overlap > 0.0 {
                    force -= d * (k * overlap / dist);
                }
            });
            (idx, force)
        })
        .collect();

    for (idx, f) in forces {
        if let Some(body) = space.node_at_mut(idx).body.as_mut() {
            body.apply_force(f);
        }
    }
}

/// Separation of two overlapping axis-aligned squares: along the axis of least
/// penetration, away from `d`. Ties go to the lower axis.
fn square_push(d: Vector, reach: f64, dim: usize) -> Vector {
    let mut best: Option<(usize, f64)> = None;
    for axis in 0..dim {
        let depth = reach - d.axis(axis).abs();
        if depth <= 0.0 {
            return Vector::ZERO;
        }
        if best.map_or(true, |(_, b)| depth < b) {
            best = Some((axis, depth));
        }
    }
    match best {
        Some((axis, depth)) => Vector::ZERO.with_axis(axis, -d.axis(axis).signum() * depth),
        None => Vector::ZERO,
    }
}

/// Explicit Euler step: `v += F/m dt`, damping, speed clamp, then a staged move by `v dt`
/// on top of any move already staged. Clears accumulated forces.
pub fn integrate(space: &mut Space) -> usize {
    let Some(physics) = space.physics().copied() else {
        return 0;
    };
    let ids: Vec<_> = space
        .iter()
        .filter(|(_, n)| n.body.is_some())
        .map(|(id, _)| id)
        .collect();

    let mut moved = 0;
    for id in ids {
        let node = space.node_mut(id);
        let Some(body) = node.body.as_mut() else {
            continue;
        };
        let mut v = body.velocity + body.force * (physics.dt / body.mass);
        v = v * physics.damping;
        v = v.truncate(physics.max_speed);
        body.velocity = v;
        body.force = Vector::ZERO;

        if v.length_squared() > 0.0 {
            space.stage_translate(id, v * physics.dt);
            moved += 1;
        }
    }
    trace!("Integrated {} bodies in space '{}'", moved, space.name());
    moved
}

/// Hookean link between two physical agents.
#[derive(Debug, Clone)]
pub struct Spring {
    pub a: AgentId,
    pub b: AgentId,
    pub rest_length: f64,
    pub stiffness: f64,
    length: f64,
}

impl Spring {
    pub fn new(a: AgentId, b: AgentId, rest_length: f64, stiffness: f64) -> Self {
        Spring { a, b, rest_length, stiffness, length: rest_length }
    }

    /// Force on end `a`; end `b` receives its negation. `d` points from `a` to `b`.
    pub fn force_on_a(&self, d: Vector) -> Vector {
        let len = d.length();
        if len < MIN_SEPARATION {
            return Vector::ZERO;
        }
        d * (self.stiffness * (len - self.rest_length) / len)
    }

    pub fn length(&self) -> f64 {
        self.length
    }
}

impl Steppable for Spring {
    fn step(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        if !ctx.is_alive(self.a) || !ctx.is_alive(self.b) {
            ctx.kill_self();
            return Ok(());
        }
        let Some(d) = ctx.vector_between(self.a, self.b) else {
            anyhow::bail!("spring ends {} and {} do not share a space", self.a, self.b);
        };
        self.length = d.length();
        let f = self.force_on_a(d);
        ctx.apply_force(self.a, f)?;
        ctx.apply_force(self.b, -f)?;
        Ok(())
    }

    fn variable(&self, name: &str) -> Option<f64> {
        match name {
            "length" => Some(self.length),
            "tension" => Some(self.stiffness * (self.length - self.rest_length)),
            _ => None,
        }
    }
}

/// Registers the non-spatial spring kind.
pub fn register_spring(registry: &mut KindRegistry) -> Result<()> {
    registry.register(KindSpec::new(SPRING_KIND))?;
    Ok(())
}
