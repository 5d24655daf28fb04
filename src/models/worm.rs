//! A chain of physical segments joined by springs and driven by a travelling wave.

use log::info;
use spark_common::{angle_to_vec, Rgba, SimulationConfig, Vector};

use crate::agent::{AgentBox, AgentId, KindRegistry, KindSpec, Steppable};
use crate::context::Context;
use crate::error::Result;
use crate::node::{Body, NodeSpec};
use crate::physics::{register_spring, Spring, SPRING_KIND};
use crate::simulation::Model;

pub const NAME: &str = "worm";
pub const SEGMENT: &str = "Segment";
pub const MUSCLE: &str = "Muscle";
pub const SPACE: &str = "tank";

/// Body segment; colours itself by speed.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    speed: f64,
}

impl Steppable for Segment {
    fn step(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let Some(me) = ctx.me() else {
            return Ok(());
        };
        self.speed = ctx.velocity_of(me).map(|v| v.length()).unwrap_or(0.0);
        ctx.set_color(Rgba::BLUE.lerp(Rgba::RED, self.speed.min(1.0) as f32))?;
        Ok(())
    }

    fn variable(&self, name: &str) -> Option<f64> {
        (name == "speed").then_some(self.speed)
    }
}

fn new_segment() -> AgentBox {
    Box::new(Segment::default())
}

/// Non-spatial controller pushing the segments with a lateral sine wave plus forward
/// thrust on the head.
#[derive(Debug, Clone)]
pub struct Muscle {
    segments: Vec<AgentId>,
    heading: f64,
    amplitude: f64,
    frequency: f64,
    wavelength: f64,
    thrust: f64,
    head_x: f64,
}

impl Steppable for Muscle {
    fn step(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let forward = angle_to_vec(self.heading);
        let lateral = Vector::xy(-forward.y, forward.x);
        let t = ctx.time();
        for (i, &seg) in self.segments.iter().enumerate() {
            if !ctx.is_alive(seg) {
                continue;
            }
            let phase = 2.0 * std::f64::consts::PI * (self.frequency * t - i as f64 / self.wavelength);
            let mut f = lateral * (self.amplitude * phase.sin());
            if i == 0 {
                f += forward * self.thrust;
            }
            ctx.apply_force(seg, f)?;
        }
        if let Some(head) = self.segments.first().and_then(|&h| ctx.position_of(h)) {
            self.head_x = head.x;
        }
        Ok(())
    }

    fn variable(&self, name: &str) -> Option<f64> {
        (name == "head_x").then_some(self.head_x)
    }
}

#[derive(Debug, Clone)]
pub struct Worm {
    segments: usize,
    spacing: f64,
    radius: f64,
    mass: f64,
    spring_stiffness: f64,
    amplitude: f64,
    frequency: f64,
    wavelength: f64,
    thrust: f64,
}

impl Worm {
    pub fn from_config(config: &SimulationConfig) -> Self {
        let p = |name: &str, default: f64| config.parameter(name, default);
        Worm {
            segments: p("segments", 12.0).max(1.0) as usize,
            spacing: p("spacing", 1.0),
            radius: p("radius", 0.45),
            mass: p("mass", 1.0),
            spring_stiffness: p("spring_stiffness", 2.0),
            amplitude: p("amplitude", 0.3),
            frequency: p("frequency", 0.1),
            wavelength: p("wavelength", 6.0),
            thrust: p("thrust", 0.05),
        }
    }
}

impl Model for Worm {
    fn name(&self) -> &str {
        NAME
    }

    fn register(&self, registry: &mut KindRegistry) -> Result<()> {
        registry.register(KindSpec::new(SEGMENT).physical().factory(new_segment))?;
        register_spring(registry)?;
        registry.register(KindSpec::new(MUSCLE))?;
        Ok(())
    }

    fn setup(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let space = ctx.space_id(SPACE)?;
        let segment_kind = ctx.kind(SEGMENT)?;
        let spring_kind = ctx.kind(SPRING_KIND)?;
        let muscle_kind = ctx.kind(MUSCLE)?;

        let params = ctx.space(space).params();
        let center = Vector::new(
            (params.axes[0].min + params.axes[0].max) * 0.5,
            (params.axes[1].min + params.axes[1].max) * 0.5,
            (params.axes[2].min + params.axes[2].max) * 0.5,
        );
        let heading = ctx.rng().random_range(0.0, 2.0 * std::f64::consts::PI);
        let dir = angle_to_vec(heading);

        let mut segments = Vec::with_capacity(self.segments);
        for i in 0..self.segments {
            let pos = center - dir * (i as f64 * self.spacing);
            let spec = NodeSpec::circle(pos, self.radius).with_body(Body::new(self.mass));
            segments.push(ctx.spawn_at(segment_kind, Segment::default(), space, spec)?);
        }
        for pair in segments.windows(2) {
            ctx.spawn(spring_kind, Spring::new(pair[0], pair[1], self.spacing, self.spring_stiffness))?;
        }
        ctx.spawn(
            muscle_kind,
            Muscle {
                segments,
                heading,
                amplitude: self.amplitude,
                frequency: self.frequency,
                wavelength: self.wavelength,
                thrust: self.thrust,
                head_x: center.x,
            },
        )?;
        info!("Built a worm of {} segments heading {:.2} rad", self.segments, heading);
        Ok(())
    }
}
