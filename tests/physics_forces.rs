mod common;

use common::{physics_config, plane_config, Idle, TestModel};
use spark_common::{ExecutionMode, Vector};
use spark_engine::physics::{register_spring, Spring, SPRING_KIND};
use spark_engine::{AgentId, KindRegistry, KindSpec, Model, NodeSpec, Simulation, SparkError};

fn physical_model() -> TestModel {
    TestModel::new(vec![KindSpec::new("Ball").physical()])
}

/// Spawns balls at the given x positions (y = 10) and returns their ids in spawn order.
fn spawn_balls(sim: &mut Simulation, xs: &[f64]) -> Vec<AgentId> {
    sim.with_context(|ctx| {
        let space = ctx.space_id("plane").unwrap();
        let kind = ctx.kind("Ball").unwrap();
        xs.iter()
            .map(|&x| ctx.spawn_at(kind, Idle, space, NodeSpec::circle(Vector::xy(x, 10.0), 1.0)).unwrap())
            .collect()
    })
}

fn velocity(sim: &mut Simulation, id: AgentId) -> Vector {
    sim.with_context(|ctx| ctx.velocity_of(id)).unwrap()
}

#[test]
fn overlapping_bodies_are_pushed_apart_symmetrically() {
    let mut sim = Simulation::new(physics_config(1.0), Box::new(physical_model())).unwrap();
    sim.setup(None, ExecutionMode::Serial).unwrap();
    let ids = spawn_balls(&mut sim, &[5.0, 6.5]);

    sim.step().unwrap();
    let va = velocity(&mut sim, ids[0]);
    let vb = velocity(&mut sim, ids[1]);
    assert!((va.x + 0.5).abs() < 1e-12, "{:?}", va);
    assert!((vb.x - 0.5).abs() < 1e-12, "{:?}", vb);
    assert_eq!(va.y, 0.0);

    let xs: Vec<f64> = sim.node_snapshots().iter().map(|n| n.position[0]).collect();
    assert!((xs[0] - 4.5).abs() < 1e-12 && (xs[1] - 7.0).abs() < 1e-12, "{:?}", xs);
}

#[test]
fn collision_forces_do_not_depend_on_creation_order() {
    let xs = [4.0, 5.2, 6.1, 9.0, 9.9];
    let mut forward = Simulation::new(physics_config(0.7), Box::new(physical_model())).unwrap();
    forward.setup(None, ExecutionMode::Serial).unwrap();
    let forward_ids = spawn_balls(&mut forward, &xs);

    let reversed_xs: Vec<f64> = xs.iter().rev().copied().collect();
    let mut backward = Simulation::new(physics_config(0.7), Box::new(physical_model())).unwrap();
    backward.setup(None, ExecutionMode::Serial).unwrap();
    let mut backward_ids = spawn_balls(&mut backward, &reversed_xs);
    backward_ids.reverse();

    forward.step().unwrap();
    backward.step().unwrap();
    for (&f, &b) in forward_ids.iter().zip(&backward_ids) {
        let vf = velocity(&mut forward, f);
        let vb = velocity(&mut backward, b);
        assert!((vf - vb).length() < 1e-12, "{:?} vs {:?}", vf, vb);
    }
}

#[test]
fn separated_bodies_feel_nothing() {
    let mut sim = Simulation::new(physics_config(1.0), Box::new(physical_model())).unwrap();
    sim.setup(None, ExecutionMode::Serial).unwrap();
    let ids = spawn_balls(&mut sim, &[3.0, 8.0]);
    sim.step().unwrap();
    for id in ids {
        assert_eq!(velocity(&mut sim, id), Vector::ZERO);
    }
}

struct Chain;

impl Model for Chain {
    fn name(&self) -> &str {
        "chain"
    }

    fn register(&self, registry: &mut KindRegistry) -> spark_engine::Result<()> {
        registry.register(KindSpec::new("Ball").physical())?;
        register_spring(registry)
    }

    fn setup(&mut self, ctx: &mut spark_engine::Context<'_>) -> anyhow::Result<()> {
        let space = ctx.space_id("plane")?;
        let ball = ctx.kind("Ball")?;
        let spring = ctx.kind(SPRING_KIND)?;
        let a = ctx.spawn_at(ball, Idle, space, NodeSpec::circle(Vector::xy(5.0, 10.0), 0.1))?;
        let b = ctx.spawn_at(ball, Idle, space, NodeSpec::circle(Vector::xy(8.0, 10.0), 0.1))?;
        ctx.spawn(spring, Spring::new(a, b, 2.0, 0.5))?;
        Ok(())
    }
}

#[test]
fn stretched_spring_pulls_both_ends_equally() {
    let mut sim = Simulation::new(physics_config(0.0), Box::new(Chain)).unwrap();
    sim.setup(None, ExecutionMode::Serial).unwrap();
    let ball = sim.registry().id("Ball").unwrap();
    let ends: Vec<AgentId> = sim.agents().of_kind(ball).to_vec();

    sim.step().unwrap();
    let va = velocity(&mut sim, ends[0]);
    let vb = velocity(&mut sim, ends[1]);
    // stretch 1.0 * stiffness 0.5
    assert!((va.x - 0.5).abs() < 1e-12, "{:?}", va);
    assert!((va + vb).length() < 1e-12, "{:?} {:?}", va, vb);
}

#[test]
fn spring_dies_with_its_end() {
    let mut sim = Simulation::new(physics_config(0.0), Box::new(Chain)).unwrap();
    sim.setup(None, ExecutionMode::Serial).unwrap();
    let ball = sim.registry().id("Ball").unwrap();
    let spring = sim.registry().id(SPRING_KIND).unwrap();
    let end = sim.agents().of_kind(ball)[0];

    sim.with_context(|ctx| ctx.kill(end));
    assert_eq!(sim.agents().count_of_kind(spring), 1);
    sim.step().unwrap();
    assert_eq!(sim.agents().count_of_kind(spring), 0);
}

#[test]
fn forces_need_a_physics_body() {
    let model = TestModel::new(vec![KindSpec::new("Dot").spatial()]);
    let mut sim = Simulation::new(plane_config(false, ""), Box::new(model)).unwrap();
    sim.setup(None, ExecutionMode::Serial).unwrap();
    let id = sim.with_context(|ctx| {
        let space = ctx.space_id("plane").unwrap();
        let kind = ctx.kind("Dot").unwrap();
        ctx.spawn_at(kind, Idle, space, NodeSpec::circle(Vector::xy(1.0, 1.0), 0.5)).unwrap()
    });
    let err = sim.with_context(|ctx| ctx.apply_force(id, Vector::xy(1.0, 0.0))).unwrap_err();
    assert!(matches!(err, SparkError::Capability { .. }));
}

#[test]
fn physical_kind_needs_a_physics_space() {
    let mut sim = Simulation::new(plane_config(false, ""), Box::new(physical_model())).unwrap();
    sim.setup(None, ExecutionMode::Serial).unwrap();
    let result = sim.with_context(|ctx| {
        let space = ctx.space_id("plane").unwrap();
        let kind = ctx.kind("Ball").unwrap();
        ctx.spawn_at(kind, Idle, space, NodeSpec::circle(Vector::xy(1.0, 1.0), 0.5))
    });
    assert!(matches!(result, Err(SparkError::Capability { .. })));
}

#[test]
fn remote_agents_are_live_immediately() {
    fn new_ball() -> spark_engine::AgentBox {
        Box::new(Idle)
    }
    let model = TestModel::new(vec![KindSpec::new("Ball").spatial().factory(new_ball)]);
    let mut sim = Simulation::new(plane_config(false, ""), Box::new(model)).unwrap();
    sim.setup(None, ExecutionMode::Serial).unwrap();

    let id = sim
        .admit_remote("Ball", None, "plane", NodeSpec::circle(Vector::xy(19.5, 3.0), 0.5))
        .unwrap();
    assert!(sim.agents().is_alive(id));
    let space = sim.world().space_id("plane").unwrap();
    assert_eq!(sim.world().space(space).len(), 1);
    assert!(sim.world().space(space).verify_index().is_ok());

    let border = sim.border_agents("plane", 1.0).unwrap();
    assert_eq!(border.len(), 1);
    assert_eq!(AgentId::from_u64(border[0].agent), id);

    assert!(matches!(
        sim.admit_remote("Nope", None, "plane", NodeSpec::circle(Vector::ZERO, 0.5)),
        Err(SparkError::UnknownKind(_))
    ));
    assert!(matches!(
        sim.admit_remote("Ball", None, "elsewhere", NodeSpec::circle(Vector::ZERO, 0.5)),
        Err(SparkError::UnknownSpace(_))
    ));
}
