use spark_common::{ExecutionMode, SimulationConfig};
use spark_engine::models::{build_model, worm};
use spark_engine::{CsvProcessor, Simulation, SparkError};

fn load(text: &str) -> Simulation {
    let config = SimulationConfig::from_toml_str(text).unwrap();
    let model = build_model(&config).unwrap();
    Simulation::new(config, model).unwrap()
}

const WORM: &str = r#"
    [simulation]
    model = "worm"
    seed = 3
    ticks = 100

    [simulation.parameters]
    segments = 8

    [[spaces]]
    name = "tank"
    min = [0.0, 0.0]
    max = [40.0, 40.0]
    cell_size = 2.0

    [spaces.physics]
    dt = 0.5
    damping = 0.9
    max_speed = 2.0
    collision_stiffness = 0.5

    [[collectors]]
    name = "springs"
    source = { type = "agent_count", kind = "Spring" }

    [[collectors]]
    name = "speed"
    source = { type = "agent_variable", kind = "Segment", variable = "speed", aggregate = "max" }
"#;

#[test]
fn worm_stays_connected_and_finite() {
    let mut sim = load(WORM);
    sim.setup(None, ExecutionMode::Serial).unwrap();
    let segment = sim.registry().id(worm::SEGMENT).unwrap();
    assert_eq!(sim.agents().count_of_kind(segment), 8);

    sim.run(100).unwrap();
    let last = sim.data_rows().last().unwrap();
    assert_eq!(last.get("springs"), Some(7.0));
    assert!(last.get("speed").unwrap() <= 2.0 + 1e-9);
    for node in sim.node_snapshots() {
        assert!(node.position.iter().all(|v| v.is_finite()));
        assert!((0.0..=40.0).contains(&node.position[0]));
    }
}

const WALK: &str = r#"
    [simulation]
    model = "random_walk"
    seed = 11
    ticks = 20

    [simulation.parameters]
    walkers = 25
    metabolism = 0.5
    drops_per_tick = 0
    stop_when_extinct = 1

    [[spaces]]
    name = "world"
    min = [0.0, 0.0]
    max = [20.0, 20.0]
    wrap = [true, true]
    cell_size = 2.0

    [[layers]]
    name = "food"
    space = "world"
    step = [1.0]

    [[collectors]]
    name = "walkers"
    source = { type = "agent_count", kind = "Walker" }

    [[collectors]]
    name = "food"
    source = { type = "layer_total", layer = "food" }
"#;

#[test]
fn starving_walkers_die_out_and_stop_the_run() {
    let mut sim = load(WALK);
    sim.setup(None, ExecutionMode::Shuffled).unwrap();
    assert_eq!(sim.agent_count(), 25);

    // initial energy 2.0 at 0.5 per tick lasts four ticks
    let ticks = sim.run(20).unwrap();
    assert_eq!(ticks, 4);
    assert_eq!(sim.agent_count(), 0);
    let counts: Vec<f64> = sim.data_rows().iter().filter_map(|r| r.get("walkers")).collect();
    assert_eq!(counts, vec![25.0, 25.0, 25.0, 0.0]);
}

#[test]
fn collected_rows_are_written_as_csv() {
    let path = std::env::temp_dir().join(format!("spark_walk_{}.csv", std::process::id()));
    let mut sim = load(WALK);
    let processor = CsvProcessor::create(&path, sim.collector_names()).unwrap();
    sim.add_data_processor(Box::new(processor));
    sim.setup(None, ExecutionMode::Serial).unwrap();
    sim.run(2).unwrap();
    sim.finish();

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "tick,time,walkers,food");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("1,1.000000,25,"), "{}", lines[1]);
}

#[test]
fn unknown_model_is_reported() {
    let config = SimulationConfig::from_toml_str(&WALK.replace("random_walk", "flocking")).unwrap();
    assert!(matches!(build_model(&config), Err(SparkError::UnknownModel(name)) if name == "flocking"));
}
