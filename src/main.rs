use anyhow::{Context as _, Result};
use clap::Parser;
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use spark_common::{ExecutionMode, SimulationConfig, Snapshot};
use spark_engine::models::{build_model, MODEL_NAMES};
use spark_engine::{CsvProcessor, Simulation};

/// Runs a SPARK model from a TOML configuration.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the number of ticks.
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Override the random seed.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Shuffle each kind's agents every tick instead of stepping in creation order.
    #[arg(long)]
    shuffled: bool,

    /// Override the output base filename.
    #[arg(short, long)]
    output: Option<String>,
}

/// Written next to the snapshots at the end of a run.
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    model: &'a str,
    seed: u64,
    ticks_run: u64,
    final_time: f64,
    agents: usize,
    agent_errors: usize,
    data_errors: usize,
    wall_seconds: f64,
}

fn save_snapshots(snapshots: &[Snapshot], base: &str, format: &str) -> Result<()> {
    match format {
        "json" => {
            let filename = format!("{}_snapshots.json", base);
            let json_string = serde_json::to_string(snapshots)?;
            let mut file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
            file.write_all(json_string.as_bytes())?;
            info!("All snapshots saved to {} ({}MB)", filename, json_string.len() / 1_048_576);
        }
        "bincode" => {
            let filename = format!("{}_snapshots.bin", base);
            let file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
            bincode::serialize_into(file, snapshots)?;
            info!("All snapshots saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base);
            let mut file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
            rmp_serde::encode::write(&mut file, snapshots)?;
            info!("All snapshots saved to {} (MessagePack format)", filename);
        }
        other => {
            error!("Unknown output format: {}. Using JSON instead.", other);
            save_snapshots(snapshots, base, "json")?;
        }
    }
    Ok(())
}

fn save_positions(sim: &Simulation, base: &str) -> Result<()> {
    let filename = format!("{}_final_positions.csv", base);
    let mut writer = csv::Writer::from_path(&filename)?;
    writer.write_record(["agent", "kind", "space", "x", "y", "z", "radius"])?;
    for node in sim.node_snapshots() {
        writer.write_record(&[
            node.agent.to_string(),
            node.kind,
            node.space,
            format!("{:.4}", node.position[0]),
            format!("{:.4}", node.position[1]),
            format!("{:.4}", node.position[2]),
            format!("{:.4}", node.radius),
        ])?;
    }
    writer.flush()?;
    info!("Final positions saved to {}", filename);
    Ok(())
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting SPARK engine...");

    // --- Load Configuration ---
    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(ticks) = args.ticks {
        config.simulation.ticks = ticks;
    }
    if let Some(base) = args.output {
        config.output.base_filename = base;
    }
    let mode = if args.shuffled { ExecutionMode::Shuffled } else { config.simulation.execution_mode };
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Simulation ---
    let model = build_model(&config).with_context(|| format!("available models: {}", MODEL_NAMES.join(", ")))?;
    let mut sim = Simulation::new(config, model)?;
    debug!("Configuration: {:#?}", sim.config());

    let base = sim.config().output.base_filename.clone();
    if sim.config().output.save_data {
        let filename = format!("{}_data.csv", base);
        let processor = CsvProcessor::create(&filename, sim.collector_names())?;
        sim.add_data_processor(Box::new(processor));
        info!("Collected data will be written to {}", filename);
    }

    sim.setup(args.seed, mode)?;
    info!("Initial population: {} agents.", sim.agent_count());

    // --- Simulation Loop ---
    let total_ticks = sim.config().simulation.ticks;
    let record_interval = sim.config().simulation.record_interval;
    let delay = std::time::Duration::from_millis(sim.config().simulation.delay_ms);
    let stop = sim.stop_handle();
    info!("Recording snapshot every {} ticks.", record_interval);
    info!("Starting simulation loop for {} ticks...", total_ticks);

    let start_time = Instant::now();
    let mut previous_print_time = start_time;
    let mut ticks_run = 0;
    let mut agent_errors = 0;
    let mut data_errors = 0;

    for _ in 0..total_ticks {
        if stop.is_requested() {
            info!("Stop requested; ending run at tick {}.", sim.tick());
            break;
        }
        let tick_start_time = Instant::now();
        let report = match sim.step() {
            Ok(report) => report,
            Err(e) => {
                error!("Error during tick {}: {}", sim.tick(), e);
                return Err(e.into());
            }
        };
        let tick_duration = tick_start_time.elapsed();
        ticks_run += 1;
        agent_errors += report.agent_errors.len();
        data_errors += report.data_errors.len();

        let now = Instant::now();
        let should_print_status = now.duration_since(previous_print_time).as_secs_f64() >= 5.0;
        let is_record_tick = report.tick % record_interval == 0;
        if should_print_status || is_record_tick || ticks_run == total_ticks {
            info!(
                "Tick [{}/{}] (t = {:.3}) | Agents: {} | +{} -{} | Tick Time: {:6.2} ms | Elapsed: {:.2} s",
                report.tick,
                total_ticks,
                sim.time(),
                sim.agent_count(),
                report.commits.births,
                report.commits.deaths,
                tick_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = now;
        } else {
            trace!("Tick [{}/{}] completed in {:.2} ms", report.tick, total_ticks, tick_duration.as_secs_f64() * 1000.0);
        }
        if !report.agent_errors.is_empty() {
            warn!("{} agents failed during tick {}", report.agent_errors.len(), report.tick);
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
    sim.finish();

    let total_duration = start_time.elapsed();
    info!("Simulation finished in {:.3} seconds.", total_duration.as_secs_f64());

    // --- Save Recorded Data ---
    let output = sim.config().output.clone();
    if output.save_snapshots {
        let format = output.format.as_deref().unwrap_or("json");
        if let Err(e) = save_snapshots(sim.recorded_snapshots(), &base, format) {
            error!("Error saving snapshots: {:#}", e);
        }
    } else {
        info!("Skipping saving snapshots as per config (save_snapshots is false).");
    }

    if output.save_positions {
        if let Err(e) = save_positions(&sim, &base) {
            error!("Error saving final positions: {:#}", e);
        }
    }

    let summary = RunSummary {
        model: sim.model_name(),
        seed: sim.world().rng_seed(),
        ticks_run,
        final_time: sim.time(),
        agents: sim.agent_count(),
        agent_errors,
        data_errors,
        wall_seconds: total_duration.as_secs_f64(),
    };
    let filename = format!("{}_summary.json", base);
    match File::create(&filename) {
        Ok(mut file) => {
            if let Err(e) = file.write_all(serde_json::to_string_pretty(&summary)?.as_bytes()) {
                error!("Error writing summary to '{}': {}", filename, e);
            }
        }
        Err(e) => error!("Error creating summary file '{}': {}", filename, e),
    }

    info!("Simulation Complete.");
    Ok(())
}
