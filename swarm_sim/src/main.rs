//! Swarm Simulator CLI
//!
//! Runs named scenarios with property checks, or a JSON parameter file
//! under a virtual or realtime clock with an optional stdin operator.

use clap::Parser;
use std::io::BufRead;
use std::time::Duration;
use swarm_core::{OperatorEvent, RunSummary, Simulation, StepRecord, SwarmParams};
use swarm_env::{operator_channel, EnvError, TokioContext};
use swarm_sim::scenarios::ScenarioId;
use swarm_sim::{drive, parse_command, ScenarioResult, ScenarioRunner, SimContext, SimExport};
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Scenario seed when `--seed` is not given
const DEFAULT_SEED: u64 = 42;

/// Swarm simulation CLI
#[derive(Parser, Debug)]
#[command(name = "swarm-sim")]
#[command(about = "Run swarm scenarios or a parameter file", long_about = None)]
struct Args {
    /// Master seed for determinism (default 42; 0 = random from time)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Scenario to run (line, bowtie, full_mesh, heading_drift, milling_trust, flocking, rendezvous, region_coverage, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// JSON parameter file; runs it instead of a scenario
    #[arg(short, long)]
    config: Option<String>,

    /// Override the step limit
    #[arg(long)]
    steps: Option<u64>,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export step records to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Export every Nth step
    #[arg(long, default_value = "1")]
    export_interval: u64,

    /// Tick on the wall clock instead of the virtual clock (--config only)
    #[arg(long)]
    realtime: bool,

    /// Tick length in milliseconds
    #[arg(long, default_value = "33")]
    tick_ms: u64,

    /// Read operator commands from stdin (--config only)
    #[arg(short, long)]
    interactive: bool,
}

/// Resolves `--seed`: absent means the default, 0 means time-based.
fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        None => DEFAULT_SEED,
        Some(0) => std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1),
        Some(seed) => seed,
    }
}

/// Seed to impose on a config file, which otherwise keeps its own.
fn config_seed_override(seed: Option<u64>) -> Option<u64> {
    seed.map(|seed| resolve_seed(Some(seed)))
}

/// Runs a parameter file through the async driver.
async fn run_config(args: &Args, path: &str, seed: Option<u64>) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)?;
    let mut params = SwarmParams::from_json(&json)?;
    if let Some(seed) = seed {
        params.seed = seed;
    }
    if let Some(steps) = args.steps {
        params.max_steps = steps;
    }
    let seed = params.seed;
    let sim = Simulation::new(params)?;

    let (handle, link) = operator_channel::<OperatorEvent>(64);
    if args.interactive {
        info!("Operator commands: pause | resume | p | goal <spec> | ack [level] | reset-trust | fail <kind> <dur> <mag> | stop");
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(Result::ok) {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(event) => {
                        let stop = event == OperatorEvent::Stop;
                        match handle.send(event) {
                            Ok(()) if stop => break,
                            Ok(()) => {}
                            Err(EnvError::LinkClosed) => break,
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
        });
    } else {
        drop(handle);
    }

    let mut export = args.export.as_ref().map(|_| SimExport::new(path, seed));
    let interval = args.export_interval.max(1);
    let mut on_step = |record: &StepRecord| {
        if record.step % 30 == 0 {
            debug!(
                "  step={} | leaders={} | articulation={} | trust={:.2}",
                record.step,
                record.leaders.len(),
                record.articulation.len(),
                record.trust.level
            );
        }
        if let Some(export) = export.as_mut() {
            if record.step % interval == 0 {
                export.add_frame(record.clone());
            }
        }
    };

    let tick = Duration::from_millis(args.tick_ms);
    let summary = if args.realtime {
        drive(sim, &TokioContext::new(), &link, tick, &mut on_step).await?
    } else {
        drive(sim, &SimContext::new(), &link, tick, &mut on_step).await?
    };

    if let (Some(mut export), Some(export_path)) = (export, args.export.as_ref()) {
        export.finalize(true, summary.clone(), None);
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);
    }

    Ok(summary)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("Swarm Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Handle --config mode
    if let Some(path) = &args.config {
        match run_config(&args, path, config_seed_override(args.seed)).await {
            Ok(summary) => {
                if args.json {
                    match serde_json::to_string_pretty(&summary) {
                        Ok(json) => println!("{}", json),
                        Err(e) => error!("Failed to serialize summary: {}", e),
                    }
                } else {
                    info!(
                        "Finished {} steps ({:?}); trust {:.2}, {} leader changes, {} failures",
                        summary.steps,
                        summary.reason,
                        summary.trust.level,
                        summary.leader_changes,
                        summary.failures_activated
                    );
                }
            }
            Err(e) => {
                error!("✗ {} failed: {}", path, e);
                std::process::exit(1);
            }
        }
        return;
    }

    let base_seed = resolve_seed(args.seed);

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!(
                "Available scenarios: {}, all",
                ScenarioId::all().iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
            );
            std::process::exit(1);
        })]
    };

    let runner_for = |seed: u64| {
        let runner = ScenarioRunner::new(seed);
        match args.steps {
            Some(steps) => runner.with_max_steps(steps),
            None => runner,
        }
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        let mut export = SimExport::new(scenarios[0].name(), base_seed);
        let result = runner_for(base_seed).run_with_export(scenarios[0], &mut export, args.export_interval);

        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path),
            Err(e) => error!("Failed to write export: {:?}", e),
        }

        if !result.passed {
            error!(
                "✗ {} FAILED: {}",
                scenarios[0].name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        info!("✓ {} (seed={}) PASSED", scenarios[0].name(), base_seed);
        return;
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "steps": r.total_steps,
                    "finish_reason": r.finish_reason,
                    "failures_activated": r.metrics.failures_activated,
                    "min_trust": r.metrics.min_trust,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", summary);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_default_seed_is_an_override() {
        let args = Args::try_parse_from(["swarm-sim", "--config", "run.json", "--seed", "42"]).unwrap();
        assert_eq!(args.seed, Some(42));
        assert_eq!(config_seed_override(args.seed), Some(42));

        let args = Args::try_parse_from(["swarm-sim", "--config", "run.json"]).unwrap();
        assert_eq!(config_seed_override(args.seed), None);
        assert_eq!(resolve_seed(args.seed), DEFAULT_SEED);
    }

    #[test]
    fn test_zero_seed_is_time_based() {
        assert_ne!(resolve_seed(Some(0)), 0);
        assert_eq!(resolve_seed(Some(7)), 7);
    }
}
