//! AirProx CLI
//!
//! Analyse recorded flights, or run the synthetic scenarios.

use std::path::PathBuf;

use airprox_core::{AnalysisConfig, FlightCollection, MemorySink};
use airprox_env::ReplaySource;
use airprox_sim::scenarios::ScenarioId;
use airprox_sim::{JsonExporter, ScenarioResult, ScenarioRunner};
use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// AirProx proximity and gaggle analysis
#[derive(Parser, Debug)]
#[command(name = "airprox-sim")]
#[command(about = "Find near misses and gaggles in a set of flights", long_about = None)]
struct Args {
    /// JSON flight traces to analyse (scenario mode if none given)
    #[arg(short, long, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Scenario to run (converging, head_on, gaggle, mixed, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Analysis configuration JSON; missing fields take defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for report files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for synthetic traffic (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario length in seconds
    #[arg(short, long, default_value = "300")]
    duration: u32,

    /// Verbose output (status lines every display interval)
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let outcome = if args.input.is_empty() {
        run_scenarios(&args)
    } else {
        analyse_files(&args)
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> Result<AnalysisConfig> {
    match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

/// Analyses recorded traces; returns true on success.
fn analyse_files(args: &Args) -> Result<bool> {
    let config = load_config(args)?;
    let mut collection = FlightCollection::new(config);
    for path in &args.input {
        let source = ReplaySource::from_json_file(path)
            .with_context(|| format!("reading {}", path.display()))?;
        info!("Loaded {} ({} fixes)", path.display(), source.len());
        collection.add_source(Box::new(source));
    }

    let mut memory = MemorySink::new();
    let run = match &args.output {
        Some(dir) => {
            let mut exporter = JsonExporter::new(dir)?;
            collection.run(&mut exporter)?
        }
        None => collection.run(&mut memory)?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        info!(
            "{} aircraft, {} flight seconds, {} encounters, {} flocks",
            run.num_aircraft, run.num_flightsecs, run.n_encounters, run.n_flocks
        );
        for s in &run.scoring {
            info!("  {:<12} {}", s.id, s.penalty);
        }
    }
    Ok(true)
}

/// Runs synthetic scenarios; returns true if all passed.
fn run_scenarios(args: &Args) -> Result<bool> {
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(s) => vec![s],
            Err(e) => bail!("{} (available: converging, head_on, gaggle, mixed, all)", e),
        }
    };

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if !args.json {
        info!("AirProx scenario harness v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let runner = ScenarioRunner::new(seed)
        .with_duration(args.duration)
        .with_config(load_config(args)?);

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in scenarios {
        let result = runner.run(scenario);
        if let Some(dir) = &args.output {
            let mut exporter = JsonExporter::new(dir.join(scenario.name()))?;
            exporter.export(&result.reports)?;
        }
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
        results.push(result);
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "aircraft": r.num_aircraft,
                    "flight_secs": r.num_flightsecs,
                    "encounters": r.n_encounters,
                    "flocks": r.n_flocks,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if failed == 0 {
        info!("✅ All {} scenario runs passed!", results.len());
    } else {
        error!("❌ {}/{} scenario runs failed!", failed, results.len());
    }
    Ok(failed == 0)
}
