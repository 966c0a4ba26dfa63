//! QBench command-line interface.
//!
//! Runs scheduling agents against scenario seed files and reports
//! pass/fail verdicts and performance metrics.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use qbench_runner::agents::{baseline, BASELINE_AGENTS};
use qbench_runner::{
    write_summary, BenchmarkConfig, BenchmarkRunner, ClientError, ClientFactory, DecisionClient,
    HttpClient, InProcessClient,
};
use qbench_scenarios::{
    is_standard, GeneratorConfig, LoadPattern, ScenarioGenerator, ScenarioLoader,
    ScenarioRegistry, SCENARIO_NAMES,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qbench")]
#[command(about = "Online task-queue scheduling benchmark")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the scenarios found in a scenarios directory
    ListScenarios {
        /// Root directory holding <scenario>/seed_<n>.json files
        #[arg(long, default_value = "scenarios")]
        scenarios_dir: PathBuf,
    },

    /// Run an agent against a set of scenarios
    Run {
        /// Root directory holding <scenario>/seed_<n>.json files
        #[arg(long, default_value = "scenarios")]
        scenarios_dir: PathBuf,

        /// Scenarios to run (comma-separated, "all" for every scenario)
        #[arg(short, long, value_delimiter = ',')]
        scenario: Vec<String>,

        /// Agent: noop, greedy, random or http
        #[arg(short, long, default_value = "greedy")]
        agent: String,

        /// Base URL of the remote agent (with --agent http)
        #[arg(long)]
        url: Option<String>,

        /// Episodes to run concurrently (1-100)
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Seeds per scenario
        #[arg(long)]
        max_seeds: Option<usize>,

        /// Cap on the total number of episodes
        #[arg(long)]
        max_episodes: Option<usize>,

        /// Timeout for one agent decision (e.g. "2s", "500ms")
        #[arg(long)]
        step_timeout: Option<humantime::Duration>,

        /// Wall-clock budget per episode (e.g. "90s"; default 5m)
        #[arg(long)]
        episode_budget: Option<humantime::Duration>,

        /// Benchmark config file (TOML); flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the JSON results (file or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// End an episode at its first fatal violation
        #[arg(long)]
        stop_on_fatal: bool,

        /// Base seed for the random agent
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Generate synthetic scenario seed files
    Generate {
        /// Root directory to write <name>/seed_<n>.json into
        #[arg(long, default_value = "scenarios")]
        scenarios_dir: PathBuf,

        /// Scenario name
        #[arg(short, long)]
        name: String,

        /// Number of seeds to generate
        #[arg(long, default_value = "5")]
        seeds: u64,

        /// First seed
        #[arg(long, default_value = "1")]
        first_seed: u64,

        /// Episode length in steps
        #[arg(long, default_value = "30")]
        horizon: u64,

        /// Initial capacity per step
        #[arg(long, default_value = "3")]
        capacity: u32,

        /// Mean arrivals per step
        #[arg(long, default_value = "2.0")]
        rate: f64,

        /// Fraction of urgent arrivals (0.0 to 1.0)
        #[arg(long, default_value = "0.3")]
        urgent_ratio: f64,

        /// Fraction of arrivals later cancelled
        #[arg(long, default_value = "0.05")]
        cancel_ratio: f64,

        /// Fraction of arrivals re-sent with the same id
        #[arg(long, default_value = "0.0")]
        duplicate_ratio: f64,

        /// Number of scripted capacity changes
        #[arg(long, default_value = "0")]
        capacity_changes: u32,

        /// Load pattern (steady, ramp-up, ramp-down, bursts:<period>:<size>)
        #[arg(long, default_value = "steady")]
        pattern: String,
    },
}

fn parse_pattern(s: &str) -> Result<LoadPattern, String> {
    match s.to_lowercase().as_str() {
        "steady" => Ok(LoadPattern::Steady),
        "ramp-up" | "rampup" => Ok(LoadPattern::RampUp),
        "ramp-down" | "rampdown" => Ok(LoadPattern::RampDown),
        s if s.starts_with("bursts") => {
            let mut parts = s.split(':').skip(1);
            let period = parts
                .next()
                .unwrap_or("5")
                .parse()
                .map_err(|_| format!("Invalid burst period in: {}", s))?;
            let size = parts
                .next()
                .unwrap_or("5")
                .parse()
                .map_err(|_| format!("Invalid burst size in: {}", s))?;
            Ok(LoadPattern::Bursts { period, size })
        }
        _ => Err(format!("Unknown load pattern: {}", s)),
    }
}

fn init_log(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to init logger: {}", e);
    }
}

/// Build the per-episode client factory for the chosen agent.
fn client_factory(
    agent: &str,
    url: Option<String>,
    step_timeout: Option<Duration>,
    base_seed: u64,
) -> anyhow::Result<Arc<dyn ClientFactory>> {
    if agent == "http" {
        let url = url.context("--agent http needs --url")?;
        HttpClient::new(&url, step_timeout)?;
        return Ok(Arc::new(
            move |_: &str, _: u64| -> Result<Box<dyn DecisionClient>, ClientError> {
                Ok(Box::new(HttpClient::new(&url, step_timeout)?))
            },
        ));
    }

    if !BASELINE_AGENTS.contains(&agent) {
        bail!(
            "Unknown agent: {} (expected one of {}, http)",
            agent,
            BASELINE_AGENTS.join(", ")
        );
    }
    let name = agent.to_string();
    Ok(Arc::new(
        move |_: &str, seed: u64| -> Result<Box<dyn DecisionClient>, ClientError> {
            let agent = baseline(&name, base_seed.wrapping_add(seed))
                .ok_or_else(|| ClientError::Setup(format!("unknown agent {}", name)))?;
            Ok(Box::new(InProcessClient::new(agent)))
        },
    ))
}

fn list_scenarios(scenarios_dir: PathBuf) -> anyhow::Result<()> {
    let loader = ScenarioLoader::new(&scenarios_dir)?;
    let registry = ScenarioRegistry::discover(&loader)?;

    for name in registry.names() {
        let seeds = registry.seeds(name)?;
        let marker = if is_standard(name) { "" } else { " (custom)" };
        println!("{:<40} {:>3} seeds{}", name, seeds.len(), marker);
    }

    let missing: Vec<&str> = SCENARIO_NAMES
        .iter()
        .copied()
        .filter(|name| !registry.contains(name))
        .collect();
    if !missing.is_empty() {
        println!();
        println!("Standard scenarios without seed files:");
        for name in missing {
            println!("  {}", name);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_log(cli.verbose);

    match cli.command {
        Commands::ListScenarios { scenarios_dir } => list_scenarios(scenarios_dir)?,

        Commands::Run {
            scenarios_dir,
            scenario,
            agent,
            url,
            parallel,
            max_seeds,
            max_episodes,
            step_timeout,
            episode_budget,
            config,
            output,
            stop_on_fatal,
            seed,
        } => {
            let mut config = match config {
                Some(path) => BenchmarkConfig::load(&path)?,
                None => BenchmarkConfig::new(),
            };
            if !scenario.is_empty() {
                config = config.with_scenarios(scenario);
            }
            if let Some(parallel) = parallel {
                config = config.with_parallelism(parallel);
            }
            if let Some(max_seeds) = max_seeds {
                config = config.with_max_seeds(max_seeds);
            }
            if let Some(max_episodes) = max_episodes {
                config = config.with_max_episodes(max_episodes);
            }
            if let Some(timeout) = step_timeout {
                config = config.with_step_timeout(*timeout);
            }
            if let Some(budget) = episode_budget {
                config = config.with_episode_budget(*budget);
            }
            if stop_on_fatal {
                config = config.with_stop_on_fatal(true);
            }

            let loader = ScenarioLoader::new(&scenarios_dir)?;
            let registry = Arc::new(ScenarioRegistry::discover(&loader)?);
            let request_timeout = config.step_timeout_ms.map(Duration::from_millis);
            let factory = client_factory(&agent, url, request_timeout, seed)?;

            info!(agent = %agent, dir = %scenarios_dir.display(), "Starting run");
            let summary = BenchmarkRunner::new(config, registry, factory)?
                .run()
                .await?;

            print!("{}", summary);
            for failure in summary.failures() {
                println!("FAIL {}", failure);
                for violation in failure.fatal_violations() {
                    println!("     {}", violation);
                }
            }

            if let Some(path) = output {
                let written = write_summary(&path, &summary)?;
                println!("Results written to {}", written.display());
            }
        }

        Commands::Generate {
            scenarios_dir,
            name,
            seeds,
            first_seed,
            horizon,
            capacity,
            rate,
            urgent_ratio,
            cancel_ratio,
            duplicate_ratio,
            capacity_changes,
            pattern,
        } => {
            let pattern = parse_pattern(&pattern).map_err(anyhow::Error::msg)?;
            let generator = ScenarioGenerator::new(
                GeneratorConfig::new(horizon, capacity)
                    .with_arrival_rate(rate)
                    .with_urgent_ratio(urgent_ratio)
                    .with_cancel_ratio(cancel_ratio)
                    .with_duplicate_ratio(duplicate_ratio)
                    .with_capacity_changes(capacity_changes)
                    .with_pattern(pattern),
            );

            std::fs::create_dir_all(&scenarios_dir)
                .with_context(|| format!("creating {}", scenarios_dir.display()))?;
            let loader = ScenarioLoader::new(&scenarios_dir)?;
            for seed in first_seed..first_seed + seeds {
                let scenario = generator.generate(seed);
                let path = loader.save(&name, seed, &scenario)?;
                println!(
                    "{} ({} arrivals)",
                    path.display(),
                    scenario.arrival_count()
                );
            }
        }
    }

    Ok(())
}
