use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use marina_sim::config::{MarinaConfig, TimingConfig};
use marina_sim::logging;
use marina_sim::sim::{self, BenchResult, RunOptions};

#[derive(Parser)]
#[command(name = "marina_sim", about = "Concurrent marina berth-allocation simulator")]
struct Cli {
    /// TOML file overriding the built-in configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one simulation and print a summary (default).
    Run(RunArgs),
    /// Run a fast-timing simulation and print one CSV row.
    Bench {
        #[arg(long, default_value_t = 200)]
        vessels: usize,
        #[arg(long, default_value_t = 4)]
        workers: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, default_value_t = 20)]
    vessels: usize,
    #[arg(long)]
    seed: Option<u64>,
    /// Use millisecond-scale timing.
    #[arg(long)]
    fast: bool,
    /// Check invariants on every reported snapshot.
    #[arg(long)]
    validate: bool,
    /// Emit snapshots as JSON lines on stdout.
    #[arg(long)]
    json: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            vessels: 20,
            seed: None,
            fast: false,
            validate: false,
            json: false,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MarinaConfig> {
    match path {
        Some(path) => MarinaConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(MarinaConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    logging::init("warn,marina_sim=info");
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => {
            if let Some(seed) = args.seed {
                config.seed = seed;
            }
            if args.fast {
                config.timing = TimingConfig::fast();
            }
            let options = RunOptions {
                vessels: args.vessels,
                validate: args.validate,
                json: args.json,
            };
            let summary = sim::run(config, &options).context("simulation failed")?;
            summary.print();
        }
        Command::Bench {
            vessels,
            workers,
            seed,
        } => {
            config.worker_count = workers;
            if let Some(seed) = seed {
                config.seed = seed;
            }
            let result = sim::bench(config, vessels).context("benchmark failed")?;
            println!("{}", BenchResult::CSV_HEADER);
            println!("{}", result.csv_row());
        }
    }
    Ok(())
}
