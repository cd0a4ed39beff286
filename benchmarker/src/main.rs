//! Benchmarker CLI

use std::future::Future;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use benchmarker::{
    benchmarker::{Benchmarker, Phases},
    benchmarks::Benchmark,
    config::GlobalConfig,
    results::InfluxDbSink,
    runner::{Interrupt, InterruptHandle},
};

#[derive(Parser)]
#[command(name = "benchmarker")]
#[command(about = "Run reproducible benchmarks against remote destinations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the configured benchmarks
    Run {
        /// Configuration files, merged in the given order
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Only run the pre tasks of each benchmark
        #[arg(long, conflicts_with_all = ["only_benchmarks", "only_post_tasks"])]
        only_pre_tasks: bool,

        /// Only run the benchmarks themselves
        #[arg(long, conflicts_with = "only_post_tasks")]
        only_benchmarks: bool,

        /// Only run the post tasks of each benchmark
        #[arg(long)]
        only_post_tasks: bool,

        /// Comma-separated benchmark names to run (default: all)
        #[arg(short, long, value_delimiter = ',')]
        filter: Vec<String>,
    },

    /// Validate the configuration and list its benchmarks
    List {
        /// Configuration files, merged in the given order
        #[arg(required = true)]
        configs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("benchmarker=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("benchmarker=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Run {
            configs,
            only_pre_tasks,
            only_benchmarks,
            only_post_tasks,
            filter,
        } => {
            let phases = if only_pre_tasks {
                Phases::only_pre_tasks()
            } else if only_benchmarks {
                Phases::only_benchmarks()
            } else if only_post_tasks {
                Phases::only_post_tasks()
            } else {
                Phases::default()
            };
            run_benchmarks(configs, phases, filter).await?;
        }

        Commands::List { configs } => {
            list_benchmarks(configs)?;
        }
    }

    Ok(())
}

async fn run_benchmarks(
    configs: Vec<PathBuf>,
    phases: Phases,
    filter: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = GlobalConfig::load_all(&configs)?;
    let mut benchmarker = Benchmarker::from_config(&config)?;

    if let Some(influx) = &config.influxdb {
        InfluxDbSink::new(influx.clone())
            .ping()
            .await
            .map_err(|e| format!("Unable to connect to influxdb at {}: {}", influx.url, e))?;
    }

    let (handle, interrupt) = Interrupt::channel();
    tokio::spawn(async move {
        if forward_interrupts(handle, tokio::signal::ctrl_c).await {
            std::process::exit(130);
        }
    });

    let summary = benchmarker.run(phases, &filter, &interrupt).await;

    println!(
        "\nExecuted: {}, Skipped: {}, Failed: {}{}",
        summary.executed,
        summary.skipped,
        summary.failed,
        if summary.interrupted { " (interrupted)" } else { "" }
    );

    Ok(())
}

fn list_benchmarks(configs: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = GlobalConfig::load_all(&configs)?;
    let benchmarks = benchmarker::benchmarks::BenchmarkFactory::new(&config).build_all()?;

    println!("\n=== Configured Benchmarks ===\n");
    for benchmark in &benchmarks {
        match benchmark {
            Benchmark::Unit(unit) => println!(
                "  {} ({}), {} repetitions",
                unit.name(),
                unit.kind(),
                unit.repetitions()
            ),
            Benchmark::Compare(pair) => println!(
                "  {} (Compare): {} vs {}",
                pair.identity().name,
                pair.bench_a().name(),
                pair.bench_b().name()
            ),
        }
    }
    println!("\nTotal: {} benchmarks", benchmarks.len());

    Ok(())
}

/// Trigger `handle` on the first signal. Returns true once a second signal
/// arrives, false if the signal source fails.
async fn forward_interrupts<F, Fut>(handle: InterruptHandle, mut next_signal: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    tracing::warn!("Received interrupt, stopping at the next safe point. Press Ctrl-C again to abort");
    handle.trigger();

    if next_signal().await.is_err() {
        return false;
    }
    tracing::error!("Received second interrupt, aborting");
    true
}
