// lane-queue - demo and inspection CLI
// Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use lane_queue::config::{load_config, load_config_from};
use lane_queue::logging::init_tracing;
use lane_queue::{CommandQueue, EnqueueOptions, QueueConfig};

#[derive(Debug, Parser)]
#[command(name = "lane-queue", version, about = "Lane-based command scheduler")]
struct Cli {
    /// Config file (defaults to $LANE_QUEUE_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a serial lane and a parallel lane side by side and report timings
    Demo {
        /// Tasks per lane
        #[arg(long, default_value_t = 3)]
        tasks: usize,
        /// Duration of each task in milliseconds
        #[arg(long, default_value_t = 10)]
        task_ms: u64,
        /// Concurrency of the parallel lane (defaults to --tasks)
        #[arg(long)]
        parallel: Option<usize>,
        /// Print lane statistics as JSON afterwards
        #[arg(long)]
        stats: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Demo {
            tasks,
            task_ms,
            parallel,
            stats,
        } => run_demo(config, tasks, task_ms, parallel.unwrap_or(tasks), stats).await,
        Command::Config => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
            Ok(())
        }
    }
}

/// Run `tasks` sleeps in "main" (serial) and in "parallel" (bounded), timing
/// each lane and reporting the order tasks finished in.
async fn run_demo(
    config: QueueConfig,
    tasks: usize,
    task_ms: u64,
    parallel: usize,
    print_stats: bool,
) -> Result<()> {
    let queue = CommandQueue::with_config(config);
    queue.set_lane_concurrency("parallel", parallel);

    for lane in ["main", "parallel"] {
        let started = Instant::now();
        let finished = Arc::new(Mutex::new(Vec::with_capacity(tasks)));
        let mut pending = Vec::with_capacity(tasks);
        for i in 1..=tasks {
            let finished = Arc::clone(&finished);
            pending.push(queue.enqueue_in_lane(
                lane,
                move || async move {
                    tokio::time::sleep(Duration::from_millis(task_ms)).await;
                    finished.lock().await.push(i);
                    Ok::<_, anyhow::Error>(())
                },
                EnqueueOptions::default(),
            ));
        }

        for fut in pending {
            fut.await?;
        }
        let order = finished.lock().await.clone();
        println!(
            "{:<9} limit={} tasks={} elapsed={}ms finished={:?}",
            lane,
            queue.lane_concurrency(lane).unwrap_or(1),
            tasks,
            started.elapsed().as_millis(),
            order
        );
    }

    if print_stats {
        let json = serde_json::to_string_pretty(&queue.lane_stats())
            .context("Failed to serialize lane stats")?;
        println!("{}", json);
    }

    Ok(())
}
