//! resq CLI - enqueue jobs and inspect queues directly in the store
//! Store settings come from the same sources as the daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use resq_core::application::info::summary;
use resq_core::application::{EnqueueRequest, JobStats, Producer, StatKey, StatKind};
use resq_core::domain::JobArgs;
use resq_daemon::{load_settings, open_queue_store};

#[derive(Parser)]
#[command(name = "resq")]
#[command(about = "resq job queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file shared with the daemon
    #[arg(short, long, env = "RESQ_CONFIG", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a new job
    Enqueue {
        /// Task name the worker looks up (e.g. shell, echo)
        #[arg(short, long)]
        name: String,

        /// Queue name
        #[arg(short, long, default_value = "default")]
        queue: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Re-enqueue after this many seconds when the job fails
        #[arg(long)]
        retry_every: Option<u64>,
    },

    /// Show the backlog of one queue
    Size {
        /// Queue name
        queue: String,
    },

    /// Show queue backlogs and processed/failed counters
    Stats {
        /// Queues to report (default: the configured queues)
        #[arg(short, long, value_delimiter = ',')]
        queues: Vec<String>,
    },

    /// Reset processed/failed counters
    ClearStats {
        /// Also clear the per-task counters of these tasks
        #[arg(short, long, value_delimiter = ',')]
        tasks: Vec<String>,
    },
}

#[derive(Tabled)]
struct QueueRow {
    queue: String,
    pending: i64,
}

#[derive(Tabled)]
struct EnqueueRow {
    name: String,
    queue: String,
    retry: String,
    enqueued_at: i64,
}

fn parse_args(raw: &str) -> Result<JobArgs> {
    let value: serde_json::Value = serde_json::from_str(raw).context("Invalid JSON args")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Job args must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    let store = open_queue_store(&settings).await?;

    match cli.command {
        Commands::Enqueue {
            name,
            queue,
            args,
            retry_every,
        } => {
            let mut request = EnqueueRequest::new(name, queue, parse_args(&args)?);
            if let Some(every) = retry_every {
                request = request.with_retry(every);
            }

            let job = Producer::new(store).enqueue(request).await?;

            println!("{}", "✓ Job enqueued successfully".green().bold());
            println!();
            let retry = if job.retry {
                format!("every {}s", job.retry_every().as_secs())
            } else {
                "no".to_string()
            };
            let row = EnqueueRow {
                name: job.name,
                queue: job.queue,
                retry,
                enqueued_at: job.enqueued_at,
            };
            println!("{}", Table::new(vec![row]));
        }

        Commands::Size { queue } => {
            let size = Producer::new(store).size(&queue).await?;
            println!("{} {}", format!("{}:", queue).bold(), size);
        }

        Commands::Stats { queues } => {
            let queues = if queues.is_empty() {
                settings.queues.clone()
            } else {
                queues
            };
            let info = summary(store.as_ref(), &queues).await?;

            println!("{}", "Queue Status".cyan().bold());
            println!();
            let rows: Vec<QueueRow> = info
                .queues
                .iter()
                .map(|(queue, pending)| QueueRow {
                    queue: queue.clone(),
                    pending: *pending,
                })
                .collect();
            println!("{}", Table::new(rows));
            println!();
            println!("  {} {}", "Pending:".bold(), info.pending);
            println!("  {} {}", "Processed:".bold(), info.processed.to_string().green());
            println!("  {} {}", "Failed:".bold(), info.failed.to_string().red());
            println!("  {} {}", "Failure records:".bold(), info.failures);
        }

        Commands::ClearStats { tasks } => {
            let stats = JobStats::new(store);
            let mut keys = vec![
                StatKey::global(StatKind::Processed),
                StatKey::global(StatKind::Failed),
            ];
            for task in &tasks {
                keys.push(StatKey::task(StatKind::Processed, task));
                keys.push(StatKey::task(StatKind::Failed, task));
            }

            for key in keys {
                let counter = stats.counter(key);
                if counter.clear().await? {
                    println!("  {} {} cleared", "✓".green(), counter.name());
                } else {
                    println!("  ○ {} not set", counter.name());
                }
            }
        }
    }

    Ok(())
}
