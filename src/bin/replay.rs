//! Operator tool for rejected extraction jobs.
//!
//! With `--list`, prints the oldest dead-lettered jobs. Otherwise moves up to
//! LIMIT of them back onto the queue for another attempt.

use clap::Parser;
use doc_extract_worker::{config::AppConfig, services::queue::JobQueue};
use tracing_subscriber::EnvFilter;

/// Inspect or requeue dead-lettered extraction jobs.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
Environment Variables:
  Reads the same configuration as the worker (REDIS_URL, QUEUE_NAME, ...).
  These variables may be set in a standard `.env` file.
"#
)]
struct Args {
    /// Print dead letters without moving them.
    #[arg(long)]
    list: bool,

    /// How many dead letters to list or requeue, oldest first.
    #[arg(default_value_t = 10)]
    limit: usize,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let queue = JobQueue::new(&config.redis_url, &config.queue_name, &config.worker_id, true)
        .expect("Failed to initialize job queue");

    if args.list {
        let letters = queue
            .dead_letters(args.limit)
            .await
            .expect("Failed to read dead letters");
        for letter in &letters {
            println!(
                "{}  stage={}  worker={}  reason={}\n    {}",
                letter.rejected_at.to_rfc3339(),
                letter.stage,
                letter.worker_id,
                letter.reason,
                letter.payload
            );
        }
        tracing::info!(count = letters.len(), "Listed dead-lettered jobs");
        return;
    }

    let replayed = queue
        .replay_dead_letters(args.limit)
        .await
        .expect("Failed to replay dead letters");
    tracing::info!(replayed, queue = %config.queue_name, "Requeued dead-lettered jobs");
}
