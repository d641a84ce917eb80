//! Tournament engine worker.
//!
//! Applies the schema, then polls the durable task table and runs due
//! credential releases until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use ctrlc::set_handler;
use pico_args::Arguments;
use tokio::sync::watch;
use tourney::db::Database;
use tourney::notifications::{LogNotifier, NotificationDispatcher};
use tourney_server::{ServerConfig, Worker, logging, metrics};

const HELP: &str = "\
Run the tournament engine's deferred-task worker

USAGE:
  tourney_server [OPTIONS]

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL or sqlite://tourney.db]
  --poll-ms    MS          Scheduler poll interval     [default: env SCHEDULER_POLL_INTERVAL_MS or 1000]
  --metrics    IP:PORT     Prometheus listener         [default: env METRICS_BIND, disabled when unset]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             SQLite connection string
  SCHEDULER_BATCH_SIZE     Tasks claimed per poll
  SCHEDULER_LEASE_SECS     Seconds a claimed task is held
  SCHEDULER_MAX_ATTEMPTS   Attempts before a task is marked failed
  RUST_LOG                 Log filter (default: info,sqlx=warn)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let db_url: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let poll_ms: Option<u64> = pargs.opt_value_from_str("--poll-ms")?;
    let metrics_bind: Option<SocketAddr> = pargs.opt_value_from_str("--metrics")?;

    logging::init();

    let config = ServerConfig::from_env(db_url, poll_ms, metrics_bind)?;
    config.validate()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(Error::msg)?;
        tracing::info!("Metrics exported at http://{}/metrics", addr);
    }

    tracing::info!("Connecting to database: {}", config.database.database_url);
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db.migrate()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to apply schema: {}", e))?;
    tracing::info!("Database ready");

    let pool = Arc::new(db.pool().clone());
    let dispatcher = NotificationDispatcher::new(Arc::new(LogNotifier));
    let worker = Worker::new(pool, dispatcher, config.runner, config.poll_interval);

    worker.run(shutdown_rx).await;

    tracing::info!("Shutting down worker...");
    db.close().await;

    Ok(())
}
