//! Composition root for the container-image hygiene platform.
//!
//! Wires the job store, artifact store, work queue, and pipeline executor
//! into a running process, then serves the Submission & Query API over
//! HTTP. The "control plane" is the axum server and the "data plane" is the
//! queue's own background workers, so `serve` and `worker` can run together
//! in one process or split across two for independent scaling.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hygiene_db::{create_pool, DbConfig, DbPool, JobStore};
use hygiene_protocol::Config;
use hygiene_queue::{BrokerQueue, InMemoryQueue, WorkQueue};
use hygiene_store::{ArtifactStore, FsArtifactStore};
use hygiene_worker::{Executor, ImageInspector, SkopeoInspector};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hygiene", about = "Container-image hygiene platform")]
struct Cli {
    /// Enable verbose (debug) console logging.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the API server and the pipeline executor in one process (default).
    Serve {
        #[arg(long)]
        bind_addr: Option<String>,
    },
    /// Run only the Submission & Query API; jobs are picked up by a separate
    /// `worker` process. Requires `QUEUE_BACKEND=broker`.
    Api {
        #[arg(long)]
        bind_addr: Option<String>,
    },
    /// Run only the pipeline executor against the durable broker, with no
    /// HTTP listener. Requires `QUEUE_BACKEND=broker`.
    Worker,
}

/// Everything the API router and the executor are built from.
struct Components {
    jobs: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    queue: Arc<dyn WorkQueue>,
    inspector: Arc<dyn ImageInspector>,
    config: Arc<Config>,
}

async fn build_components(config: Config) -> Result<(Components, CancellationToken)> {
    let job_pool: DbPool = create_pool(DbConfig::from_dsn(config.job_store_dsn.clone()))
        .await
        .context("failed to open job store")?;
    let jobs = Arc::new(JobStore::connect(job_pool).await.context("failed to migrate job store")?);

    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(config.object_store_root.clone()));

    let cancellation = CancellationToken::new();

    let queue: Arc<dyn WorkQueue> = match config.queue_backend {
        hygiene_protocol::QueueBackend::Memory => InMemoryQueue::new(None, Some(Arc::clone(&jobs))),
        hygiene_protocol::QueueBackend::Broker => {
            let broker_dsn = config.broker_url.clone().unwrap_or_else(|| config.job_store_dsn.clone());
            let broker_pool = create_pool(DbConfig::from_dsn(broker_dsn))
                .await
                .context("failed to open broker queue store")?;
            BrokerQueue::connect(broker_pool, None, Some(Arc::clone(&jobs)))
                .await
                .context("failed to initialise broker queue")?
        }
    };

    let inspector: Arc<dyn ImageInspector> = Arc::new(SkopeoInspector::new(config.inspection_timeout));

    let executor = Executor::new(
        Arc::clone(&jobs),
        Arc::clone(&artifacts),
        config.clone(),
        cancellation.clone(),
    );
    queue.register("analyze_image", Arc::new(executor)).await;

    let config = Arc::new(config);
    Ok((
        Components {
            jobs,
            artifacts,
            queue,
            inspector,
            config,
        },
        cancellation,
    ))
}

fn init_logging(verbose: bool) -> Result<()> {
    hygiene_logging::init_logging(hygiene_logging::LogConfig {
        app_name: "hygiene",
        verbose,
        tui_mode: false,
    })
}

/// Waits for SIGINT, or SIGTERM on unix, to resolve.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_serve(bind_addr: Option<String>, run_worker: bool, verbose: bool) -> Result<()> {
    init_logging(verbose)?;
    let mut config = Config::from_env();
    if let Some(bind_addr) = bind_addr {
        config.bind_addr = bind_addr;
    }
    let bind_addr = config.bind_addr.clone();

    let (components, cancellation) = build_components(config).await?;
    if !run_worker {
        info!("api-only mode: analyse tasks will not be picked up by this process");
    }

    let state = hygiene_api::AppState {
        jobs: components.jobs,
        artifacts: components.artifacts,
        queue: components.queue,
        inspector: components.inspector,
        config: components.config,
    };
    let app = hygiene_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "hygiene API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server exited with an error")?;

    cancellation.cancel();
    Ok(())
}

async fn run_worker_only(verbose: bool) -> Result<()> {
    init_logging(verbose)?;
    let config = Config::from_env();
    if !matches!(config.queue_backend, hygiene_protocol::QueueBackend::Broker) {
        anyhow::bail!("`hygiene worker` requires QUEUE_BACKEND=broker; the in-memory queue cannot be shared across processes");
    }

    let (components, cancellation) = build_components(config).await?;
    info!("worker running; executor registered against the durable broker");

    shutdown_signal().await;
    info!("shutdown signal received, draining in-flight tasks");
    cancellation.cancel();

    // Give in-flight stage work a moment to observe the cancellation token
    // before the process exits; the broker itself is durable, so anything
    // still claimed survives for the next worker to resume.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve { bind_addr: None }) {
        Commands::Serve { bind_addr } => run_serve(bind_addr, true, cli.verbose).await,
        Commands::Api { bind_addr } => run_serve(bind_addr, false, cli.verbose).await,
        Commands::Worker => run_worker_only(cli.verbose).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn no_subcommand_parses_and_defaults_to_serve() {
        let cli = Cli::parse_from(["hygiene"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn serve_accepts_a_bind_addr_override() {
        let cli = Cli::parse_from(["hygiene", "serve", "--bind-addr", "127.0.0.1:9999"]);
        match cli.command {
            Some(Commands::Serve { bind_addr }) => assert_eq!(bind_addr.as_deref(), Some("127.0.0.1:9999")),
            other => panic!("expected Commands::Serve, got {other:?}"),
        }
    }

    #[test]
    fn worker_subcommand_takes_no_arguments() {
        let cli = Cli::parse_from(["hygiene", "-v", "worker"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Worker)));
    }
}
