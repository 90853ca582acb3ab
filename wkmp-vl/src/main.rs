//! wkmp-vl - Virtual Layout host
//!
//! `classify` stores a batch of physical objects and lays each one out
//! through the configured runtime on a bounded worker pool.
//! `check-rules` validates a rule file without touching the catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wkmp_common::config::{load_config, LoggingConfig, TomlConfig};
use wkmp_common::{CatalogObject, INVALID_OBJECT_ID, ROOT_CONTAINER_ID};
use wkmp_vl::db::{init_catalog_pool, SqliteCatalog};
use wkmp_vl::runtime::{self, RuleSetRuntime};
use wkmp_vl::store::CatalogStore;
use wkmp_vl::{Classifier, SessionReport};

/// Command-line arguments for wkmp-vl
#[derive(Parser, Debug)]
#[command(name = "wkmp-vl")]
#[command(about = "Virtual layout classifier for WKMP")]
#[command(version)]
struct Cli {
    /// Configuration file (overrides WKMP_VL_CONFIG and the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store physical objects from a JSON array and classify them
    Classify {
        /// JSON file holding an array of physical objects
        objects: PathBuf,

        /// Import root used for directory-based placements
        #[arg(long)]
        import_path: Option<PathBuf>,

        /// Concurrent classification sessions, each with its own runtime
        #[arg(long)]
        workers: Option<usize>,

        /// Catalog database (overrides database_path)
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Validate a rule file
    CheckRules {
        file: PathBuf,
    },
}

#[derive(Debug, Default)]
struct Summary {
    objects: usize,
    stored: usize,
    placements: usize,
    failed_sessions: usize,
    failed_workers: usize,
}

impl Summary {
    fn record(&mut self, report: &SessionReport) {
        self.placements += report.placements;
        if report.is_failed() {
            self.failed_sessions += 1;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("Starting wkmp-vl {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Classify {
            objects,
            import_path,
            workers,
            database,
        } => {
            let mut config = config;
            if let Some(path) = import_path {
                config.import_path = Some(path);
            }
            if let Some(workers) = workers {
                config.workers = workers.max(1);
            }
            if let Some(path) = database {
                config.database_path = path;
            }
            classify(&config, &objects).await
        }
        Command::CheckRules { file } => {
            let rules = RuleSetRuntime::from_file(&file)
                .with_context(|| format!("Invalid rule file {}", file.display()))?;
            println!("{}: {} rule(s) OK", file.display(), rules.rule_count());
            Ok(())
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

async fn classify(config: &TomlConfig, objects_file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(objects_file)
        .with_context(|| format!("Failed to read {}", objects_file.display()))?;
    let objects: Vec<CatalogObject> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse objects from {}", objects_file.display()))?;

    info!("Database: {}", config.database_path.display());
    let pool = init_catalog_pool(&config.database_path, config.workers as u32 + 1).await?;
    let catalog = Arc::new(SqliteCatalog::new(pool));

    // One runtime per worker; a runtime only ever runs one session at a time
    let shutdown = CancellationToken::new();
    let mut classifiers = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        let runtime = runtime::from_config(&config.layout)?;
        classifiers.push(
            Classifier::new(runtime, catalog.clone()).with_shutdown_token(shutdown.clone()),
        );
    }
    info!(
        runtime = %classifiers.first().map(|c| c.runtime_name()).unwrap_or("none"),
        workers = config.workers,
        objects = objects.len(),
        "Classifying"
    );

    tokio::spawn(watch_signals(shutdown.clone()));

    let import_path = config
        .import_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string());

    let mut summary = Summary {
        objects: objects.len(),
        ..Default::default()
    };

    let (queue, inbox) = mpsc::channel::<Arc<CatalogObject>>(config.workers);
    let inbox = Arc::new(Mutex::new(inbox));
    let mut workers = JoinSet::new();
    for (worker, classifier) in classifiers.into_iter().enumerate() {
        let inbox = inbox.clone();
        let import_path = import_path.clone();
        workers.spawn(async move {
            let mut reports = Vec::new();
            loop {
                let next = inbox.lock().await.recv().await;
                let Some(object) = next else { break };
                reports.push(classifier.process_object(&object, &import_path).await);
            }
            debug!(worker, sessions = reports.len(), "Worker finished");
            reports
        });
    }

    for mut object in objects {
        if shutdown.is_cancelled() {
            warn!("Shutdown requested, not starting further sessions");
            break;
        }

        // Input objects are physical; ids come from the catalog
        object.id = INVALID_OBJECT_ID;
        object.ref_id = None;
        object.is_virtual = false;
        if object.parent_id == INVALID_OBJECT_ID {
            object.parent_id = ROOT_CONTAINER_ID;
        }

        match catalog.assign_and_store(object.clone()).await {
            Ok(id) => {
                object.id = id;
                summary.stored += 1;
            }
            Err(e) => {
                error!(
                    location = %object.location.display(),
                    error = %e,
                    "Failed to store physical object"
                );
                continue;
            }
        }

        if queue.send(Arc::new(object)).await.is_err() {
            error!("All classification workers stopped");
            break;
        }
    }
    drop(queue);

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(reports) => reports.iter().for_each(|report| summary.record(report)),
            Err(e) => {
                error!(error = %e, "Classification worker did not complete");
                summary.failed_workers += 1;
            }
        }
    }

    info!(
        objects = summary.objects,
        stored = summary.stored,
        placements = summary.placements,
        failed_sessions = summary.failed_sessions,
        failed_workers = summary.failed_workers,
        "Classification finished"
    );
    println!(
        "{} object(s), {} stored, {} placement(s), {} failed session(s)",
        summary.objects, summary.stored, summary.placements, summary.failed_sessions
    );

    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}
