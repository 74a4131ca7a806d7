mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use glacier_restore_core::{
    create_event_channel, load_batch, load_config, validate_config, BatchReport,
    Config, ConfigError, HttpMailer, LogMailer, MailBackend, MailTransport, ObjectStore,
    RestoreEvent, RestoreEventEnvelope, RestoreOrchestrator, SanitizedConfig, StoreBackend,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code when some records did not reach `Notified`.
const EXIT_PARTIAL: i32 = 2;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(report) => {
            let code = exit_code(&report);
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn exit_code(report: &BatchReport) -> i32 {
    if report.is_complete_success() {
        0
    } else {
        EXIT_PARTIAL
    }
}

async fn run() -> Result<BatchReport> {
    init_logging();
    info!("glacier-restore {}", VERSION);

    let config = load_configuration()?;
    validate_config(&config).context("Configuration validation failed")?;
    info!(
        "Configuration: {}",
        serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default()
    );

    // First positional argument overrides the configured batch file.
    let batch_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.batch.path.clone());
    let specs = load_batch(&batch_path)
        .with_context(|| format!("Failed to load batch from {:?}", batch_path))?;
    info!("Loaded {} request(s) from {:?}", specs.len(), batch_path);

    let store = create_store(&config).await?;
    let mailer = create_mailer(&config)?;
    info!("Using store: {}, mailer: {}", store.name(), mailer.name());

    let (events, event_rx) = create_event_channel(config.restore.event_buffer_size);
    let renderer = tokio::spawn(render_events(event_rx));

    let orchestrator = RestoreOrchestrator::new(
        config.restore.clone(),
        store,
        mailer,
        config.mail.subject.clone(),
    )
    .with_events(events);

    tokio::spawn(cancel_on_signal(orchestrator.canceller()));

    let report = orchestrator.run(specs).await;

    // The orchestrator holds the last event handle; dropping it ends the renderer.
    drop(orchestrator);
    let _ = renderer.await;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize batch report")?
    );
    if !report.notification_failures.is_empty() {
        warn!(
            "Restored but not notified (resend manually): rows {:?}",
            report.notification_failures
        );
    }
    if std::env::var_os("GLACIER_RESTORE_METRICS").is_some() {
        eprintln!("{}", metrics::encode_metrics());
    }

    Ok(report)
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let json = std::env::var("GLACIER_RESTORE_LOG_FORMAT").is_ok_and(|f| f == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Load the config file, falling back to defaults when the default path is absent.
fn load_configuration() -> Result<Config> {
    let explicit = std::env::var("GLACIER_RESTORE_CONFIG").ok();
    let config_path = explicit
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    match load_config(&config_path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) if explicit.is_none() => {
            warn!("{:?} not found, using default configuration", config_path);
            Ok(Config::default())
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to load config from {:?}", config_path))
        }
    }
}

async fn create_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.store.backend {
        #[cfg(feature = "s3")]
        StoreBackend::S3 => {
            let store = glacier_restore_core::S3ObjectStore::new(&config.store).await;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "s3"))]
        StoreBackend::S3 => anyhow::bail!("built without S3 support (enable the `s3` feature)"),
    }
}

fn create_mailer(config: &Config) -> Result<Arc<dyn MailTransport>> {
    match config.mail.backend {
        MailBackend::Http => {
            let http = config
                .mail
                .http
                .as_ref()
                .context("mail backend is http but [mail.http] is missing")?;
            let mailer = HttpMailer::new(http, config.mail.from.clone())
                .context("Failed to create HTTP mailer")?;
            Ok(Arc::new(mailer))
        }
        MailBackend::Log => Ok(Arc::new(LogMailer::new())),
    }
}

/// Render progress events as log lines.
async fn render_events(mut rx: mpsc::Receiver<RestoreEventEnvelope>) {
    while let Some(envelope) = rx.recv().await {
        match envelope.event {
            RestoreEvent::BatchStarted {
                batch_id,
                total,
                workers,
            } => info!(target: "progress", "batch {} started: {} row(s) on {} worker(s)", batch_id, total, workers),
            RestoreEvent::RecordRejected { row, error } => {
                warn!(target: "progress", "row {} rejected: {}", row, error)
            }
            RestoreEvent::PhaseChanged {
                row, key, from, to, ..
            } => info!(
                target: "progress",
                "row {} {}: {} -> {}",
                row,
                key.as_deref().unwrap_or("?"),
                from,
                to
            ),
            RestoreEvent::RetryScheduled {
                row,
                operation,
                attempt,
                delay_ms,
                error,
            } => warn!(
                target: "progress",
                "row {} {} attempt {} failed, retrying in {}ms: {}",
                row,
                operation.as_str(),
                attempt,
                delay_ms,
                error
            ),
            RestoreEvent::RecordFinished {
                row, phase, error, ..
            } => match error {
                Some(error) => warn!(target: "progress", "row {} finished {}: {}", row, phase, error),
                None => info!(target: "progress", "row {} finished {}", row, phase),
            },
            RestoreEvent::BatchCancelled { batch_id } => {
                warn!(target: "progress", "batch {} cancelled", batch_id)
            }
            RestoreEvent::BatchCompleted {
                batch_id,
                notified,
                failed,
                incomplete,
            } => info!(
                target: "progress",
                "batch {} completed: {} notified, {} failed, {} incomplete",
                batch_id,
                notified,
                failed,
                incomplete
            ),
        }
    }
}

/// Cancel the batch on Ctrl+C or SIGTERM.
async fn cancel_on_signal(canceller: CancellationToken) {
    shutdown_signal().await;
    warn!("Interrupt received, finishing in-flight calls and stopping");
    canceller.cancel();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
