use std::sync::Arc;

use triage_assist::config::TriageConfig;
use triage_assist::notify::metrics::DeliveryMetrics;
use triage_assist::notify::queue::{self, NotificationQueue};
use triage_assist::notify::transport::{LogOnlyTransport, NotificationTransport, SmtpNotifier};
use triage_assist::notify::worker::DeliveryWorker;
use triage_assist::store::{LibSqlStore, TriageStore};
use triage_assist::suggest::generator::SuggestionGenerator;
use triage_assist::triage::TriageService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = TriageConfig::from_env();

    eprintln!("🎫 Triage Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Generative backend: {}",
        match &config.generative {
            Some(g) => format!("enabled (model: {})", g.model),
            None => "disabled (heuristic fallback only)".to_string(),
        }
    );
    eprintln!(
        "   Delivery: max {} attempts, dispatch every {:?}",
        config.delivery.max_retry_count, config.delivery.dispatch_interval
    );

    // ── Database ────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let store: Arc<dyn TriageStore> =
        Arc::new(LibSqlStore::new_local(db_path).await.unwrap_or_else(|e| {
            eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        }));
    eprintln!("   Database: {}", config.db_path);

    // ── Delivery pipeline ───────────────────────────────────────────────
    let transport: Arc<dyn NotificationTransport> = match config.smtp.clone() {
        Some(smtp) => {
            eprintln!("   Transport: SMTP ({}:{})", smtp.host, smtp.port);
            Arc::new(SmtpNotifier::new(smtp))
        }
        None => {
            eprintln!("   Transport: log-only (TRIAGE_SMTP_HOST not set)");
            Arc::new(LogOnlyTransport::new())
        }
    };

    let metrics = Arc::new(DeliveryMetrics::new());
    let worker = Arc::new(DeliveryWorker::new(
        Arc::clone(&store),
        transport,
        Arc::clone(&metrics),
        config.delivery.max_retry_count,
        config.delivery.worker_id.clone(),
    ));
    let notification_queue = NotificationQueue::new(Arc::clone(&store), worker, metrics);

    // ── Triage service ──────────────────────────────────────────────────
    let generator = SuggestionGenerator::from_config(config.generative.clone());
    let _service = TriageService::new(
        Arc::clone(&store),
        generator,
        Arc::clone(&notification_queue),
    );

    // Background dispatcher, alongside enqueue-triggered passes
    let _dispatch_handle = queue::spawn_dispatch_task(
        Arc::clone(&notification_queue),
        config.delivery.dispatch_interval,
    );
    eprintln!("   Worker: {}\n", config.delivery.worker_id);

    tracing::info!("Triage core running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    let snapshot = notification_queue.metrics();
    tracing::info!(
        sent = snapshot.sent,
        failed_attempts = snapshot.failed_attempts,
        dead_lettered = snapshot.dead_lettered,
        queue_depth = snapshot.queue_depth,
        "Shutting down"
    );
    Ok(())
}
