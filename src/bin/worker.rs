use doc_extract_worker::{
    app_state::AppState,
    config::AppConfig,
    db,
    routes,
    services::{
        index::ElasticsearchIndex, ocr::TesseractCli, queue::JobQueue, storage::S3Store,
    },
    shutdown,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting document extraction worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!(endpoint = %config.minio_url(), "Initializing object storage client");
    let storage = S3Store::new(
        &config.minio_url(),
        &config.minio_region,
        &config.minio_access_key,
        &config.minio_secret_key,
    )
    .expect("Failed to initialize object storage client");

    tracing::info!(queue = %config.queue_name, worker_id = %config.worker_id, "Connecting to Redis job queue");
    let queue = JobQueue::new(
        &config.redis_url,
        &config.queue_name,
        &config.worker_id,
        config.dead_letter,
    )
    .expect("Failed to initialize job queue");

    let ocr = TesseractCli::new(&config.tesseract_bin, config.tessdata_prefix.clone());

    let index = config.search_index_url().map(|url| {
        tracing::info!(
            url,
            index = %config.elasticsearch_index,
            timeout_ms = config.elasticsearch_timeout_ms,
            "Search indexing enabled"
        );
        ElasticsearchIndex::new(url, &config.elasticsearch_index, config.elasticsearch_timeout())
            .expect("Failed to initialize search index client")
    });

    let state = AppState::new(db_pool.clone(), storage, queue, ocr, index);

    match state.queue.recover_in_flight().await {
        Ok(0) => {}
        Ok(recovered) => tracing::warn!(recovered, "Requeued jobs left in flight by a previous run"),
        Err(e) => tracing::error!(error = %e, "Failed to recover in-flight jobs"),
    }

    let (trigger, shutdown_signal) = shutdown::channel();
    tokio::spawn(shutdown::listen_for_signals(trigger.clone()));

    // Health and metrics listener
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind health listener");
    tracing::info!("Health endpoint listening on {}", config.bind_addr);
    let app = routes::router(state.clone(), prometheus_handle);
    let mut server_shutdown = trigger.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.triggered().await })
            .await
    });

    let scratch_dir = config.scratch_dir();
    tracing::info!(scratch_dir = %scratch_dir.display(), "Scratch directory");
    let worker = state.worker(scratch_dir);

    let stats = worker
        .run(state.queue.as_ref(), shutdown_signal, config.poll_interval())
        .await;

    // The loop only exits on shutdown; make sure the listener follows.
    trigger.trigger();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Health server error"),
        Err(e) => tracing::error!(error = %e, "Health server task failed"),
    }

    db_pool.close().await;
    tracing::info!(
        acknowledged = stats.acknowledged,
        rejected = stats.rejected,
        broker_errors = stats.broker_errors,
        "Queue and database connections closed. Exiting."
    );
}
