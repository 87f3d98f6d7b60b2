use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use range_api::config::Config;
use range_api::db;
use range_api::engine::EnginePool;
use range_api::index::{InstanceIndex, MemoryIndex};
use range_api::logstore::{self, PgLogSink, RetentionSweeper};
use range_api::routes;
use range_api::services::admins::AdminService;
use range_api::services::images::ImageService;
use range_api::services::instances::InstanceService;
use range_api::services::reaper::Reaper;
use range_api::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Fatal error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing::info!(addr = %config.listen_addr, env = %config.app_env, "Starting range API");

    let pool = db::create_pool(&config.database_url).await?;
    db::migrate(&pool).await?;
    tracing::info!("Connected to PostgreSQL");

    // Singletons built once at boot and passed down explicitly.
    let engines = Arc::new(EnginePool::new());
    let index: Arc<dyn InstanceIndex> = Arc::new(MemoryIndex::new());

    let instances = InstanceService::new(
        pool.clone(),
        engines.clone(),
        index.clone(),
        config.instance_ttl,
    );
    let images = ImageService::new(pool.clone(), engines.clone(), config.registry_url.clone());
    let admins = AdminService::new(pool.clone(), config.jwt_secret.clone());

    admins.bootstrap(config.is_production()).await?;

    let (request_logs, log_writer) = logstore::start(PgLogSink::new(pool.clone()));
    let retention = RetentionSweeper::new(pool.clone(), config.log_retention_days).start();
    let reaper = Reaper::new(pool.clone(), engines.clone(), index.clone()).start();

    // Startup bootstrap: sync the registry into the image table, then warm
    // every enabled host. Detached; failures only log.
    {
        let images = images.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            match images.sync_from_registry(None).await {
                Ok(count) => tracing::info!(synced = count, "Startup registry sync complete"),
                Err(err) => tracing::warn!(error = %err, "Startup registry sync failed"),
            }
            if let Err(err) = images.preload_all().await {
                tracing::warn!(error = %err, "Startup image preload failed");
            }
        });
    }

    let state = AppState {
        config: config.clone(),
        db: pool,
        engines,
        instances,
        images,
        admins,
        request_logs,
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Drain the background tasks before exiting.
    reaper.shutdown().await;
    retention.shutdown().await;
    log_writer.shutdown().await;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Received shutdown signal");
}
