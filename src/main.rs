// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::EnvFilter;

use finboard::application::dashboard_repository::DashboardRepository;
use finboard::application::dashboard_service::DashboardService;
use finboard::application::fetch_cache::FetchCache;
use finboard::application::json_source::JsonSource;
use finboard::application::streaming_service::StreamingDashboardService;
use finboard::application::widget_data_service::WidgetDataService;
use finboard::infrastructure::config::load_app_config;
use finboard::infrastructure::http_source::HttpJsonSource;
use finboard::infrastructure::json_file_repository::JsonFileRepository;
use finboard::presentation::app_state::AppState;
use finboard::presentation::routes::build_app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_app_config()?;

    // Initialize tracing, RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Create adapters (infrastructure layer)
    let source: Arc<dyn JsonSource> = Arc::new(HttpJsonSource::new(&config.http)?);
    let repository: Arc<dyn DashboardRepository> =
        Arc::new(JsonFileRepository::new(&config.storage.path));

    // Create services (application layer)
    let cache = Arc::new(
        FetchCache::new(source, config.cache.max_entries)
            .with_default_duration(config.cache.default_duration()),
    );
    let _sweeper = cache.spawn_sweeper(config.cache.sweep_interval(), config.cache.max_age());
    let data_service = WidgetDataService::new(Arc::clone(&cache), config.watchlist.clone());
    let (dashboard_service, _scheduler) = DashboardService::start(repository, data_service).await?;
    let streaming_service = StreamingDashboardService::new(dashboard_service.clone());

    // Create application state
    let state = Arc::new(AppState {
        dashboard_service,
        streaming_service,
    });

    // Build router (presentation layer)
    let router = build_app(state);

    // Start server
    let addr: SocketAddr = config.server.bind_addr.parse()?;
    tracing::info!(%addr, storage = %config.storage.path, "starting finboard service");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
