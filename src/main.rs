use std::net::SocketAddr;
use std::sync::Arc;

use figment::providers::Format;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod classify;
mod config;
mod dispatcher;
mod error;
mod fetcher;
mod index;
mod notify;
mod scheduler;
mod services;
mod tasks;
mod walker;

use classify::Classifier;
use fetcher::{DownloadEngine, FetcherClient};
use index::{IndexClient, IndexProvider};
use notify::{ChatNotifier, LogNotifier, Notifier};
use scheduler::Scheduler;
use services::{DownloadService, FileService};
use tasks::{ScheduledTask, TaskStore};

pub struct AppState {
    pub config: config::Config,
    pub file_service: Arc<FileService>,
    pub download_service: Arc<DownloadService>,
    pub scheduler: Arc<Scheduler>,
    pub task_store: Arc<TaskStore>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fetcharr=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fetcharr v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config::ensure_appdata_dirs() {
        tracing::warn!("Failed to create appData directories: {}. Continuing.", e);
    }

    let config_path = config::get_config_path();
    tracing::info!("Loading config from: {}", config_path.display());

    // Load Config
    let config: config::Config = figment::Figment::new()
        .merge(figment::providers::Serialized::defaults(config::Config::default()))
        .merge(figment::providers::Toml::file(config_path))
        .merge(figment::providers::Env::prefixed("FETCHARR_"))
        .extract()
        .expect("Failed to load configuration");

    // One HTTP client pools connections for every external service
    let shared_http_client = Arc::new(
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client"),
    );

    // External collaborators
    let index_client: Arc<dyn IndexProvider> = Arc::new(IndexClient::new(
        config.index.clone(),
        Arc::clone(&shared_http_client),
    ));
    let fetcher_client: Arc<dyn DownloadEngine> = Arc::new(FetcherClient::new(
        config.fetcher.clone(),
        Arc::clone(&shared_http_client),
    ));
    let notifier: Arc<dyn Notifier> = if config.notify.enabled {
        Arc::new(ChatNotifier::new(
            config.notify.clone(),
            Arc::clone(&shared_http_client),
        ))
    } else {
        Arc::new(LogNotifier)
    };

    // Core pipeline
    let classifier = Arc::new(Classifier::new(
        config.fetcher.download_dir.clone(),
        &config.rules,
    ));
    let file_service = Arc::new(FileService::new(
        index_client,
        classifier,
        config.rules.clone(),
    ));
    let download_service = Arc::new(DownloadService::new(fetcher_client));

    // Task persistence and cron engine
    let task_store = Arc::new(
        TaskStore::open(&config.scheduler.data_dir).expect("Failed to open task store"),
    );
    merge_bootstrap_tasks(&config, &task_store);

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&task_store),
        Arc::clone(&file_service),
        Arc::clone(&download_service),
        notifier,
    ));

    if config.scheduler.enabled {
        if let Err(e) = scheduler.start().await {
            tracing::error!("Failed to start scheduler: {}", e);
        }
    } else {
        tracing::info!("Scheduler disabled by configuration");
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        file_service,
        download_service,
        scheduler: Arc::clone(&scheduler),
        task_store,
    });

    // Build router
    let app = axum::Router::new()
        .nest("/api/v1", api::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Run server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid server bind address");
    tracing::info!("Listening on {}", addr);

    // Create socket with SO_REUSEADDR to allow immediate restart after crash
    use socket2::{Domain, Socket, Type};
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).expect("Failed to create socket");
    socket
        .set_reuse_address(true)
        .expect("Failed to set SO_REUSEADDR");
    socket.bind(&addr.into()).expect("Failed to bind socket");
    socket.listen(1024).expect("Failed to listen on socket");
    socket
        .set_nonblocking(true)
        .expect("Failed to set non-blocking mode");

    let listener = tokio::net::TcpListener::from_std(socket.into())
        .expect("Failed to convert to tokio listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await
        .unwrap();
}

/// Statically configured tasks are merged once at startup; a persisted task
/// with the same name wins
fn merge_bootstrap_tasks(config: &config::Config, store: &TaskStore) {
    let existing: Vec<String> = store.get_all().into_iter().map(|t| t.name).collect();

    for bootstrap in &config.scheduler.bootstrap_tasks {
        if existing.iter().any(|name| name == &bootstrap.name) {
            continue;
        }
        let mut task = ScheduledTask::new(
            bootstrap.name.clone(),
            "config".to_string(),
            bootstrap.cron.clone(),
            bootstrap.path.clone(),
            bootstrap.hours_ago,
        );
        task.video_only = bootstrap.video_only;
        task.auto_preview = bootstrap.auto_preview;

        match store.create(task) {
            Ok(()) => tracing::info!("bootstrapped task '{}'", bootstrap.name),
            Err(e) => tracing::warn!("bootstrapping task '{}' failed: {}", bootstrap.name, e),
        }
    }
}

/// Ctrl-C drains the scheduler before the server exits
async fn shutdown_signal(scheduler: Arc<Scheduler>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received, stopping scheduler");
    scheduler.stop().await;
}
