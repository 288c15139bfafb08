use {
    change_trail::{
        AppState,
        adapters::http,
        config::Config,
        domain::inventory::tracked_link_tables,
        infra::postgres::PgStore,
        services::{
            polymorphic_store::PolymorphicStore, recorder::ChangeRecorder,
            registry::EntityRegistry,
        },
    },
    axum::http::StatusCode,
    sqlx::postgres::PgPoolOptions,
    std::sync::Arc,
    tokio::signal,
    tower::ServiceBuilder,
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let store = PgStore::new(pool);
    store.migrate().await.expect("failed to run migrations");

    let registry = Arc::new(EntityRegistry::new());
    registry
        .bootstrap(&store, tracked_link_tables())
        .await
        .expect("failed to register link tables");
    tracing::info!(link_tables = registry.len(), "change tracking ready");

    let state = AppState {
        recorder: Arc::new(ChangeRecorder::new(store.clone(), registry)),
        sockets: Arc::new(PolymorphicStore::new(store)),
    };

    let app = http::router(state)
        .layer(ServiceBuilder::new().layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        )));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("failed to bind");
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
