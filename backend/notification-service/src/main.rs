use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use db_pool::{create_pool, DbConfig};
use notification_service::services::{KafkaEventSink, KafkaEventSource};
use notification_service::{
    handlers::register_routes, metrics, store::MIGRATOR, Config, EventConsumer, EventProducer,
    NotificationStore, PgNotificationStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BROKER_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(env = %config.app.env, "Starting notification service");

    // Database
    let mut db_config =
        DbConfig::from_env("notification-service").map_err(anyhow::Error::msg)?;
    db_config.database_url = config.database.url.clone();
    db_config.max_connections = config.database.max_connections;
    db_config.log_config();

    let db_pool = create_pool(db_config)
        .await
        .context("Failed to connect to database")?;
    MIGRATOR
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    let store: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(db_pool));

    // Event log
    let sink = KafkaEventSink::new(&config.kafka).context("Failed to create Kafka producer")?;
    sink.check_connectivity(BROKER_CHECK_TIMEOUT)
        .await
        .context("Kafka broker is unreachable")?;
    let producer = EventProducer::new(Arc::new(sink));

    let source = KafkaEventSource::new(&config.kafka).context("Failed to create Kafka consumer")?;
    let consumer = EventConsumer::new(source, store.clone());
    tokio::spawn(consumer.run());

    let addr = config.bind_address();
    tracing::info!(%addr, "Starting HTTP server");

    let producer_data = web::Data::new(producer);
    let store_data: web::Data<dyn NotificationStore> = web::Data::from(store);

    HttpServer::new(move || {
        App::new()
            .app_data(producer_data.clone())
            .app_data(store_data.clone())
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(register_routes)
    })
    .bind(&addr)
    .with_context(|| format!("Failed to bind {addr}"))?
    .run()
    .await
    .context("HTTP server error")
}
