use std::sync::Arc;
use std::time::Duration;

use meetscribe_api::{build_router, state::AppState};
use meetscribe_config::Settings;
use meetscribe_db::{connect, indexes::ensure_indexes};
use meetscribe_services::{
    FilterEngine, Reconciler, StreamConsumer,
    dao::{AccountDao, MeetingDao, SessionDao, TranscriptDao},
    reconcile::MongoSink,
    stage::RedisStageStore,
    stream::{MongoDirectory, RedisEventLog, Resolver},
};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "meetscribe_api=debug,meetscribe_services=debug,meetscribe_db=debug,tower_http=debug"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let settings = Settings::load()?;
    info!(
        "Starting MeetScribe on {}:{}",
        settings.app.host, settings.app.port
    );

    // Connect to MongoDB
    let db = connect(&settings).await?;
    ensure_indexes(&db).await?;

    // Connect to Redis (shared multiplexed connection)
    let redis_client = redis::Client::open(settings.redis.url.as_str())?;
    let redis_conn = redis_client.get_connection_manager().await?;
    info!(url = %settings.redis.url, "Connected to Redis");

    // Ingestion pipeline
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let event_log = Arc::new(RedisEventLog::new(redis_conn.clone(), &settings.stream).await?);
    let stage = Arc::new(RedisStageStore::new(
        redis_conn.clone(),
        settings.stage.clone(),
    ));
    let directory = Arc::new(MongoDirectory::new(
        AccountDao::new(&db),
        MeetingDao::new(&db),
        SessionDao::new(&db),
    ));
    let resolver = Arc::new(Resolver::new(
        directory,
        Duration::from_secs(settings.stream.resolver_cache_ttl_secs),
    ));
    let consumer = Arc::new(StreamConsumer::new(
        event_log,
        stage.clone(),
        resolver,
        settings.stream.clone(),
        shutdown_rx.clone(),
    ));

    let sink = Arc::new(MongoSink::new(
        TranscriptDao::new(&db),
        SessionDao::new(&db),
        MeetingDao::new(&db),
    ));
    let filter = Arc::new(FilterEngine::from_settings(&settings.filter)?);
    let reconciler = Arc::new(Reconciler::new(
        stage,
        sink,
        filter,
        settings.reconciler.clone(),
        shutdown_rx,
    ));

    let consumer_task = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.run().await })
    };
    let reclaim_task = tokio::spawn(async move { consumer.run_reclaim().await });
    let reconciler_task = tokio::spawn(async move { reconciler.run().await });

    // Query surface
    let app_state = AppState::new(db, redis_conn, settings.clone());
    let app = build_router(app_state);

    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    // Stop the pipeline workers and let them settle.
    shutdown_tx.send(true).ok();
    let _ = tokio::join!(consumer_task, reclaim_task, reconciler_task);
    info!("MeetScribe stopped");

    Ok(())
}
