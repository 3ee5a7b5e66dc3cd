use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voyage_api::{
    app,
    metrics::Metrics,
    middleware::RedisRateLimiter,
    state::{AppState, AuthConfig},
};
use voyage_core::payment::MockPaymentGateway;
use voyage_core::BookingService;
use voyage_store::{DbClient, EventProducer, PgBookingRepository, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voyage_api=debug,voyage_core=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = voyage_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Voyage API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let repo = Arc::new(PgBookingRepository::new(db.pool.clone()));

    // Redis Connection
    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?,
    );

    // Kafka Connection
    let kafka = Arc::new(
        EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?,
    );

    let bookings = BookingService::new(
        repo.clone(),
        repo,
        Arc::new(MockPaymentGateway),
        redis.clone(),
        kafka,
        config.business_rules.booking_rules(),
    );

    let app_state = AppState {
        bookings,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        rate_limiter: Arc::new(RedisRateLimiter::new(
            redis,
            config.business_rules.rate_limit_per_minute,
        )),
        metrics: Arc::new(Metrics::new().context("Failed to register metrics")?),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
