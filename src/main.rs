use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use arena_loyalty::clients::{HttpPosClient, OneSignalNotifier, RedisBroker, XenditGateway};
use arena_loyalty::config::{CallbackVerifier, Config};
use arena_loyalty::handlers::AppState;
use arena_loyalty::routes::create_routes;
use arena_loyalty::services::{
    AdminService, BadgeTopics, BookingService, EventPublisher, OutboundWorker,
    PaymentReconciler, PointCalculator, ProfileService, RedemptionService,
};
use arena_loyalty::store::{PgStore, Store};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,arena_loyalty=debug")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .expect("Failed to build HTTP client");

    let gateway = Arc::new(XenditGateway::new(
        http.clone(),
        config.gateway_url.clone(),
        config.gateway_secret_key.clone(),
        config.invoice_duration,
    ));
    let pos = Arc::new(HttpPosClient::new(
        http.clone(),
        config.pos_base_url.clone(),
        config.pos_api_key.clone(),
        config.allow_same_invoice_redemption,
    ));
    let notifier = OneSignalNotifier::new(
        http,
        config.push_api_url.clone(),
        config.push_app_id.clone(),
        config.push_api_key.clone(),
    );
    if !notifier.is_configured() {
        tracing::warn!("Push credentials missing, notifications will be stored only");
    }
    let broker = RedisBroker::connect(&config.redis_url)
        .await
        .expect("Failed to connect to Redis");

    tracing::info!("Successfully connected to Redis");

    let calculator =
        PointCalculator::new(config.point_currency_ratio).expect("Invalid point ratio");

    let (publisher, events) = EventPublisher::channel();
    let worker = OutboundWorker::new(
        store.clone(),
        Arc::new(broker),
        Arc::new(notifier),
        BadgeTopics {
            prefix: config.badge_topic_prefix.clone(),
            invoice: config.badge_invoice_topic.clone(),
        },
    );
    tokio::spawn(worker.run(events));

    let state = AppState {
        bookings: Arc::new(BookingService::new(store.clone(), gateway)),
        reconciler: Arc::new(PaymentReconciler::new(
            store.clone(),
            calculator,
            publisher.clone(),
        )),
        redemptions: Arc::new(RedemptionService::new(
            store.clone(),
            pos,
            calculator,
            publisher.clone(),
        )),
        profiles: Arc::new(ProfileService::new(store.clone())),
        admin: Arc::new(AdminService::new(store, publisher)),
        callback_verifier: CallbackVerifier::new(config.callback_token.clone()),
    };

    let app = create_routes(state, &config.cors_allowed_origins, config.is_production);

    tracing::info!("🚀 Server running at http://{}", config.server_addr);

    let listener = TcpListener::bind(config.server_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
