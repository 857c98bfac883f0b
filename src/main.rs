use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::http::Method;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use murmur_backend::config::Config;
use murmur_backend::db::postgres_user_store::PostgresUserStore;
use murmur_backend::db::user_store::UserStore;
use murmur_backend::responses::JsonResponse;
use murmur_backend::routes::{admin, billing, identity, limits, stripe, usage};
use murmur_backend::services::counters::hosted::HostedCounterStore;
use murmur_backend::services::counters::memory::MemoryCounterStore;
use murmur_backend::services::counters::CounterStore;
use murmur_backend::services::entitlements::EntitlementResolver;
use murmur_backend::services::identity::live::HttpIdentityProvider;
use murmur_backend::services::identity::IdentityProvider;
use murmur_backend::services::stripe::{LiveStripeService, StripeService};
use murmur_backend::services::usage::UsageLimiter;
use murmur_backend::state::AppState;
use murmur_backend::utils::jwt::JwtKeys;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _sentry_guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let config = Arc::new(Config::from_env());

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        // Default: 200ms/token (~5 req/sec)
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        // Default: allow short bursts during client polling
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::error_with_code(
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many requests. Please wait a moment and try again.",
                    "rate_limited",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    // Background task to cleanup old IPs
    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let pg_pool = establish_connection(&config.database_url).await;
    let users = Arc::new(PostgresUserStore::new(pg_pool)) as Arc<dyn UserStore>;

    let identity_provider = Arc::new(HttpIdentityProvider::new(
        config.identity.base_url.clone(),
        config.identity.secret_key.clone(),
    )) as Arc<dyn IdentityProvider>;

    let stripe_service =
        Arc::new(LiveStripeService::from_settings(&config.stripe)) as Arc<dyn StripeService>;

    let counters: Arc<dyn CounterStore> = match config.counter.as_ref() {
        Some(settings) => Arc::new(HostedCounterStore::new(
            settings.url.clone(),
            settings.token.clone(),
        )),
        None => {
            warn!("no hosted counter configured, usage counters are process-local");
            Arc::new(MemoryCounterStore::new())
        }
    };

    let entitlements = Arc::new(EntitlementResolver::new(
        identity_provider.clone(),
        users.clone(),
    ));
    let limiter = Arc::new(UsageLimiter::new(counters, config.usage_window));
    let jwt_keys = Arc::new(JwtKeys::from_env().expect("JWT secret is unusable"));

    let state = AppState {
        users,
        identity: identity_provider,
        stripe: stripe_service,
        entitlements,
        limiter,
        config: config.clone(),
        jwt_keys,
    };

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_origin.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let limits_routes = Router::new()
        .route("/minutes", get(limits::minutes_left))
        .route("/transformations", get(limits::transformations_left));

    let usage_routes = Router::new()
        .route("/minutes", post(usage::consume_minutes))
        .route("/transformations", post(usage::consume_transformation));

    let billing_routes = Router::new()
        .route("/checkout-session", post(billing::create_checkout_session))
        .route("/cancel", post(billing::cancel_subscription))
        .route("/webhook", post(stripe::webhook));

    let admin_routes = Router::new().route(
        "/entitlements/{user_id}",
        get(admin::entitlement_snapshot),
    );

    let app = Router::new()
        .route("/", get(root))
        .nest("/api/limits", limits_routes)
        .nest("/api/usage", usage_routes)
        .nest("/api/billing", billing_routes)
        .route("/api/identity/webhook", post(identity::webhook))
        .nest("/api/admin", admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf.clone(),
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    let listener = TcpListener::bind(addr).await?;
    info!("listening at http://{}", addr);
    axum::serve(listener, make_service).await?;
    Ok(())
}

/// A simple root route.
async fn root() -> Response {
    JsonResponse::success("Hello, Murmur!").into_response()
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> PgPool {
    let pool = PgPool::connect(database_url)
        .await
        .expect("Failed to connect to the database");

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .expect("Failed to verify database connection");

    info!("✅ Successfully connected to the database");
    pool
}
