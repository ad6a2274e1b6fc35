//! API server entry point

use std::net::SocketAddr;

use axum::http::{header, Method};
use bettersaas_api::{create_router, AppState, Config};
use bettersaas_billing::StripeConfig;
use bettersaas_shared::{create_pool, run_migrations};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bettersaas_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting billing API server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; the webhook secret is validated here, at startup,
    // not on the request path.
    let config = Config::from_env()?;
    let stripe_config = StripeConfig::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool and apply migrations
    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database connection established");

    // Create application state (explicitly constructed clients, injected
    // into handlers through the router state)
    let state = AppState::new(pool, config.clone(), stripe_config);

    // CORS: explicit origin allowlist for the browser-facing query routes.
    // The webhook endpoint is server-to-server and unaffected.
    let allowed_origins: Vec<axum::http::HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
