//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

use attendance::{
    AttendanceAppState, AttendanceConfig, PgAttendanceRepository, attendance_router, spawn_reaper,
};
use axum::{
    Router, http,
    http::{Method, header},
};
use platform::clock::system_clock;
use platform::config::Env;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:31113";
const DEFAULT_FRONTEND_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,attendance=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = Env::system();

    // Database connection
    let database_url = env.required("DATABASE_URL")?;

    let pool = PgPoolOptions::new()
        .max_connections(env.parse_or("DATABASE_MAX_CONNECTIONS", 5)?)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    // Attendance configuration
    let config = AttendanceConfig::from_env(&env)?;
    tracing::info!(
        session_ttl_secs = config.session_ttl.as_secs(),
        token_window_secs = config.token_window.as_secs(),
        utc_offset_minutes = config.utc_offset_minutes,
        redeem_base_url = config.redeem_base_url.as_deref().unwrap_or("-"),
        "Attendance configuration loaded"
    );

    let reap_interval = config.reap_interval;
    let rate_limit_window = config.issue_rate_limit.window;
    let state = AttendanceAppState::new(PgAttendanceRepository::new(pool), config, system_clock());

    // Expired sessions and idle rate-limit keys are swept in the background
    let reaper = spawn_reaper(
        state.sessions.clone(),
        state.rate_limiter.clone(),
        reap_interval,
        rate_limit_window,
    );

    // CORS configuration
    let frontend_origins = env
        .string("FRONTEND_ORIGINS")
        .unwrap_or_else(|| DEFAULT_FRONTEND_ORIGINS.to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]));

    // Build router
    let app = Router::new()
        .nest("/api/attendance", attendance_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = env.parse_or("LISTEN_ADDR", DEFAULT_LISTEN_ADDR.parse()?)?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    reaper.abort();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
