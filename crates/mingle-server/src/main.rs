mod tasks;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use chrono::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use mingle_api::auth::{self, AppState, AppStateInner};
use mingle_api::middleware::require_auth;
use mingle_api::{billing, candidates, checkins, matches, profile, swipes};
use mingle_engine::config::EngineConfig;
use mingle_engine::geocell;
use mingle_engine::ledger::PassLedger;
use mingle_engine::session::SessionController;
use mingle_gateway::connection;
use mingle_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    app: AppState,
    dispatcher: Dispatcher,
    jwt_secret: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mingle=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("MINGLE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    if jwt_secret == "dev-secret-change-me" {
        warn!("MINGLE_JWT_SECRET is unset; using the dev placeholder");
    }
    let billing_secret = std::env::var("MINGLE_BILLING_SECRET").unwrap_or_default();
    if billing_secret.is_empty() {
        warn!("MINGLE_BILLING_SECRET is unset; billing webhook is disabled");
    }

    let db_path = std::env::var("MINGLE_DB_PATH").unwrap_or_else(|_| "mingle.db".into());
    let host = std::env::var("MINGLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = env_or("MINGLE_PORT", 3000);

    let engine_config = EngineConfig {
        daily_passes: env_or("MINGLE_DAILY_PASSES", 5),
        daily_match_cap: env_or("MINGLE_DAILY_MATCH_CAP", 2),
        lock_duration: Duration::seconds(env_or("MINGLE_LOCK_SECS", 7200)),
        session_duration: Duration::seconds(env_or("MINGLE_SESSION_SECS", 600)),
        checkin_ttl: Duration::seconds(env_or("MINGLE_CHECKIN_TTL_SECS", 10800)),
    };
    let sweep_secs: u64 = env_or("MINGLE_SWEEP_SECS", 15);
    let reaper_secs: u64 = env_or("MINGLE_REAPER_SECS", 300);

    // Init database
    let db = Arc::new(mingle_db::Database::open(&PathBuf::from(&db_path))?);
    maybe_seed_demo_venues(&db)?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let ledger = PassLedger::new(db.clone(), engine_config.clone());
    let sessions = SessionController::new(db.clone(), ledger.clone(), engine_config.clone());

    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
        ledger,
        sessions: sessions.clone(),
        jwt_secret: jwt_secret.clone(),
        billing_secret,
    });

    let state = ServerState {
        app: app_state.clone(),
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
    };

    // Background timers: match timeout sweep + check-in reaper
    tokio::spawn(tasks::run_session_sweep_loop(
        sessions,
        dispatcher.clone(),
        sweep_secs,
    ));
    tokio::spawn(tasks::run_reaper_loop(db.clone(), reaper_secs));

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/billing/webhook", post(billing::webhook))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/me", get(profile::me))
        .route("/me/location", put(profile::update_location))
        .route("/account", delete(profile::delete_account))
        .route("/venues/{venue_id}/checkin", post(checkins::check_in))
        .route("/checkout", post(checkins::check_out))
        .route("/candidates", get(candidates::candidates))
        .route("/swipes", post(swipes::swipe))
        .route("/matches/{match_id}", get(matches::get_match))
        .route("/matches/{match_id}/pass", post(matches::pass_match))
        .route("/matches/{match_id}/meet", post(matches::meet_match))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new().route("/gateway", get(ws_upgrade)).with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Mingle server listening on {}", addr);
    info!(
        "Engagement config: {} passes/day, cap {}, lock {}s, session {}s",
        engine_config.daily_passes,
        engine_config.daily_match_cap,
        engine_config.lock_duration.num_seconds(),
        engine_config.session_duration.num_seconds(),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.app.db.clone(), state.jwt_secret)
    })
}

/// Dev/demo convenience: a couple of venues to check into on a fresh
/// database. Real deployments manage venues through the admin surface.
fn maybe_seed_demo_venues(db: &mingle_db::Database) -> anyhow::Result<()> {
    if !env_or("MINGLE_SEED_DEMO_VENUES", false) {
        return Ok(());
    }
    if db.venue_count()? > 0 {
        return Ok(());
    }

    let demo = [
        ("The Night Owl", 40.7589, -73.9851),
        ("Harbor Lights", 40.7033, -74.0170),
    ];
    for (name, lat, lng) in demo {
        let id = Uuid::new_v4().to_string();
        let cell = geocell::encode(lat, lng, geocell::PRECISION);
        db.create_venue(&id, name, lat, lng, &cell)?;
        info!("Seeded demo venue '{}' ({})", name, id);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
