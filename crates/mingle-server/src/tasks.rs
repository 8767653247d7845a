//! Background timer loops: the match timeout sweep and the check-in
//! expiry reaper. Both recompute from absolute timestamps each tick and
//! coordinate with user actions only through conditional writes, so they
//! are safe to run alongside any number of live clients.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use mingle_db::Database;
use mingle_engine::reaper;
use mingle_engine::session::SessionController;
use mingle_gateway::dispatcher::Dispatcher;
use mingle_types::events::GatewayEvent;

/// Resolve expired match sessions and notify both participants.
pub async fn run_session_sweep_loop(
    sessions: SessionController,
    dispatcher: Dispatcher,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        let now = Utc::now();

        let s = sessions.clone();
        match tokio::task::spawn_blocking(move || s.sweep_expired(now)).await {
            Ok(Ok(resolved)) => {
                if !resolved.is_empty() {
                    info!("Session sweep timed out {} matches", resolved.len());
                }
                for m in resolved {
                    let event = GatewayEvent::MatchResolved {
                        match_id: m.id,
                        status: m.status,
                        resolved_at: m.resolved_at.unwrap_or(now),
                    };
                    dispatcher.send_to_users(&[m.user_a, m.user_b], event).await;
                }
            }
            Ok(Err(e)) => warn!("Session sweep error: {}", e),
            Err(e) => warn!("Session sweep join error: {}", e),
        }
    }
}

/// Evict stale venue check-ins.
pub async fn run_reaper_loop(db: Arc<Database>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        let now = Utc::now();

        let db = db.clone();
        match tokio::task::spawn_blocking(move || reaper::sweep(&db, now)).await {
            Ok(Ok(stats)) => {
                if stats.evicted > 0 || stats.failed_venues > 0 {
                    info!(
                        "Reaper: evicted {} of {} check-ins ({} venues, {} failed)",
                        stats.evicted, stats.scanned, stats.venues, stats.failed_venues
                    );
                }
            }
            Ok(Err(e)) => warn!("Reaper error: {}", e),
            Err(e) => warn!("Reaper join error: {}", e),
        }
    }
}
