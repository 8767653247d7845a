use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MatchStatus;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, display_name: String },

    /// A mutual swipe produced a live match session
    MatchCreate {
        match_id: Uuid,
        partner_id: Uuid,
        partner_name: String,
        venue_id: Option<Uuid>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },

    /// A match session reached its terminal state. Each participant derives
    /// its own view from this single canonical status — no client-to-client
    /// agreement is assumed.
    MatchResolved {
        match_id: Uuid,
        status: MatchStatus,
        resolved_at: DateTime<Utc>,
    },

    /// In-session chat, relayed while the match is live and unexpired
    ChatMessage {
        match_id: Uuid,
        from_user_id: Uuid,
        body: String,
        sent_at: DateTime<Utc>,
    },

    /// Someone checked into a venue the recipient is present at
    VenueBroadcast {
        venue_id: Uuid,
        user_id: Uuid,
        display_name: String,
    },

    /// A user came online or went offline
    PresenceUpdate { user_id: Uuid, online: bool },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Send an in-session chat line to the match partner
    ChatSend { match_id: Uuid, body: String },
}
