use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use mingle_types::events::GatewayEvent;

/// Manages all connected clients and delivers engine events to them.
///
/// Match and venue events are targeted; presence updates are broadcast.
/// Clients observe match resolutions only through these events plus the
/// canonical status row — there is no client-to-client messaging.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for global events — all connected clients receive them
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Track online users: user_id -> display name
    online_users: RwLock<HashMap<Uuid, String>>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to broadcast events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Offline users simply miss
    /// the event; the store row stays canonical.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Fan a targeted event out to a set of users (venue broadcasts).
    pub async fn send_to_users(&self, user_ids: &[Uuid], event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        for user_id in user_ids {
            if let Some((_, tx)) = channels.get(user_id) {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Register a user as online.
    pub async fn user_online(&self, user_id: Uuid, display_name: String) {
        self.inner
            .online_users
            .write()
            .await
            .insert(user_id, display_name);

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            online: true,
        });
    }

    /// Register a user as offline. Only cleans up if conn_id matches.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        // Only clean up if this connection still owns the user channel
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels
                .get(&user_id)
                .map_or(false, |(cid, _)| *cid == conn_id)
        };

        if !is_current {
            // A newer connection has taken over — don't touch anything
            return;
        }

        self.inner.online_users.write().await.remove(&user_id);
        self.unregister_user_channel(user_id, conn_id).await;

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            online: false,
        });
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .await
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
