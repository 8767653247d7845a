use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use mingle_db::{Database, parse_ts};
use mingle_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const MAX_CHAT_BODY: usize = 2000;

/// Handle a single WebSocket connection: Identify handshake, Ready, then
/// the event/command loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (user_id, username) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    // Resolve the display name; a deleted account can still hold a valid
    // token, in which case there is nothing to connect to.
    let lookup_db = db.clone();
    let uid = user_id.to_string();
    let display_name = match tokio::task::spawn_blocking(move || lookup_db.get_user_by_id(&uid))
        .await
    {
        Ok(Ok(Some(row))) => row.display_name,
        Ok(Ok(None)) => {
            warn!("{} identified but has no profile, closing", user_id);
            return;
        }
        Ok(Err(e)) => {
            warn!("Profile lookup failed for {}: {}", user_id, e);
            return;
        }
        Err(e) => {
            warn!("spawn_blocking join error: {}", e);
            return;
        }
    };

    info!("{} ({}) connected to gateway", username, user_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id,
        display_name: display_name.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, db, user_id, display_name).await;
}

async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    display_name: String,
) {
    // Register per-user channel, then go online
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;
    dispatcher.user_online(user_id, display_name.clone()).await;

    // Subscribe to broadcasts and relay to this client
    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_clone = dispatcher.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let name_recv = display_name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_clone, &db, user_id, &name_recv, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", display_name, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use mingle_types::api::Claims;

    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.username));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user_id: Uuid,
    display_name: &str,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::ChatSend { match_id, body } => {
            if body.is_empty() || body.len() > MAX_CHAT_BODY {
                warn!("{} ({}) chat body out of bounds, dropping", display_name, user_id);
                return;
            }

            let db = db.clone();
            let id_s = match_id.to_string();
            let row = match tokio::task::spawn_blocking(move || db.get_match(&id_s)).await {
                Ok(Ok(row)) => row,
                Ok(Err(e)) => {
                    warn!("Chat lookup failed for match {}: {}", match_id, e);
                    return;
                }
                Err(e) => {
                    warn!("spawn_blocking join error: {}", e);
                    return;
                }
            };

            let Some(row) = row else {
                return;
            };

            // Chat rides the session window: live statuses only, and the
            // meet flow does not extend the deadline
            let now = Utc::now();
            let live = matches!(row.status.as_str(), "active" | "meet")
                && parse_ts(&row.expires_at) > now;
            if !live {
                return;
            }

            let uid = user_id.to_string();
            let partner = if row.user_a == uid {
                row.user_b.clone()
            } else if row.user_b == uid {
                row.user_a.clone()
            } else {
                warn!("{} ({}) sent chat for a match they are not in", display_name, user_id);
                return;
            };

            let Ok(partner_id) = partner.parse::<Uuid>() else {
                warn!("Corrupt participant id '{}' on match {}", partner, match_id);
                return;
            };

            dispatcher
                .send_to_user(
                    partner_id,
                    GatewayEvent::ChatMessage {
                        match_id,
                        from_user_id: user_id,
                        body,
                        sent_at: now,
                    },
                )
                .await;
        }
    }
}
