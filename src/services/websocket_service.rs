use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitStream};
use thiserror::Error;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::room::RoomRepository,
    dto::{
        player::PlayerWriteRequest,
        room::RoomSnapshot,
        ws::{PlayerInboundMessage, PlayerOutboundMessage},
    },
    error::ServiceError,
    services::player_service,
    state::{
        SharedState,
        bus::{ChangeEvent, Subscription},
    },
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures that end a player socket.
#[derive(Debug, Error)]
enum SocketError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// The device has no seat in the room.
    #[error("device `{0}` has no seat in this room; join first")]
    NoSeat(String),
    /// Error from persistence or state management operations.
    #[error("{0}")]
    Service(#[from] ServiceError),
}

/// A player connection after identification.
struct PlayerLink {
    room_id: Uuid,
    player_id: Uuid,
    device_id: String,
    tx: mpsc::UnboundedSender<Message>,
}

/// Handle the full lifecycle of a player WebSocket attached to `room_id`.
pub async fn handle_socket(state: SharedState, room_id: Uuid, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let Some(device_id) = await_identification(&mut receiver, &outbound_tx).await else {
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let (link, mut subscription) = match attach(&state, room_id, device_id, &outbound_tx).await {
        Ok(attached) => attached,
        Err(err) => {
            warn!(room_id = %room_id, error = %err, "player socket refused");
            let _ = send_message(
                &outbound_tx,
                &PlayerOutboundMessage::Error {
                    message: err.to_string(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let presence = state.presence().track(room_id, link.device_id.clone());
    info!(room_id = %room_id, player_id = %link.player_id, "player connected");

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                let Some(message) = inbound else { break };
                match message {
                    Ok(Message::Text(text)) => {
                        if let Err(err) = handle_text(&state, &link, &text).await {
                            warn!(player_id = %link.player_id, error = %err, "player message failed");
                            if matches!(err, SocketError::ConnectionClosed) {
                                break;
                            }
                            if send_message(&link.tx, &PlayerOutboundMessage::Error { message: err.to_string() }).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        let _ = link.tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(frame)) => {
                        info!(player_id = %link.player_id, "player closed");
                        let _ = link.tx.send(Message::Close(frame));
                        break;
                    }
                    Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
                    Err(err) => {
                        warn!(player_id = %link.player_id, error = %err, "websocket error");
                        break;
                    }
                }
            }
            change = subscription.recv() => {
                let forwarded = match change {
                    Ok(event) => forward_change(&link, event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(player_id = %link.player_id, skipped, "player socket lagged; resending snapshot");
                        match state.repository().await {
                            Ok(repo) => send_welcome(&repo, &link).await,
                            Err(err) => Err(err.into()),
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Err(err) = forwarded {
                    if matches!(err, SocketError::ConnectionClosed) {
                        break;
                    }
                    warn!(player_id = %link.player_id, error = %err, "failed to push change to player");
                }
            }
        }
    }

    info!(room_id = %room_id, player_id = %link.player_id, "player disconnected");
    drop(presence);
    drop(link);
    finalize(writer_task, outbound_tx).await;
}

/// Wait for the identification frame, closing the socket on anything else.
async fn await_identification(
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Option<String> {
    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => return None,
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            return None;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            return None;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            return None;
        }
    };

    match PlayerInboundMessage::from_json_str(&initial_message) {
        Ok(PlayerInboundMessage::Identification { device_id }) if !device_id.is_empty() => {
            Some(device_id)
        }
        Ok(_) => {
            warn!("first message was not identification");
            let _ = outbound_tx.send(Message::Close(None));
            None
        }
        Err(err) => {
            warn!(error = %err, "failed to parse player message");
            let _ = outbound_tx.send(Message::Close(None));
            None
        }
    }
}

/// Resolve the device's seat, open the room subscription and send the welcome snapshot.
async fn attach(
    state: &SharedState,
    room_id: Uuid,
    device_id: String,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Result<(PlayerLink, Subscription), SocketError> {
    let repo = state.repository().await?;
    // Subscribe before the snapshot read so no change slips between them.
    let subscription = state.bus().subscribe(room_id);
    let seat = repo
        .find_player_by_device(room_id, &device_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| SocketError::NoSeat(device_id.clone()))?;

    let link = PlayerLink {
        room_id,
        player_id: seat.id,
        device_id,
        tx: outbound_tx.clone(),
    };
    send_welcome(&repo, &link).await?;
    Ok((link, subscription))
}

async fn send_welcome(repo: &RoomRepository, link: &PlayerLink) -> Result<(), SocketError> {
    let room = repo
        .find_room(link.room_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{}` not found", link.room_id)))?;
    let players = repo
        .list_players(link.room_id)
        .await
        .map_err(ServiceError::from)?;
    send_message(
        &link.tx,
        &PlayerOutboundMessage::Welcome {
            player_id: link.player_id,
            snapshot: RoomSnapshot::new(&room, &players),
        },
    )
}

async fn handle_text(state: &SharedState, link: &PlayerLink, text: &str) -> Result<(), SocketError> {
    debug!(player_id = %link.player_id, payload = %text, "received player message");
    match PlayerInboundMessage::from_json_str(text) {
        Ok(PlayerInboundMessage::Answer {
            score,
            streak,
            last_answer,
        }) => {
            player_service::submit_answer(
                state,
                link.room_id,
                link.player_id,
                PlayerWriteRequest {
                    score,
                    streak,
                    last_answer,
                },
            )
            .await?;
            Ok(())
        }
        Ok(PlayerInboundMessage::Identification { .. }) => {
            warn!(player_id = %link.player_id, "ignoring duplicate identification message");
            Ok(())
        }
        Ok(PlayerInboundMessage::Unknown) => {
            warn!(player_id = %link.player_id, "ignoring unknown player message");
            Ok(())
        }
        Err(err) => Err(ServiceError::InvalidInput(format!("malformed message: {err}")).into()),
    }
}

/// Push a bus event to the player, or nothing for events players do not render.
fn forward_change(link: &PlayerLink, event: ChangeEvent) -> Result<(), SocketError> {
    let message = match event {
        ChangeEvent::RoomUpdated(room) => PlayerOutboundMessage::RoomUpdated { room: room.into() },
        ChangeEvent::PlayerJoined(player) => PlayerOutboundMessage::PlayerJoined {
            player: (&player).into(),
        },
        ChangeEvent::PlayerUpdated(player) => PlayerOutboundMessage::PlayerUpdated {
            player: (&player).into(),
        },
        ChangeEvent::PresenceSync { device_ids } => PlayerOutboundMessage::Presence { device_ids },
    };
    send_message(&link.tx, &message)
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; a closed writer is reported.
fn send_message<T>(tx: &mpsc::UnboundedSender<Message>, value: &T) -> Result<(), SocketError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SocketError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
