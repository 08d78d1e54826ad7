use std::{convert::Infallible, sync::Arc, time::Duration};

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::room::RoomRepository,
    dto::sse::ServerEvent,
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        session::{CLOSED_EVENT, HostSession, SNAPSHOT_EVENT},
    },
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Host stream: the current snapshot, then every snapshot and timer tick the
/// session publishes. Ends once the session is closed.
pub async fn host_stream(
    session: Arc<HostSession>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = session.subscribe();
    let initial = ServerEvent::json(Some(SNAPSHOT_EVENT.to_owned()), &session.snapshot().await)
        .map_err(|err| warn!(error = %err, "failed to serialise initial host snapshot"))
        .ok();
    info!(room_id = %session.room_id(), "new host SSE connection");
    to_sse_stream(initial, receiver, session.room_id())
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
fn to_sse_stream(
    initial: Option<ServerEvent>,
    mut receiver: broadcast::Receiver<ServerEvent>,
    room_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(payload) = initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let closing = payload.event.as_deref() == Some(CLOSED_EVENT);
                            if tx.send(Ok(to_event(payload))).await.is_err() || closing {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        // Snapshots are complete; the next one catches the client up.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        info!(room_id = %room_id, "host SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(keep_alive())
}

/// Public change stream of a room: a full snapshot, then bus events as they happen.
pub async fn room_stream(
    state: &SharedState,
    room_id: Uuid,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let repo = state.repository().await?;
    // Subscribe before reading so nothing written in between is missed.
    let mut subscription = state.bus().subscribe(room_id);
    let initial = snapshot_event(&repo, room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}` not found")))?;
    info!(room_id = %room_id, "new room SSE connection");

    let events = stream! {
        yield Ok::<Event, Infallible>(to_event(initial));
        loop {
            match subscription.recv().await {
                Ok(change) => {
                    if let Some(event) = sse_events::change_event(&change) {
                        yield Ok(to_event(event));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(room_id = %room_id, skipped, "room SSE stream lagged; resending snapshot");
                    match snapshot_event(&repo, room_id).await {
                        Ok(Some(event)) => {
                            yield Ok(to_event(event));
                        }
                        Ok(None) => break,
                        Err(err) => warn!(room_id = %room_id, error = %err, "snapshot reload failed"),
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(events).keep_alive(keep_alive()))
}

async fn snapshot_event(
    repo: &RoomRepository,
    room_id: Uuid,
) -> Result<Option<ServerEvent>, ServiceError> {
    let Some(room) = repo.find_room(room_id).await? else {
        return Ok(None);
    };
    let players = repo.list_players(room_id).await?;
    Ok(sse_events::room_snapshot(&room, &players))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(KEEP_ALIVE_INTERVAL)
        .text("keep-alive")
}
