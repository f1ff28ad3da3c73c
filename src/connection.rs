use crate::{
    error::SessionError,
    group::{GroupId, Player, PlayerId},
    state::ServerState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use game_group_protocol::{ClientEvent, ServerEvent};
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    player_id: Option<PlayerId>,
}

/// `GET /ws?player_id=<uuid>`
pub async fn ws_handler(
    State(state): State<ServerState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(player_id) = params.player_id else {
        return (StatusCode::UNAUTHORIZED, "Missing player_id").into_response();
    };

    let player = match state.store.get_players_by_ids(&[player_id]).await {
        Ok(players) => match players.into_iter().next() {
            Some(player) => player,
            None => return (StatusCode::NOT_FOUND, "Unknown player").into_response(),
        },
        Err(e) => {
            error!(%player_id, "failed to load player: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "Roster store unavailable").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, player))
}

/// The group a connection currently follows.
struct Subscription {
    group_id: GroupId,
    events: BroadcastStream<Arc<ServerEvent>>,
}

impl Subscription {
    fn follow(state: &ServerState, group_id: GroupId) -> Self {
        Self {
            group_id,
            events: BroadcastStream::new(state.gateway.subscribe(group_id)),
        }
    }

    fn release(self, state: &ServerState) {
        let group_id = self.group_id;
        drop(self.events);
        state.gateway.release(group_id);
    }
}

async fn next_broadcast(
    subscription: &mut Option<Subscription>,
) -> Option<Result<Arc<ServerEvent>, BroadcastStreamRecvError>> {
    match subscription {
        Some(subscription) => subscription.events.next().await,
        None => std::future::pending().await,
    }
}

async fn send(sink: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> bool {
    match sink.send(Message::Text(event.to_string())).await {
        Ok(()) => true,
        Err(e) => {
            debug!("failed to send {}: {e}", event.name());
            false
        }
    }
}

fn rejection(err: &SessionError) -> ServerEvent {
    ServerEvent::error(err.code(), err.to_string())
}

async fn handle_socket(socket: WebSocket, state: ServerState, player: Player) {
    let player_id = player.id;
    info!(%player_id, username = %player.username, "connection opened");

    let (mut sink, mut stream) = socket.split();
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%player_id, "connection closed by client");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(%player_id, "unrecoverable socket error: {e:?}");
                        break;
                    }
                };

                let event = match text.parse::<ClientEvent>() {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(%player_id, "malformed event: {e}");
                        if !send(&mut sink, &ServerEvent::error("bad_request", e.to_string())).await {
                            break;
                        }
                        continue;
                    }
                };
                debug!(%player_id, event = event.name(), group_id = %event.group_id(), "inbound event");

                let reply = match event {
                    ClientEvent::JoinGroup { group_id } => {
                        if subscription.as_ref().map(|s| s.group_id) != Some(group_id) {
                            if let Some(previous) = subscription.take() {
                                previous.release(&state);
                            }
                            subscription = Some(Subscription::follow(&state, group_id));
                        }
                        match state.coordinator.join(group_id, player_id).await {
                            Ok(group) => Some(ServerEvent::JoinedGroup { group }),
                            Err(err) => {
                                if matches!(err, SessionError::NotFound(_)) {
                                    if let Some(unknown) = subscription.take() {
                                        unknown.release(&state);
                                    }
                                }
                                Some(rejection(&err))
                            }
                        }
                    }
                    ClientEvent::UpdateScore { group_id, delta } => state
                        .coordinator
                        .update_score(group_id, player_id, delta)
                        .await
                        .err()
                        .map(|err| rejection(&err)),
                };

                if let Some(reply) = reply {
                    if !send(&mut sink, &reply).await {
                        break;
                    }
                }
            }
            Some(broadcast) = next_broadcast(&mut subscription) => {
                match broadcast {
                    Ok(event) => {
                        if !send(&mut sink, &event).await {
                            break;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(%player_id, skipped, "connection lagged behind group events");
                    }
                }
            }
        }
    }

    if let Some(subscription) = subscription.take() {
        subscription.release(&state);
    }
    info!(%player_id, "connection finished");
}
