//! Realtime gateway: one task per client socket, translating wire commands
//! into coordinator calls and fanning events back out.
//!
//! Each socket gets a writer task fed by an unbounded channel, so broadcasts
//! never block on a slow client. A connection holds no session state of its
//! own beyond the identity it authenticated as; everything else lives in the
//! registry.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{AuthPayload, ClientMessage, Identity, ServerMessage, UserView},
    error::MatchError,
    services::match_service,
    state::{SharedState, WsConnection, session::Session},
};
use validator::Validate;

/// Drive one client connection until it closes.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    state.connections().insert(
        connection_id,
        WsConnection {
            id: connection_id,
            tx: tx.clone(),
        },
    );
    debug!(%connection_id, "client connected");

    let mut identity: Option<Identity> = None;

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%connection_id, error = %err, "socket read failed");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                let command = match ClientMessage::from_json_str(text.as_str()) {
                    Ok(command) => command,
                    Err(err) => {
                        send(&tx, &ServerMessage::Error {
                            message: format!("malformed message: {err}"),
                        });
                        continue;
                    }
                };
                if let Err(err) =
                    dispatch(&state, connection_id, &tx, &mut identity, command).await
                {
                    send(&tx, &ServerMessage::Error {
                        message: err.to_string(),
                    });
                }
            }
            Message::Ping(payload) => {
                let _ = tx.send(Message::Pong(payload));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.connections().remove(&connection_id);
    if let Some(identity) = &identity {
        handle_disconnect(&state, connection_id, identity).await;
    }
    drop(tx);
    let _ = writer.await;
    debug!(%connection_id, "client disconnected");
}

/// Route one authenticated (or authenticating) command.
async fn dispatch(
    state: &SharedState,
    connection_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    identity: &mut Option<Identity>,
    command: ClientMessage,
) -> Result<(), MatchError> {
    if let ClientMessage::Authenticate { payload } = command {
        authenticate(state, tx, identity, payload).await;
        return Ok(());
    }

    let Some(identity) = identity.as_ref() else {
        return Err(MatchError::NotAuthenticated);
    };

    match command {
        ClientMessage::Authenticate { .. } => {}
        ClientMessage::CreateMatch { quiz_id } => {
            let (handle, join_code) = match_service::create_match(
                state,
                identity,
                crate::state::session::MatchKind::Multiplayer,
                quiz_id,
                Some(connection_id),
                None,
            )
            .await?;
            send(tx, &ServerMessage::MatchCreated {
                match_id: handle.id,
                join_code,
            });
        }
        ClientMessage::CreateSoloMatch {
            quiz_id,
            opponent_id,
        } => {
            let (handle, _) = match_service::create_match(
                state,
                identity,
                crate::state::session::MatchKind::Solo,
                quiz_id,
                Some(connection_id),
                opponent_id,
            )
            .await?;
            send(tx, &ServerMessage::MatchCreated {
                match_id: handle.id,
                join_code: None,
            });
        }
        ClientMessage::CreateFriendMatch { quiz_id } => {
            let (handle, join_code) = match_service::create_match(
                state,
                identity,
                crate::state::session::MatchKind::Friend1v1,
                quiz_id,
                Some(connection_id),
                None,
            )
            .await?;
            let join_code = join_code.ok_or_else(|| {
                MatchError::InvalidState("friend match created without a join code".into())
            })?;
            send(tx, &ServerMessage::FriendMatchCreated {
                match_id: handle.id,
                join_code,
            });
        }
        ClientMessage::JoinMatch { join_code } => {
            let (handle, players) =
                match_service::join_by_code(state, identity, &join_code, Some(connection_id))
                    .await?;
            send(tx, &ServerMessage::MatchJoined {
                match_id: handle.id,
                players: players.clone(),
            });
            let session = handle.lock().await;
            broadcast_to_session(state, &session, &ServerMessage::PlayerListUpdated { players });
        }
        ClientMessage::ConnectToMatch { match_id } => {
            let (handle, players) =
                match_service::connect_to_match(state, identity, match_id, Some(connection_id))
                    .await?;
            send(tx, &ServerMessage::MatchConnected {
                match_id: handle.id,
                players: players.clone(),
            });
            let session = handle.lock().await;
            broadcast_to_session(state, &session, &ServerMessage::PlayerListUpdated { players });
        }
        ClientMessage::PlayerReady { ready } => {
            match_service::set_ready(state, identity, ready.unwrap_or(true)).await?;
        }
        ClientMessage::SubmitAnswer {
            question_id,
            selected_options,
            time_spent,
        } => {
            // The private answer_result is delivered by the coordinator under
            // the session lock, so it reaches the submitter before any
            // next_question/match_completed broadcast of the same submission.
            match_service::submit_answer(
                state,
                identity,
                question_id,
                selected_options,
                time_spent,
            )
            .await?;
        }
        ClientMessage::Unknown => {
            send(tx, &ServerMessage::Error {
                message: "unsupported message type".into(),
            });
        }
    }
    Ok(())
}

/// Resolve an `authenticate` command. Failures answer with `auth_error` and
/// leave the connection unauthenticated; they are never fatal to the socket.
async fn authenticate(
    state: &SharedState,
    tx: &mpsc::UnboundedSender<Message>,
    identity: &mut Option<Identity>,
    payload: AuthPayload,
) {
    let resolved = match payload {
        AuthPayload::Token(token) => match state.content().resolve_token(token).await {
            Ok(Some(user)) if user.is_active => Ok(Identity::from(user)),
            Ok(Some(_)) => Err("account is deactivated".to_string()),
            Ok(None) => Err("invalid or expired token".to_string()),
            Err(err) => {
                warn!(error = %err, "token resolution failed");
                Err("identity backend unavailable".to_string())
            }
        },
        AuthPayload::Direct(direct) => match direct.validate() {
            Ok(()) => Ok(Identity::from(direct)),
            Err(err) => Err(format!("invalid identity payload: {err}")),
        },
    };

    match resolved {
        Ok(resolved) => {
            info!(user_id = resolved.user_id, username = %resolved.username, "authenticated");
            send(tx, &ServerMessage::Authenticated {
                user: UserView::from(&resolved),
            });
            *identity = Some(resolved);
        }
        Err(message) => send(tx, &ServerMessage::AuthError { message }),
    }
}

/// Detach a dropped connection from its session and tell the room. The player
/// stays registered so they can reconnect.
async fn handle_disconnect(state: &SharedState, connection_id: Uuid, identity: &Identity) {
    let Some(handle) = state.registry().get_by_user(identity.user_id) else {
        return;
    };
    let mut session = handle.lock().await;
    let Some(player) = session.drop_connection(connection_id) else {
        // A newer connection already took over this player.
        return;
    };
    let event = ServerMessage::PlayerDisconnected {
        user_id: player.user_id,
        username: player.display_name.clone(),
    };
    broadcast_to_session(state, &session, &event);
}

/// Push an event to one connection's writer task.
pub(crate) fn send(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(encoded) => {
            let _ = tx.send(Message::Text(encoded.into()));
        }
        Err(err) => warn!(error = %err, "failed to encode server message"),
    }
}

/// Push an event to one specific connection, if it is still registered.
pub(crate) fn send_to_connection(
    state: &SharedState,
    connection_id: Uuid,
    message: &ServerMessage,
) {
    if let Some(connection) = state.connections().get(&connection_id) {
        send(&connection.tx, message);
    }
}

/// Push an event to every connected member of a session.
pub(crate) fn broadcast_to_session(state: &SharedState, session: &Session, message: &ServerMessage) {
    let encoded = match serde_json::to_string(message) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(error = %err, "failed to encode server message");
            return;
        }
    };
    for player in session.players.values() {
        let Some(connection_id) = player.connection else {
            continue;
        };
        if let Some(connection) = state.connections().get(&connection_id) {
            let _ = connection.tx.send(Message::Text(encoded.clone().into()));
        }
    }
}
