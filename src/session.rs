//! The subscriber session: one instance per client connection. Owns the
//! websocket transport, dispatches inbound frames into the hub, and
//! forwards hub events back out to the client — strictly message-passing,
//! never touching hub-internal state directly.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contracts::{AccessCheck, Principal};
use crate::error::Error;
use crate::hub::HubCommand;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::AppState;

/// `GET /ws/{document_id}?token=...` — validates the credential and access
/// before the upgrade completes; auth/access failures never reach the
/// frame layer, per the error taxonomy's terminal errors.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Result<Response, Error> {
    let token = params.get("token").map(String::as_str).unwrap_or("");
    let principal = state.authenticator.validate(token).await?;

    match state.access_oracle.check_access(&principal, &document_id).await {
        AccessCheck::Granted => {}
        AccessCheck::Denied => return Err(Error::AccessDenied),
        AccessCheck::NotFound => return Err(Error::DocumentNotFound),
    }

    info!(%document_id, principal = %principal.id, "upgrading websocket");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, document_id, principal)))
}

async fn handle_socket(socket: WebSocket, state: AppState, document_id: String, principal: Principal) {
    let session_id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(state.config.outbound_queue_bound);

    let hub_tx = state.registry.sender_for(&document_id).await;
    if hub_tx
        .send(HubCommand::Subscribe {
            session_id,
            principal: principal.clone(),
            outbound: outbound_tx.clone(),
        })
        .await
        .is_err()
    {
        warn!(%document_id, %session_id, "hub channel closed before subscribe");
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound frame");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };
        match message {
            Message::Text(text) => {
                dispatch_frame(&text, session_id, &hub_tx, &outbound_tx).await;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    let _ = hub_tx.send(HubCommand::Unsubscribe { session_id }).await;
    writer.abort();
    debug!(%document_id, %session_id, "session ended");
}

async fn dispatch_frame(
    text: &str,
    session_id: Uuid,
    hub_tx: &mpsc::Sender<HubCommand>,
    outbound_tx: &mpsc::Sender<ServerFrame>,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            // InvalidFrame: log and drop, connection stays open.
            warn!(%session_id, error = %err, "dropping invalid frame");
            return;
        }
    };

    match frame {
        ClientFrame::Operation { operation } => {
            let _ = hub_tx
                .send(HubCommand::Submit {
                    session_id,
                    op: operation,
                })
                .await;
        }
        ClientFrame::CursorPosition { cursor, selection } => {
            let _ = hub_tx
                .send(HubCommand::CursorUpdate {
                    session_id,
                    cursor,
                    selection,
                })
                .await;
        }
        ClientFrame::Ping {} => {
            let _ = outbound_tx.try_send(ServerFrame::Pong {});
        }
    }
}
