//! WebSocket upgrade + message loop. Each client message is parsed as JSON.
//! `ping` gets a single reply; `draft_questions` streams one `unit_status` per
//! unit transition and finishes with `questions_done`.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{info, error, instrument, debug, warn};

use crate::logic::run_drafting;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "examgen_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Serialize and send; false when the socket is gone.
async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "examgen_backend", error = %e, "WS send error");
      false
    }
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "examgen_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let open = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "examgen_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &mut socket, &state).await
          }
          Err(e) => send(&mut socket, &ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }).await,
        };
        if !open {
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "examgen_backend", "WebSocket disconnected");
}

/// Returns false when the socket should be closed.
async fn handle_client_ws(msg: ClientWsMessage, socket: &mut WebSocket, state: &Arc<AppState>) -> bool {
  match msg {
    ClientWsMessage::Ping => send(socket, &ServerWsMessage::Pong).await,

    ClientWsMessage::DraftQuestions { session_id } => {
      let mut rx = draft_events(state.clone(), session_id);
      while let Some(event) = rx.recv().await {
        if !send(socket, &event).await {
          return false;
        }
      }
      true
    }
  }
}

/// Start a drafting pass on its own task and hand back its event stream. A
/// dropped receiver stops the stream, not the drafting, and results stay on
/// the session. A rejected pass yields a single `error` event.
fn draft_events(state: Arc<AppState>, session_id: String) -> mpsc::UnboundedReceiver<ServerWsMessage> {
  let (tx, rx) = mpsc::unbounded_channel();
  let err_tx = tx.clone();
  tokio::spawn(async move {
    if let Err(e) = run_drafting(&state, &session_id, Some(tx)).await {
      warn!(target: "wizard", session = %session_id, error = %e, "WS drafting rejected");
      let _ = err_tx.send(ServerWsMessage::Error { message: e.to_string() });
    }
  });
  rx
}
