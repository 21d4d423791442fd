use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::adapters::http::state::HttpState;
use crate::domain::stream::WsFrameMetaMessage;

pub async fn ws_handler(ws: WebSocketUpgrade, State(st): State<HttpState>) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, st))
}

/// Metadatos de todas las cámaras activas, un mensaje por frame emitido.
async fn handle_socket(mut socket: WebSocket, st: HttpState) {
    let mut rx = st.monitor.subscribe();

    loop {
        let meta = match rx.recv().await {
            Ok(meta) => meta,
            Err(RecvError::Lagged(n)) => {
                debug!("WebSocket lento, {} mensajes descartados", n);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let json = serde_json::to_string(&WsFrameMetaMessage { r#type: "frame".into(), meta }).unwrap_or_default();
        if socket.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}
