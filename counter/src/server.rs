//! Websocket transport
//!
//! `GET /ws/detect` upgrades to a websocket and runs one [`Session`] for the
//! lifetime of the connection. `GET /` reports service status.

use crate::config::ServerConfig;
use crate::detector::Detector;
use crate::error::{CounterError, Result};
use crate::session::{FrameOutcome, Inbound, Session};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Close code for "internal error" (RFC 6455)
const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Control frame payload limit minus the two code bytes
const MAX_CLOSE_REASON_BYTES: usize = 123;

/// State shared by every connection
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub detector: Arc<dyn Detector>,
    next_session_id: AtomicU64,
}

impl AppState {
    pub fn new(config: ServerConfig, detector: Arc<dyn Detector>) -> Self {
        Self {
            config: Arc::new(config),
            detector,
            next_session_id: AtomicU64::new(1),
        }
    }

    fn open_session(&self) -> Session {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        Session::new(id, Arc::clone(&self.detector), &self.config.session)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/ws/detect", get(ws_handler))
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CounterError::transport(format!("cannot bind {addr}: {e}")))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "detector": state.detector.name(),
        "association": state.config.session.tracker.association.to_string(),
    }))
}

async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut session = state.open_session();

    while let Some(msg) = socket.recv().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("session {}: receive failed: {}", session.id(), e);
                break;
            }
        };
        if let Message::Close(_) = msg {
            debug!("session {}: closed by peer", session.id());
            break;
        }
        let Some(inbound) = to_inbound(msg) else {
            continue;
        };

        match session.handle(inbound).await {
            Ok(FrameOutcome::Report(report)) => {
                let text = match serde_json::to_string(&report) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("session {}: cannot serialize report: {}", session.id(), e);
                        close_with_error(&mut socket, "report serialization failed").await;
                        break;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    debug!("session {}: peer gone before report was sent", session.id());
                    break;
                }
            }
            Ok(FrameOutcome::Skipped) => {}
            Err(e) if e.is_fatal() => {
                error!("session {}: {}", session.id(), e);
                close_with_error(&mut socket, &e.to_string()).await;
                break;
            }
            Err(e) => warn!("session {}: frame dropped: {}", session.id(), e),
        }
    }
}

/// Map a websocket message to a frame payload; control frames carry none
fn to_inbound(msg: Message) -> Option<Inbound> {
    match msg {
        Message::Text(text) => Some(Inbound::Text(text)),
        Message::Binary(bytes) => Some(Inbound::Binary(bytes)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

/// Longest prefix of `reason` that fits in `max_bytes`, cut at a char boundary
fn truncate_reason(reason: &str, max_bytes: usize) -> &str {
    if reason.len() <= max_bytes {
        return reason;
    }
    let end = reason
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= max_bytes)
        .last()
        .unwrap_or(0);
    &reason[..end]
}

async fn close_with_error(socket: &mut WebSocket, reason: &str) {
    let frame = CloseFrame {
        code: CLOSE_INTERNAL_ERROR,
        reason: truncate_reason(reason, MAX_CLOSE_REASON_BYTES).to_string().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("close frame not delivered: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::StubDetector;
    use crate::session::tests::{det, frame_payload, ScriptedDetector};
    use crate::types::FrameReport;
    use futures_util::{SinkExt, StreamExt};
    use ioutrack::AssociationMethod;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    fn state(config: ServerConfig) -> Arc<AppState> {
        Arc::new(AppState::new(config, Arc::new(StubDetector::new())))
    }

    #[tokio::test]
    async fn test_status_reports_detector_and_association() {
        let mut config = ServerConfig::default();
        config.session.tracker.association = AssociationMethod::Hungarian;

        let Json(body) = status(State(state(config))).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["detector"], "stub");
        assert_eq!(body["association"], "hungarian");
    }

    #[test]
    fn test_control_frames_are_not_frames() {
        assert!(matches!(to_inbound(Message::Text("abc".into())), Some(Inbound::Text(_))));
        assert!(matches!(to_inbound(Message::Binary(vec![1, 2])), Some(Inbound::Binary(_))));
        assert!(to_inbound(Message::Ping(vec![])).is_none());
        assert!(to_inbound(Message::Pong(vec![])).is_none());
        assert!(to_inbound(Message::Close(None)).is_none());
    }

    #[test]
    fn test_session_ids_are_sequential() {
        let state = state(ServerConfig::default());
        assert_eq!(state.open_session().id(), 1);
        assert_eq!(state.open_session().id(), 2);
    }

    #[test]
    fn test_close_reason_fits_byte_budget() {
        assert_eq!(truncate_reason("detector down", MAX_CLOSE_REASON_BYTES), "detector down");

        let long = "é".repeat(100);
        let cut = truncate_reason(&long, MAX_CLOSE_REASON_BYTES);
        assert_eq!(cut.len(), 122);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    async fn serve_on_ephemeral_port(state: Arc<AppState>) -> Client {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });

        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/detect"))
            .await
            .unwrap();
        client
    }

    /// Next data or close message, skipping pongs
    async fn next_message(client: &mut Client) -> WsMessage {
        loop {
            match client.next().await {
                Some(Ok(WsMessage::Pong(_) | WsMessage::Ping(_))) => continue,
                Some(Ok(msg)) => return msg,
                other => panic!("connection ended unexpectedly: {other:?}"),
            }
        }
    }

    async fn next_report(client: &mut Client) -> FrameReport {
        match next_message(client).await {
            WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a report, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_replies_per_frame_then_closes_on_fatal_error() {
        let car = det(10.0, 10.0, 50.0, 50.0, "car");
        let truck = det(200.0, 100.0, 260.0, 150.0, "truck");
        let detector = ScriptedDetector::new(vec![
            Ok(vec![car.clone()]),
            Ok(vec![car, truck]),
            Err(CounterError::detector("device lost")),
            Err(CounterError::detector("device lost")),
        ]);
        let mut config = ServerConfig::default();
        config.session.max_detector_failures = 2;
        let state = Arc::new(AppState::new(config, detector.clone()));
        let mut client = serve_on_ephemeral_port(state).await;

        client.send(WsMessage::Text(frame_payload())).await.unwrap();
        let first = next_report(&mut client).await;
        assert_eq!(first.detections.len(), 1);
        assert_eq!(first.detections[0].id, "car_1");

        // neither is a frame on a base64 connection
        client.send(WsMessage::Binary(vec![1, 2, 3])).await.unwrap();
        client.send(WsMessage::Ping(vec![7])).await.unwrap();

        client.send(WsMessage::Text(frame_payload())).await.unwrap();
        let second = next_report(&mut client).await;
        assert_eq!(second.detections.len(), 2);
        assert_eq!(second.stats.trucks, 1);
        assert_eq!(detector.calls(), 2);

        // first failure ages the tracks and still replies
        client.send(WsMessage::Text(frame_payload())).await.unwrap();
        let third = next_report(&mut client).await;
        assert_eq!(third.stats.cars, 1);
        assert_eq!(third.stats.trucks, 1);

        client.send(WsMessage::Text(frame_payload())).await.unwrap();
        match next_message(&mut client).await {
            WsMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), CLOSE_INTERNAL_ERROR);
                assert!(frame.reason.contains("2 consecutive failures"));
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
    }
}
