/// WebSocket event stream from the game client.
///
/// A stream task owns the socket for one connection attempt: it connects,
/// subscribes to the two topics the companion follows, and forwards decoded
/// frames to the controller. It never reconnects on its own. When the socket
/// ends it posts `StreamClosed` and exits; [`ReconnectPolicy`] decides what
/// the controller does next.
use futures_util::{SinkExt, StreamExt};
use rustls::ClientConfig;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::event::{CompanionEvent, SessionId};
use crate::lcu::{ChampSelectSession, GameflowPhase};
use crate::lockfile::ConnectionInfo;

pub const CHAMP_SELECT_TOPIC: &str = "OnJsonApiEvent_lol-champ-select_v1_session";
pub const GAMEFLOW_TOPIC: &str = "OnJsonApiEvent_lol-gameflow_v1_gameflow-phase";
pub const CHAMP_SELECT_URI: &str = "/lol-champ-select/v1/session";
pub const GAMEFLOW_URI: &str = "/lol-gameflow/v1/gameflow-phase";

const SUBSCRIBED_TOPICS: [&str; 2] = [CHAMP_SELECT_TOPIC, GAMEFLOW_TOPIC];
/// WAMP opcode for "subscribe" in the client's event protocol.
const SUBSCRIBE_OPCODE: u8 = 5;
const CONNECT_TIMEOUT_SECS: u64 = 10;

type LcuSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("invalid credential header")]
    Credential,
    #[error("send failed: {0}")]
    Send(#[source] tungstenite::Error),
    #[error("read failed: {0}")]
    Read(#[source] tungstenite::Error),
    #[error("frame is not JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a [type, topic, payload] array")]
    Shape,
}

/// A change to one of the subscribed resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LcuEvent {
    /// `None` when the session was deleted (champion select ended).
    ChampSelect(Option<ChampSelectSession>),
    GameflowPhase(GameflowPhase),
}

pub fn subscribe_frame(topic: &str) -> String {
    serde_json::json!([SUBSCRIBE_OPCODE, topic]).to_string()
}

/// Decodes one text frame. `Ok(None)` for frames about resources the
/// companion does not follow, and for the empty frames the client sends.
pub fn decode_frame(text: &str) -> Result<Option<LcuEvent>, StreamError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let frame: Value = serde_json::from_str(text)?;
    let payload = match frame.as_array() {
        Some(items) if items.len() == 3 => &items[2],
        _ => return Err(StreamError::Shape),
    };
    let Some(uri) = payload.get("uri").and_then(Value::as_str) else {
        return Ok(None);
    };
    let data = payload.get("data").cloned().unwrap_or(Value::Null);
    match uri {
        CHAMP_SELECT_URI => Ok(Some(LcuEvent::ChampSelect(serde_json::from_value(data)?))),
        GAMEFLOW_URI => Ok(Some(LcuEvent::GameflowPhase(serde_json::from_value(data)?))),
        _ => Ok(None),
    }
}

// ── Reconnect policy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reopen with the same connection info.
    Retry { attempt: u32 },
    /// Give up on this connection info and rediscover the client.
    Exhausted,
}

/// Counts consecutive closes without a successful open. Delays are constant
/// per tier; there is no exponential backoff.
#[derive(Debug)]
pub struct ReconnectPolicy {
    attempts: u32,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    #[cfg(test)]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts.max(1);
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    pub fn on_close(&mut self) -> ReconnectDecision {
        self.attempts += 1;
        if self.attempts < self.max_attempts {
            ReconnectDecision::Retry {
                attempt: self.attempts,
            }
        } else {
            self.attempts = 0;
            ReconnectDecision::Exhausted
        }
    }
}

// ── Stream task ───────────────────────────────────────────────────────────────

/// Handle to a running stream task. Dropping it closes the socket.
pub struct StreamHandle {
    session: SessionId,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Sends a close frame (if connected) and waits for the task to exit.
    /// No `StreamClosed` event is posted for a local close.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

/// Spawns a task that waits `delay`, then opens the stream for `session`.
pub fn spawn(
    session: SessionId,
    connection: ConnectionInfo,
    tls: Arc<ClientConfig>,
    tx: mpsc::Sender<CompanionEvent>,
    delay: Duration,
) -> StreamHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run(session, connection, tls, tx, delay, shutdown_rx));
    StreamHandle {
        session,
        shutdown_tx,
        task,
    }
}

async fn connect(connection: &ConnectionInfo, tls: Arc<ClientConfig>) -> Result<LcuSocket, StreamError> {
    let mut request = connection
        .stream_url()
        .into_client_request()
        .map_err(StreamError::Connect)?;
    let mut auth =
        HeaderValue::from_str(&connection.basic_auth()).map_err(|_| StreamError::Credential)?;
    auth.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, auth);

    let connecting = tokio_tungstenite::connect_async_tls_with_config(
        request,
        None,
        false,
        Some(Connector::Rustls(tls)),
    );
    let (socket, _response) = tokio::time::timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), connecting)
        .await
        .map_err(|_| StreamError::ConnectTimeout)?
        .map_err(StreamError::Connect)?;
    Ok(socket)
}

/// Posts `event` unless the handle asks the task to stop first. `false` means
/// the task should exit: either the controller is gone or a local close
/// arrived, and `shutdown_rx` must not be polled again.
async fn post(
    tx: &mpsc::Sender<CompanionEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    event: CompanionEvent,
) -> bool {
    tokio::select! {
        sent = tx.send(event) => sent.is_ok(),
        _ = shutdown_rx => false,
    }
}

async fn report_failure(
    tx: &mpsc::Sender<CompanionEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    session: SessionId,
    err: StreamError,
) {
    warn!(%session, error = %err, "event stream error");
    if post(tx, shutdown_rx, CompanionEvent::StreamError(session, err.to_string())).await {
        post(tx, shutdown_rx, CompanionEvent::StreamClosed(session)).await;
    }
}

async fn run(
    session: SessionId,
    connection: ConnectionInfo,
    tls: Arc<ClientConfig>,
    tx: mpsc::Sender<CompanionEvent>,
    delay: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    if !delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => return,
        }
    }

    let connected = tokio::select! {
        connected = connect(&connection, tls) => connected,
        _ = &mut shutdown_rx => return,
    };
    let mut socket = match connected {
        Ok(socket) => socket,
        Err(e) => {
            report_failure(&tx, &mut shutdown_rx, session, e).await;
            return;
        }
    };
    info!(%session, port = connection.port, "event stream connected");
    if !post(&tx, &mut shutdown_rx, CompanionEvent::StreamOpened(session)).await {
        return;
    }

    for topic in SUBSCRIBED_TOPICS {
        if let Err(e) = socket.send(Message::Text(subscribe_frame(topic))).await {
            report_failure(&tx, &mut shutdown_rx, session, StreamError::Send(e)).await;
            return;
        }
        debug!(%session, topic, "subscribed");
    }

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                let _ = socket.close(None).await;
                debug!(%session, "event stream closed locally");
                return;
            }
            next = socket.next() => match next {
                Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                    Ok(Some(event)) => {
                        let event = CompanionEvent::StreamEvent(session, event);
                        if !post(&tx, &mut shutdown_rx, event).await {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(%session, error = %e, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let err = StreamError::Read(e);
                    warn!(%session, error = %err, "event stream error");
                    let event = CompanionEvent::StreamError(session, err.to_string());
                    if !post(&tx, &mut shutdown_rx, event).await {
                        return;
                    }
                    break;
                }
            },
        }
    }

    info!(%session, "event stream closed by peer");
    post(&tx, &mut shutdown_rx, CompanionEvent::StreamClosed(session)).await;
}
