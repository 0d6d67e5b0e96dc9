//! WebSocket connection to the controller service
//!
//! A [`Connection`] owns a background task that holds the socket. Decoded
//! inbound events are forwarded, in server order, over a bounded mpsc
//! channel; outbound frames travel the other way over a command channel.
//!
//! ```text
//!   Connection                         background task
//!   send()  ──── ClientCommand ────▶   ws sink
//!   recv()  ◀─── InboundEvent  ─────   ws stream + Decoder
//! ```
//!
//! Unexpected drops are retried with exponential backoff. When the task
//! gives up, the event channel closes and `recv()` returns `None`.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, TransportError};
use crate::events::InboundEvent;

use super::protocol::{Decoder, OutboundFrame};

/// Initial reconnection backoff duration.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum reconnection backoff duration (cap).
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Capacity of the command channel.
const CMD_CHANNEL_CAPACITY: usize = 8;

/// Capacity of the event channel. Status frames arrive at ~20 Hz during effects.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `close()` waits for the task to finish the Close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Current state of the underlying socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not attempting to connect.
    Disconnected,
    /// Initial connection attempt in progress.
    Connecting,
    /// Connected and exchanging frames.
    Connected,
    /// Connection lost; background task is retrying.
    Reconnecting { attempt: u32 },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {attempt})")
            }
        }
    }
}

/// Messages from the public API to the background task
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClientCommand {
    Send(OutboundFrame),
    Disconnect,
}

/// The single live link to the controller service
pub struct Connection {
    cmd_tx: mpsc::Sender<ClientCommand>,
    event_rx: mpsc::Receiver<InboundEvent>,
    state: Arc<RwLock<ConnectionState>>,
    /// Background I/O task; `None` for in-memory test connections
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.connection_state())
            .finish()
    }
}

impl Connection {
    /// Connect to `endpoint` and spawn the background I/O task.
    ///
    /// The first connection attempt happens before returning, so callers
    /// learn immediately whether the endpoint is reachable.
    pub async fn open(
        endpoint: &str,
        decoder: Decoder,
        max_reconnect_attempts: u32,
    ) -> Result<Self, TransportError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));

        info!(endpoint, "connecting to controller service");
        let ws_stream = connect_ws(endpoint).await?;
        set_state(&state, ConnectionState::Connected);

        let task = ClientTask {
            endpoint: endpoint.to_string(),
            decoder,
            max_reconnect_attempts,
            cmd_rx,
            event_tx,
            state: Arc::clone(&state),
        };
        let task = tokio::spawn(run_client_task(task, ws_stream));

        Ok(Self {
            cmd_tx,
            event_rx,
            state,
            task: Some(task),
        })
    }

    /// Queue an outbound frame without waiting for it to be written.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.cmd_tx
            .try_send(ClientCommand::Send(frame))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    /// Wait for the next inbound event.
    ///
    /// Returns `None` once the background task has exited or after `close()`.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.event_rx.recv().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Stop delivering events and wait for the task to send its Close frame.
    ///
    /// Events already queued are discarded. Returns how many were dropped.
    /// A task that does not finish within `CLOSE_TIMEOUT` is aborted.
    pub async fn close(self) -> usize {
        let Self {
            cmd_tx,
            mut event_rx,
            task,
            ..
        } = self;

        // A full or closed command channel is fine: dropping `cmd_tx` also
        // stops the task.
        let _ = cmd_tx.try_send(ClientCommand::Disconnect);
        drop(cmd_tx);

        event_rx.close();
        let mut dropped = 0;
        while event_rx.try_recv().is_ok() {
            dropped += 1;
        }

        if let Some(mut task) = task {
            match tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await {
                Ok(Ok(())) => debug!("connection task finished"),
                Ok(Err(err)) => warn!(error = %err, "connection task failed"),
                Err(_) => {
                    warn!(timeout = ?CLOSE_TIMEOUT, "connection task did not stop, aborting");
                    task.abort();
                }
            }
        }
        dropped
    }

    /// Build a connection wired to in-memory channels instead of a socket.
    ///
    /// The returned receiver sees every command the connection issues; the
    /// sender plays the role of the server.
    #[cfg(test)]
    pub(crate) fn new_for_test(
        state: ConnectionState,
    ) -> (
        Self,
        mpsc::Receiver<ClientCommand>,
        mpsc::Sender<InboundEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let connection = Self {
            cmd_tx,
            event_rx,
            state: Arc::new(RwLock::new(state)),
            task: None,
        };
        (connection, cmd_rx, event_tx)
    }

    #[cfg(test)]
    pub(crate) fn set_state_for_test(&self, state: ConnectionState) {
        set_state(&self.state, state);
    }
}

/// Everything the background task owns
struct ClientTask {
    endpoint: String,
    decoder: Decoder,
    max_reconnect_attempts: u32,
    cmd_rx: mpsc::Receiver<ClientCommand>,
    event_tx: mpsc::Sender<InboundEvent>,
    state: Arc<RwLock<ConnectionState>>,
}

/// What ended one connection's I/O loop
#[derive(Debug, PartialEq, Eq)]
enum LoopExit {
    /// Socket dropped unexpectedly
    Reconnect,
    /// Disconnect requested or the client went away
    Shutdown,
}

async fn run_client_task(mut task: ClientTask, ws_stream: WsStream) {
    if run_io_loop(&mut task, ws_stream).await == LoopExit::Shutdown {
        set_state(&task.state, ConnectionState::Disconnected);
        debug!("connection task exiting");
        return;
    }

    let mut attempt: u32 = 1;
    loop {
        if attempt > task.max_reconnect_attempts {
            warn!(
                attempts = task.max_reconnect_attempts,
                "giving up on controller service"
            );
            break;
        }

        set_state(&task.state, ConnectionState::Reconnecting { attempt });
        let backoff = compute_backoff(attempt);
        warn!(
            ?backoff,
            attempt,
            max = task.max_reconnect_attempts,
            "connection lost, retrying"
        );

        if !wait_for_retry(&mut task.cmd_rx, backoff).await || task.event_tx.is_closed() {
            break;
        }

        match connect_ws(&task.endpoint).await {
            Ok(ws_stream) => {
                info!(attempt, "reconnected to controller service");
                set_state(&task.state, ConnectionState::Connected);
                attempt = 1;

                if run_io_loop(&mut task, ws_stream).await == LoopExit::Shutdown {
                    break;
                }
            }
            Err(err) => {
                warn!(attempt, error = %err, "reconnection attempt failed");
                attempt += 1;
            }
        }
    }

    set_state(&task.state, ConnectionState::Disconnected);
    debug!("connection task exiting");
}

/// Sleep for `backoff`, discarding sends issued meanwhile.
///
/// Returns `false` if the client asked to disconnect or went away.
async fn wait_for_retry(cmd_rx: &mut mpsc::Receiver<ClientCommand>, backoff: Duration) -> bool {
    let sleep = tokio::time::sleep(backoff);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(ClientCommand::Send(frame)) => {
                    debug!(?frame, "dropping frame while reconnecting");
                }
                Some(ClientCommand::Disconnect) | None => return false,
            }
        }
    }
}

/// Run one connection's read/write select loop.
async fn run_io_loop(task: &mut ClientTask, ws_stream: WsStream) -> LoopExit {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if !forward_text(text.as_str(), &task.decoder, &task.event_tx).await {
                            send_close(&mut ws_sink).await;
                            return LoopExit::Shutdown;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("received Close frame");
                        return LoopExit::Reconnect;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket read error");
                        return LoopExit::Reconnect;
                    }
                    None => {
                        debug!("websocket stream ended");
                        return LoopExit::Reconnect;
                    }
                }
            }

            cmd = task.cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(frame)) => {
                        if let Err(err) = send_frame(&mut ws_sink, frame).await {
                            warn!(?frame, error = %err, "failed to send frame");
                            return LoopExit::Reconnect;
                        }
                    }
                    Some(ClientCommand::Disconnect) => {
                        send_close(&mut ws_sink).await;
                        return LoopExit::Shutdown;
                    }
                    None => {
                        debug!("command channel closed, shutting down");
                        send_close(&mut ws_sink).await;
                        return LoopExit::Shutdown;
                    }
                }
            }
        }
    }
}

/// Decode a text frame and hand it to the consumer.
///
/// Returns `false` when the consumer has gone away.
async fn forward_text(
    text: &str,
    decoder: &Decoder,
    event_tx: &mpsc::Sender<InboundEvent>,
) -> bool {
    match decoder.decode(text) {
        Ok(event) => {
            debug!(%event, "inbound event");
            event_tx.send(event).await.is_ok()
        }
        Err(ProtocolError::UnknownEvent(kind)) => {
            debug!(%kind, "ignoring unknown event");
            true
        }
        Err(err) => {
            warn!(
                error = %err,
                frame = %preview(text),
                "dropping malformed frame"
            );
            true
        }
    }
}

/// First 120 characters of a frame, for logging
fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

async fn send_frame(
    ws_sink: &mut SplitSink<WsStream, WsMessage>,
    frame: OutboundFrame,
) -> anyhow::Result<()> {
    let json = frame.encode()?;
    ws_sink.send(WsMessage::Text(json.into())).await?;
    debug!(?frame, "outbound frame sent");
    Ok(())
}

async fn send_close(ws_sink: &mut SplitSink<WsStream, WsMessage>) {
    let _ = ws_sink.send(WsMessage::Close(None)).await;
    let _ = ws_sink.close().await;
}

async fn connect_ws(endpoint: &str) -> Result<WsStream, TransportError> {
    let (ws_stream, _response) = connect_async(endpoint)
        .await
        .map_err(|source| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
    Ok(ws_stream)
}

fn set_state(state: &RwLock<ConnectionState>, new_state: ConnectionState) {
    let mut guard = state.write().unwrap_or_else(|e| e.into_inner());
    *guard = new_state;
}

/// Backoff for reconnection attempt `n`: `INITIAL_BACKOFF * 2^(n-1)`, capped.
fn compute_backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let multiplier: u64 = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let secs = INITIAL_BACKOFF.as_secs().saturating_mul(multiplier);
    Duration::from_secs(secs.min(MAX_BACKOFF.as_secs()))
}
