use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::protocol::{self, ClientEvent};
use crate::ws::session::Session;
use crate::ws::{ConnectionId, ConnectionSender};

/// Floor for the ping period; `tokio::time::interval` panics on zero.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(100);

/// Run the actor-per-connection pattern for one WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Ping task: sends periodic pings and gives up when a pong is late
/// - Dispatcher task: owns the [Session] and handles decoded events one at a time
///
/// The reader loop only decodes frames and queues them on the dispatcher's
/// mailbox, so events from one connection are handled strictly in arrival
/// order while other connections proceed independently.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let connection = ConnectionId::new();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Register this connection in the connection registry
    state.connections.insert(connection, tx.clone());
    tracing::info!(connection_id = %connection, "WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let dispatcher_handle = tokio::spawn(dispatch_loop(
        Session::new(connection, state.clone()),
        mailbox_rx,
    ));

    // Track pong reception
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let mut ping_handle = tokio::spawn(ping_task(
        tx.clone(),
        pong_rx,
        state.settings.ping_interval,
        state.settings.pong_timeout,
    ));

    // Reader loop: process incoming WebSocket messages
    loop {
        tokio::select! {
            _ = &mut ping_handle => {
                tracing::info!(connection_id = %connection, "Liveness check failed");
                break;
            }
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => match protocol::decode(text.as_str()) {
                        Ok(event) => {
                            if mailbox_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(
                                connection_id = %connection,
                                error = %e,
                                "Dropping malformed frame: {}",
                                text.as_str().chars().take(100).collect::<String>()
                            );
                        }
                    },
                    Message::Binary(_) => {
                        tracing::debug!(connection_id = %connection, "Ignoring binary frame");
                    }
                    Message::Pong(_) => {
                        // Pong received, notify the ping task
                        let _ = pong_tx.send(());
                    }
                    Message::Ping(data) => {
                        // Respond to client pings with pong
                        let _ = tx.send(Message::Pong(data));
                    }
                    Message::Close(frame) => {
                        tracing::info!(
                            connection_id = %connection,
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(
                        connection_id = %connection,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    // Stream ended, client disconnected
                    tracing::info!(connection_id = %connection, "WebSocket stream ended");
                    break;
                }
            }
        }
    }

    ping_handle.abort();

    // Closing the mailbox lets the dispatcher finish queued events, then tear down
    drop(mailbox_tx);
    if let Err(e) = dispatcher_handle.await {
        tracing::warn!(connection_id = %connection, error = %e, "Dispatcher task failed");
        // Teardown never ran; at least stop routing frames to this socket
        state.connections.remove(&connection);
    }

    writer_handle.abort();

    tracing::info!(connection_id = %connection, "WebSocket actor stopped");
}

/// Handle queued events in order, then tear the session down.
async fn dispatch_loop(mut session: Session, mut mailbox: mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = mailbox.recv().await {
        session.handle(event).await;
    }
    session.teardown().await;
}

/// Send periodic pings. Returns when the connection is gone or a pong is late.
async fn ping_task(
    ping_tx: ConnectionSender,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut ping_timer = interval(ping_interval.max(MIN_PING_INTERVAL));
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer task has died, connection is gone
            break;
        }

        match timeout(pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}
