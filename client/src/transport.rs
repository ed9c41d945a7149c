use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::Result;
use talkie_protocol::{ClientEvent, RoomId, ServerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::credentials::Credentials;

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle of one room socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Handshake in flight; [`Transport::open`] resolves it to `Open` or an
    /// error.
    Connecting,
    Open,
    Closed,
}

/// One live room socket.
///
/// A spawned I/O task owns the stream; the session loop consumes inbound
/// events through [`Transport::next_event`]. Exactly one transport may be
/// open per client, enforced by the room switch coordinator's
/// close-before-open.
pub struct Transport {
    room_id: RoomId,
    outgoing: mpsc::UnboundedSender<ClientEvent>,
    incoming: mpsc::UnboundedReceiver<ServerEvent>,
    state: Arc<AtomicU8>,
    io_task: JoinHandle<()>,
}

impl Transport {
    /// Connect the socket for `room_id` and declare the room as viewed.
    ///
    /// The credential rides as a connection parameter. Immediately after the
    /// handshake the transport sends exactly one `MarkRead`.
    pub async fn open(ws_base: &str, room_id: RoomId, credentials: &Credentials) -> Result<Self> {
        let token = credentials.access_token().unwrap_or_default();
        let url = format!(
            "{}/ws/chat/{}/?token={}",
            ws_base.trim_end_matches('/'),
            room_id,
            token
        );

        let state = Arc::new(AtomicU8::new(STATE_CONNECTING));

        let mut connection = Connection::connect(&url).await?;
        connection.send(&ClientEvent::MarkRead).await?;

        state.store(STATE_OPEN, Ordering::SeqCst);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let io_task = tokio::spawn(io_loop(
            connection,
            outgoing_rx,
            incoming_tx,
            Arc::clone(&state),
        ));

        Ok(Self {
            room_id,
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            state,
            io_task,
        })
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn state(&self) -> TransportState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CONNECTING => TransportState::Connecting,
            STATE_OPEN => TransportState::Open,
            _ => TransportState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_OPEN
    }

    /// Enqueue one outbound event.
    ///
    /// Sends while the socket is not open are dropped, not queued; there is
    /// no outbox. Callers gate input on [`Transport::is_open`] or accept the
    /// drop.
    pub fn send(&self, event: ClientEvent) {
        if !self.is_open() {
            tracing::warn!(room = self.room_id, ?event, "Dropping send on non-open transport");
            return;
        }

        if self.outgoing.send(event).is_err() {
            tracing::warn!(room = self.room_id, "Dropping send, I/O task is gone");
        }
    }

    /// Receive the next inbound event for this room.
    ///
    /// Returns `None` once the socket has closed; closure is terminal for
    /// this handle. There is no automatic reconnect.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.incoming.recv().await
    }

    /// Tear the socket down and stop all further delivery, including events
    /// already queued for the consumer.
    pub fn close(&mut self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        self.io_task.abort();
        self.incoming.close();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Mandatory scoped-resource release: never leak a live socket when
        // rooms are switched rapidly
        self.close();
    }
}

async fn io_loop(
    mut connection: Connection,
    mut outgoing: mpsc::UnboundedReceiver<ClientEvent>,
    incoming: mpsc::UnboundedSender<ServerEvent>,
    state: Arc<AtomicU8>,
) {
    loop {
        tokio::select! {
            outbound = outgoing.recv() => match outbound {
                Some(event) => {
                    if let Err(e) = connection.send(&event).await {
                        tracing::error!(error = %e, "Transport send failed");
                        break;
                    }
                }
                None => break,
            },
            inbound = connection.next_event() => match inbound {
                Ok(Some(event)) => {
                    if incoming.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("Server closed the room socket");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Transport receive failed");
                    break;
                }
            },
        }
    }

    state.store(STATE_CLOSED, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::net::TcpListener;

    use crate::credentials::{Credentials, StaticToken};

    #[tokio::test]
    async fn test_state_lifecycle_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            }
        });

        let credentials: Credentials = Arc::new(StaticToken("token".to_string()));
        let mut transport = Transport::open(&format!("ws://{}", addr), 1, &credentials)
            .await
            .unwrap();

        assert_eq!(transport.state(), TransportState::Open);
        assert!(transport.is_open());

        transport.close();
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(!transport.is_open());

        // Sends after close are dropped, never queued or raised
        transport.send(ClientEvent::MarkRead);
    }
}
