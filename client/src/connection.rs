use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use talkie_protocol::{ClientEvent, ServerEvent, parse_server_event};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Low-level WebSocket connection for one room.
pub(crate) struct Connection {
    ws: WsStream,
}

impl Connection {
    /// Open the socket. Handshake completion is the only open confirmation
    /// the protocol has; there is no application-level ack.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _response) = connect_async(url)
            .await
            .context("Failed to connect to WebSocket")?;

        Ok(Self { ws })
    }

    /// Receive the next event, skipping malformed frames.
    ///
    /// Returns `None` once the server closes the socket.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(message) = self.ws.next().await {
            let message = message.context("WebSocket error")?;

            match message {
                Message::Text(text) => match parse_server_event(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => {
                        // Bad frames are dropped per-message, never fatal to
                        // the consumer loop
                        tracing::warn!(error = %e, "Dropping malformed frame");
                    }
                },
                Message::Close(_) => return Ok(None),
                Message::Ping(data) => self.ws.send(Message::Pong(data)).await?,
                _ => {}
            }
        }

        Ok(None)
    }

    /// Send one outbound event.
    pub async fn send(&mut self, event: &ClientEvent) -> Result<()> {
        self.ws
            .send(Message::Text(event.to_wire_format()))
            .await
            .context("Failed to send event")
    }
}
