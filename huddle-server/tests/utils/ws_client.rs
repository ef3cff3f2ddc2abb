use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use huddle_core::{ClientMessage, PeerId, ServerMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::PUSH_TIMEOUT_MS;

/// Browser stand-in speaking the JSON frame protocol over a real socket.
pub struct WsTestClient {
    pub peer_id: PeerId,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let (ws, _) = connect_async(format!("ws://{}/ws", addr))
            .await
            .context("Failed to open websocket")?;
        let mut client = Self {
            peer_id: PeerId::new(),
            ws,
        };

        match client.next().await? {
            ServerMessage::Welcome { peer_id, .. } => client.peer_id = peer_id,
            other => bail!("expected welcome, got {:?}", other),
        }
        Ok(client)
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        self.send_raw(&msg.to_json()?).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .context("Failed to send frame")
    }

    pub async fn next(&mut self) -> Result<ServerMessage> {
        loop {
            let frame = tokio::time::timeout(Duration::from_millis(PUSH_TIMEOUT_MS), self.ws.next())
                .await
                .context("Timeout waiting for frame")?
                .context("Socket closed")??;

            if let Message::Text(text) = frame {
                return Ok(ServerMessage::from_json(text.as_str())?);
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await.context("Failed to close socket")
    }
}
