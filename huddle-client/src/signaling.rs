use crate::error::SignalingError;
use futures::{SinkExt, StreamExt};
use huddle_core::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

/// Ordered, bidirectional link to the signaling server.
///
/// Dropping the outgoing half closes the underlying socket; the incoming
/// half ends when the server goes away.
pub struct SignalingChannel {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    incoming: mpsc::UnboundedReceiver<ServerMessage>,
}

impl SignalingChannel {
    pub fn new(
        outgoing: mpsc::UnboundedSender<ClientMessage>,
        incoming: mpsc::UnboundedReceiver<ServerMessage>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<ClientMessage>,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        (self.outgoing, self.incoming)
    }

    /// Opens a WebSocket to a signaling server, e.g. `ws://host:3000/ws`.
    pub async fn connect(url: &str) -> Result<Self, SignalingError> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (incoming_tx, incoming) = mpsc::unbounded_channel::<ServerMessage>();

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to encode signaling frame: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!("Signaling writer finished");
        });

        tokio::spawn(async move {
            while let Some(Ok(frame)) = ws_receiver.next().await {
                match frame {
                    Message::Text(text) => match ServerMessage::from_json(text.as_str()) {
                        Ok(msg) => {
                            if incoming_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed signaling frame: {}", e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            debug!("Signaling reader finished");
        });

        Ok(Self::new(outgoing, incoming))
    }
}
