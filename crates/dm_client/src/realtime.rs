//! Real-time delivery over the relay WebSocket.
//!
//! [`RealtimeConnection`] owns the socket through a background task. The
//! socket is closed when the relay hangs up, on a read error, on
//! [`RealtimeConnection::close`], or when the handle is dropped.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use dm_proto::{
    codec::{self, ClientFrame},
    PushFrame,
};

use crate::error::DmError;

/// Receives decoded frames from the read task.
pub trait FrameHandler: Send + Sync + 'static {
    fn on_frame(&self, frame: PushFrame);

    /// Called once when the read task ends, whatever the reason.
    fn on_closed(&self);
}

pub struct RealtimeConnection {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeConnection {
    /// Open the socket, authenticate with `auth_header`, and start reading.
    /// Returns once the handshake and the auth frame have gone through.
    pub async fn connect(
        url: &str,
        auth_header: String,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Self, DmError> {
        let (ws, _response) = connect_async(url).await?;
        let (mut write, mut read) = ws.split();

        let auth = serde_json::to_string(&ClientFrame::Auth { token: auth_header })?;
        write.send(Message::Text(auth)).await?;

        tracing::info!(target: "dm_client", event = "ws_connected", url = %url);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    next = read.next() => match next {
                        Some(Ok(Message::Text(text))) => match codec::parse_push_frame(&text) {
                            Ok(PushFrame::Other(kind)) => {
                                tracing::debug!(target: "dm_client", event = "ws_frame_ignored", kind = %kind);
                            }
                            Ok(frame) => handler.on_frame(frame),
                            Err(err) => {
                                tracing::warn!(
                                    target: "dm_client",
                                    event = "ws_frame_invalid",
                                    error = %err,
                                    frame_len = text.len()
                                );
                            }
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            if write.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::warn!(target: "dm_client", event = "ws_read_error", error = %err);
                            break;
                        }
                    },
                }
            }
            tracing::info!(target: "dm_client", event = "ws_closed");
            handler.on_closed();
        });

        Ok(Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Send a close frame and wait for the read task to finish.
    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
