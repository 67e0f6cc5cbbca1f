//! WebSocket watch stream for announcement changes

use crate::{ApiClient, ClientError, Result};
use async_trait::async_trait;
use corebgp_model::WatchEvent;
use futures::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receiver of decoded watch events, called in arrival order
#[async_trait]
pub trait EventHandler: Send {
    async fn on_event(&mut self, event: WatchEvent);
}

impl ApiClient {
    /// Hold the watch connection open, forwarding each decoded event to `handler`.
    ///
    /// Returns Ok when the server closes the stream or `cancel` fires.
    pub async fn watch(&self, cancel: &CancellationToken, handler: &mut dyn EventHandler) -> Result<()> {
        let url = self.watch_url()?;

        let (mut stream, _) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            connected = tokio::time::timeout(self.timeout(), connect_async(url.as_str())) => {
                connected.map_err(|_| ClientError::Timeout(url.to_string()))??
            }
        };
        info!("Watching announcements at {}", url);

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Watch cancelled, closing WebSocket");
                    let _ = stream.close(None).await;
                    return Ok(());
                }
                message = stream.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => match WatchEvent::decode(&text) {
                    Ok(event) => handler.on_event(event).await,
                    Err(e) => warn!(error = %e, "Dropping malformed watch event"),
                },
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|text| WatchEvent::decode(text).map_err(|e| e.to_string()))
                {
                    Ok(event) => handler.on_event(event).await,
                    Err(e) => warn!(error = %e, "Dropping malformed binary watch event"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("Watch stream closed by server: {:?}", frame);
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    info!("Watch stream ended");
                    return Ok(());
                }
            }
        }
    }
}
