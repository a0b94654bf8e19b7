use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};

use crate::error::ChannelError;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// One established connection, reduced to text frames.
///
/// Dropping `outbound` closes the connection; `inbound` yielding `None`
/// means the peer went away.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens raw connections for the channel client.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<Link, ChannelError>;
}

/// WebSocket connector for the feedback service.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> Result<Link, ChannelError> {
        let (stream, _response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| ChannelError::Timeout(self.connect_timeout))?
            .map_err(|err| match err {
                WsError::Io(io) => ChannelError::Refused(io.to_string()),
                other => ChannelError::Transport(other.to_string()),
            })?;

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(err) = sink.send(Message::text(frame)).await {
                    log_warn!("channel write failed: {err}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let url = self.url.clone();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text.to_string()).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        log_debug!("{url} sent close: {frame:?}");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        log_warn!("channel read from {url} failed: {err}");
                        break;
                    }
                }
            }
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
