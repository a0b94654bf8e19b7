//! In-process connector for exercising the channel client without a network.
//!
//! ```ignore
//! let server = MemoryConnector::new();
//! let client = ChannelClient::new(Arc::new(server.clone()), ReconnectPolicy::default());
//! client.connect("abc123").await;
//! server.push(r#"{"type":"pose_feedback","data":{...}}"#);
//! assert_eq!(server.received(0)[0], r#"{"session_id":"abc123"}"#);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::transport::{Connector, Link};
use crate::error::ChannelError;

struct Peer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: Option<mpsc::UnboundedSender<String>>,
    received: Vec<String>,
}

impl Peer {
    fn drain(&mut self) -> &[String] {
        while let Ok(frame) = self.from_client.try_recv() {
            self.received.push(frame);
        }
        &self.received
    }
}

#[derive(Default)]
struct ServerState {
    attempts: usize,
    refuse: bool,
    peers: Vec<Peer>,
}

/// Cloneable handle; every clone sees the same connections.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every `open` fails with [`ChannelError::Refused`].
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Number of `open` calls so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Number of connections actually established.
    pub fn connections(&self) -> usize {
        self.state.lock().peers.len()
    }

    /// Sends a frame to the client on the most recent connection. Returns
    /// false if that connection is gone.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        let state = self.state.lock();
        state
            .peers
            .last()
            .and_then(|peer| peer.to_client.as_ref())
            .map(|tx| tx.send(frame.into()).is_ok())
            .unwrap_or(false)
    }

    /// Simulates the server dropping the most recent connection.
    pub fn drop_connection(&self) {
        if let Some(peer) = self.state.lock().peers.last_mut() {
            peer.to_client = None;
        }
    }

    /// Frames the client sent on connection `index` (in connect order).
    pub fn received(&self, index: usize) -> Vec<String> {
        self.state
            .lock()
            .peers
            .get_mut(index)
            .map(|peer| peer.drain().to_vec())
            .unwrap_or_default()
    }

    /// Whether the client is still reading connection `index`.
    pub fn client_attached(&self, index: usize) -> bool {
        self.state
            .lock()
            .peers
            .get(index)
            .and_then(|peer| peer.to_client.as_ref())
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self) -> Result<Link, ChannelError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if state.refuse {
            return Err(ChannelError::Refused("memory server refusing connections".into()));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        state.peers.push(Peer {
            from_client,
            to_client: Some(to_client),
            received: Vec::new(),
        });

        Ok(Link { outbound, inbound })
    }
}
