//! Single logical push channel per session, with linear-backoff recovery.
//!
//! Every (re)binding bumps a generation counter. Reader and reconnect tasks
//! carry the generation they were spawned for and become no-ops once it is
//! stale, so a timer that fires after `disconnect()` can never reopen the
//! channel.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::listeners::{Listener, ListenerId, ListenerRegistry};
use super::transport::{Connector, Link};
use crate::models::message::BindFrame;
use crate::models::ChannelMessage;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
    Reconnecting,
}

struct Binding {
    state: ChannelState,
    session_id: Option<String>,
    attempts: u32,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    reader: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

impl Binding {
    fn new() -> Self {
        Self {
            state: ChannelState::Closed,
            session_id: None,
            attempts: 0,
            generation: 0,
            outbound: None,
            reader: None,
            retry: None,
        }
    }

    fn cancel_tasks(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
        if let Some(handle) = self.retry.take() {
            handle.abort();
        }
    }
}

struct Shared {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    listeners: ListenerRegistry<ChannelMessage>,
    binding: Mutex<Binding>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.binding.lock().generation == generation
    }

    fn establish(self: Arc<Self>, generation: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let session_id = {
                let mut binding = self.binding.lock();
                if binding.generation != generation {
                    return;
                }
                let Some(session_id) = binding.session_id.clone() else {
                    return;
                };
                binding.state = ChannelState::Connecting;
                session_id
            };

            match self.connector.open().await {
                Ok(link) => self.attach(generation, &session_id, link),
                Err(err) => {
                    log_warn!("channel open for session {session_id} failed: {err}");
                    self.handle_unexpected_close(generation);
                }
            }
        })
    }

    fn attach(self: &Arc<Self>, generation: u64, session_id: &str, link: Link) {
        let Link {
            outbound,
            mut inbound,
        } = link;

        let mut binding = self.binding.lock();
        if binding.generation != generation {
            log_debug!("discarding stale connection for session {session_id}");
            return;
        }

        let bound = serde_json::to_string(&BindFrame { session_id })
            .map_err(|err| err.to_string())
            .and_then(|frame| outbound.send(frame).map_err(|_| "peer closed".to_string()));
        if let Err(err) = bound {
            drop(binding);
            log_warn!("could not bind channel to session {session_id}: {err}");
            self.handle_unexpected_close(generation);
            return;
        }

        binding.outbound = Some(outbound);
        binding.state = ChannelState::Open;
        binding.attempts = 0;
        log_info!("channel open for session {session_id}");

        let shared = Arc::clone(self);
        binding.reader = Some(tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if !shared.is_current(generation) {
                    return;
                }
                shared.dispatch(&frame);
            }
            shared.handle_unexpected_close(generation);
        }));
    }

    fn dispatch(&self, frame: &str) {
        let message: ChannelMessage = match serde_json::from_str(frame) {
            Ok(message) => message,
            Err(err) => {
                log_warn!("dropping malformed channel frame: {err}");
                return;
            }
        };
        log_debug!("channel message type={}", message.kind);
        self.listeners.publish(&message);
    }

    fn handle_unexpected_close(self: &Arc<Self>, generation: u64) {
        let mut binding = self.binding.lock();
        if binding.generation != generation {
            return;
        }

        binding.outbound = None;
        binding.reader = None;

        let Some(session_id) = binding.session_id.clone() else {
            binding.state = ChannelState::Closed;
            return;
        };

        if binding.attempts >= self.policy.max_attempts {
            binding.state = ChannelState::Closed;
            log_warn!(
                "channel for session {session_id} gave up after {} reconnect attempts",
                binding.attempts
            );
            return;
        }

        binding.attempts += 1;
        let attempt = binding.attempts;
        let delay = self.policy.delay_for(attempt);
        binding.state = ChannelState::Reconnecting;
        log_info!(
            "channel for session {session_id} lost; reconnect {attempt}/{} in {delay:?}",
            self.policy.max_attempts
        );

        // Anchored here so time that passes before the task first runs counts.
        let deadline = Instant::now().checked_add(delay);
        let shared = Arc::clone(self);
        binding.retry = Some(tokio::spawn(async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
            shared.establish(generation).await;
        }));
    }

    fn disconnect(&self) {
        let mut binding = self.binding.lock();
        binding.generation += 1;
        binding.session_id = None;
        binding.attempts = self.policy.max_attempts;
        binding.outbound = None;
        binding.cancel_tasks();
        if binding.state != ChannelState::Closed {
            binding.state = ChannelState::Closed;
            log_info!("channel disconnected");
        }
    }
}

/// Push channel bound to at most one session id at a time.
///
/// Owned by whoever owns the session; dropping the client disconnects it.
pub struct ChannelClient {
    shared: Arc<Shared>,
}

impl ChannelClient {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                policy,
                listeners: ListenerRegistry::new("channel"),
                binding: Mutex::new(Binding::new()),
            }),
        }
    }

    /// Binds the channel to `session_id` and opens it. Any previous binding
    /// is closed first, never multiplexed.
    ///
    /// A failed open is treated like an unexpected close and goes through
    /// the reconnect path; it is not reported to the caller.
    pub async fn connect(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let generation = {
            let mut binding = self.shared.binding.lock();
            if let Some(previous) = binding.session_id.as_deref() {
                if previous != session_id {
                    log_info!("replacing channel binding {previous} with {session_id}");
                }
            }
            binding.generation += 1;
            binding.cancel_tasks();
            binding.outbound = None;
            binding.session_id = Some(session_id);
            binding.attempts = 0;
            binding.state = ChannelState::Connecting;
            binding.generation
        };

        Arc::clone(&self.shared).establish(generation).await;
    }

    /// Clears the binding and suppresses any pending reconnect. Idempotent.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Sends `message` if the channel is open. Messages are never queued.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let binding = self.shared.binding.lock();
        let outbound = match (binding.state, binding.outbound.as_ref()) {
            (ChannelState::Open, Some(outbound)) => outbound,
            (state, _) => {
                log_warn!("channel is {state:?}; dropping outbound message");
                return false;
            }
        };

        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(err) => {
                log_warn!("could not encode outbound message: {err}");
                return false;
            }
        };

        if outbound.send(frame).is_err() {
            log_warn!("channel closed while sending");
            return false;
        }
        true
    }

    pub fn add_listener(&self, listener: Arc<dyn Listener<ChannelMessage>>) -> ListenerId {
        self.shared.listeners.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }

    pub fn state(&self) -> ChannelState {
        self.shared.binding.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.binding.lock().session_id.clone()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.shared.binding.lock().attempts
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}
