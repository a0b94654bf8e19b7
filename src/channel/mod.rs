pub mod client;
pub mod listeners;
pub mod memory;
pub mod transport;

pub use client::{ChannelClient, ChannelState, ReconnectPolicy};
pub use listeners::{Listener, ListenerId, ListenerRegistry};
pub use memory::MemoryConnector;
pub use transport::{Connector, Link, WsConnector};
