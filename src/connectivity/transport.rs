// Broker transport seam
use std::time::Duration;

use crate::error::BrokerError;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

/// What a poll of the broker connection can surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message { topic: String, payload: Vec<u8> },
}

/// One broker connection. `open` must not return until the broker has
/// acknowledged the session (or the connect timeout expired).
pub trait BrokerTransport {
    fn open(&mut self) -> Result<(), BrokerError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    /// Wait up to `timeout` for the next event. `Ok(None)` means nothing arrived.
    fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, BrokerError>;

    fn close(&mut self);
}
