// Connectivity module
// Network join, broker session lifecycle and the MQTT transport behind it

pub mod mqtt;
pub mod network;
pub mod supervisor;
pub mod transport;

pub use mqtt::MqttTransport;
pub use network::{NetworkLink, SystemNetwork, WifiCredentials};
pub use supervisor::{ConnectivitySupervisor, Session};
pub use transport::{BrokerConfig, BrokerTransport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A session was up, and the last operation on it faulted
    Degraded,
}
