// Error taxonomy for the appliance
// Startup faults are fatal, everything raised inside the main loop is recovered

use thiserror::Error;

use crate::connectivity::ConnectionState;

/// Failure to bring the network link up. Fatal at startup.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to join network {ssid:?}: {reason}")]
    JoinFailed { ssid: String, reason: String },

    #[error("broker host {host:?} is unreachable: {reason}")]
    Unreachable { host: String, reason: String },
}

/// Faults raised by the broker session (connect, pump, reconnect).
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("failed to subscribe to {topic:?}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no broker session is open")]
    NoSession,

    #[error("reconnect not permitted while {0:?}")]
    ReconnectNotPermitted(ConnectionState),
}

/// Faults raised while playing a clip. Never fatal.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("clip not found: {0}")]
    ClipNotFound(String),

    #[error("failed to decode {clip}: {reason}")]
    DecodeError { clip: String, reason: String },

    #[error("audio output error: {0}")]
    Output(String),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),
}

/// A fault caught at the main loop boundary, classified by recovery tier.
#[derive(Debug, Error)]
pub enum Fault {
    #[error(transparent)]
    Protocol(#[from] BrokerError),

    #[error("unclassified fault: {0}")]
    Unclassified(String),
}

/// Startup steps that halt the appliance when they fail
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}
