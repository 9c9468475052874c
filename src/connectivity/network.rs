// Network link bring-up
use std::net::ToSocketAddrs;
use std::process::Command;

use crate::error::NetworkError;

#[derive(Debug, Clone, Default)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

/// The link the broker session runs over
pub trait NetworkLink {
    fn join(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError>;
}

/// Host network: asks NetworkManager to join the SSID when one is configured,
/// then checks that the broker host resolves over the resulting link.
pub struct SystemNetwork {
    broker_host: String,
    broker_port: u16,
}

impl SystemNetwork {
    pub fn new(broker_host: impl Into<String>, broker_port: u16) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port,
        }
    }

    fn connect_wifi(&self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        let fail = |reason: String| NetworkError::JoinFailed {
            ssid: credentials.ssid.clone(),
            reason,
        };

        let mut command = Command::new("nmcli");
        command.args(["device", "wifi", "connect", credentials.ssid.as_str()]);
        if !credentials.password.is_empty() {
            command.args(["password", credentials.password.as_str()]);
        }

        let output = command
            .output()
            .map_err(|e| fail(format!("failed to run nmcli: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(stderr.trim().to_string()));
        }
        Ok(())
    }

    fn check_broker_reachable(&self) -> Result<(), NetworkError> {
        let unreachable = |reason: String| NetworkError::Unreachable {
            host: self.broker_host.clone(),
            reason,
        };

        let mut addrs = (self.broker_host.as_str(), self.broker_port)
            .to_socket_addrs()
            .map_err(|e| unreachable(e.to_string()))?;

        match addrs.next() {
            Some(addr) => {
                tracing::debug!("Broker {} resolves to {}", self.broker_host, addr);
                Ok(())
            }
            None => Err(unreachable("no addresses".to_string())),
        }
    }
}

impl NetworkLink for SystemNetwork {
    fn join(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        if credentials.ssid.is_empty() {
            tracing::info!("No SSID configured, using the host's existing network");
        } else {
            self.connect_wifi(credentials)?;
        }
        self.check_broker_reachable()
    }
}
