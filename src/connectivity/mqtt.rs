// MQTT transport on rumqttc's synchronous client
use rumqttc::{
    Client, Connection, ConnectReturnCode, Event, MqttOptions, Packet, QoS, RecvTimeoutError,
    Transport, TryRecvError,
};
use std::time::{Duration, Instant};

use crate::connectivity::transport::{BrokerConfig, BrokerTransport, TransportEvent};
use crate::error::BrokerError;

/// Outgoing request queue depth
const REQUEST_CAPACITY: usize = 10;

pub struct MqttTransport {
    config: BrokerConfig,
    session: Option<(Client, Connection)>,
}

impl MqttTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn options(&self) -> MqttOptions {
        let config = &self.config;
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_credentials(&config.username, &config.password);
        options.set_keep_alive(config.keep_alive);
        // Subscriptions are re-issued after every connect
        options.set_clean_session(true);
        if config.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    fn next_event(
        connection: &mut Connection,
        timeout: Duration,
    ) -> Result<Option<Event>, BrokerError> {
        let received = if timeout.is_zero() {
            match connection.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(BrokerError::NoSession),
            }
        } else {
            match connection.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(BrokerError::NoSession),
            }
        };

        received
            .map(Some)
            .map_err(|e| BrokerError::Protocol(e.to_string()))
    }
}

impl BrokerTransport for MqttTransport {
    fn open(&mut self) -> Result<(), BrokerError> {
        self.close();

        let (client, mut connection) = Client::new(self.options(), REQUEST_CAPACITY);
        let deadline = Instant::now() + self.config.connect_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BrokerError::Connect(format!(
                    "no acknowledgement from {}:{} within {:?}",
                    self.config.host, self.config.port, self.config.connect_timeout
                )));
            }

            let event = Self::next_event(&mut connection, remaining)
                .map_err(|e| BrokerError::Connect(e.to_string()))?;

            if let Some(Event::Incoming(Packet::ConnAck(ack))) = event {
                if ack.code != ConnectReturnCode::Success {
                    return Err(BrokerError::Connect(format!("refused: {:?}", ack.code)));
                }
                self.session = Some((client, connection));
                return Ok(());
            }
        }
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        let (client, _) = self.session.as_mut().ok_or(BrokerError::NoSession)?;
        client
            .subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, BrokerError> {
        let (_, connection) = self.session.as_mut().ok_or(BrokerError::NoSession)?;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(event) = Self::next_event(connection, remaining)? else {
                return Ok(None);
            };

            match event {
                Event::Incoming(Packet::Publish(publish)) => {
                    return Ok(Some(TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    }));
                }
                Event::Incoming(Packet::ConnAck(_)) => return Ok(Some(TransportEvent::Connected)),
                Event::Incoming(Packet::Disconnect) => {
                    return Ok(Some(TransportEvent::Disconnected))
                }
                // Acks, pings and our own outgoing traffic
                _ => {
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some((client, _connection)) = self.session.take() {
            if let Err(e) = client.disconnect() {
                tracing::debug!("Disconnect request not sent: {}", e);
            }
        }
    }
}
