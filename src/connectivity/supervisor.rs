// Connectivity supervisor
// Owns the network join and the broker session, and every ConnectionState change

use std::time::Duration;

use crate::commands::CommandEvent;
use crate::connectivity::network::{NetworkLink, WifiCredentials};
use crate::connectivity::transport::{BrokerTransport, TransportEvent};
use crate::connectivity::ConnectionState;
use crate::error::{BrokerError, NetworkError};

/// Upper bound on events drained by one pump
const MAX_EVENTS_PER_PUMP: usize = 32;

/// An established broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Increments on every successful connect or reconnect
    pub generation: u64,
    pub topic: String,
}

pub struct ConnectivitySupervisor<N, T> {
    network: N,
    transport: T,
    topic: String,
    state: ConnectionState,
    generation: u64,
    established: bool,
    pump_timeout: Duration,
}

impl<N: NetworkLink, T: BrokerTransport> ConnectivitySupervisor<N, T> {
    pub fn new(network: N, transport: T, topic: impl Into<String>, pump_timeout: Duration) -> Self {
        Self {
            network,
            transport,
            topic: topic.into(),
            state: ConnectionState::Disconnected,
            generation: 0,
            established: false,
            pump_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The current session, if one is up
    pub fn session(&self) -> Option<Session> {
        (self.state == ConnectionState::Connected).then(|| self.current_session())
    }

    /// Bring the network link up. Attempted once; the caller decides what failure means.
    pub fn join_network(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        tracing::info!("Connecting to network {:?}...", credentials.ssid);
        self.network.join(credentials)?;
        tracing::info!("Network connected");
        Ok(())
    }

    /// Open the broker session and subscribe to the sounds topic
    pub fn connect_broker(&mut self) -> Result<Session, BrokerError> {
        tracing::info!("Connecting to broker...");
        self.state = ConnectionState::Connecting;

        match self.establish() {
            Ok(()) => Ok(self.current_session()),
            Err(e) => {
                self.state = self.fallback_state();
                Err(e)
            }
        }
    }

    /// Tear down the session and open a fresh one, re-subscribing.
    /// Only permitted while Degraded or Disconnected.
    pub fn reconnect(&mut self) -> Result<(), BrokerError> {
        match self.state {
            ConnectionState::Degraded | ConnectionState::Disconnected => {}
            state => return Err(BrokerError::ReconnectNotPermitted(state)),
        }

        self.transport.close();
        self.state = ConnectionState::Connecting;

        if let Err(e) = self.establish() {
            self.state = self.fallback_state();
            return Err(e);
        }
        Ok(())
    }

    /// Settle a connect attempt that never returned, so a later reconnect is permitted
    pub fn abandon_attempt(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.transport.close();
            self.state = self.fallback_state();
        }
    }

    /// Drain available broker traffic, waiting at most the pump timeout for the
    /// first event. Connect and disconnect notifications update the state here;
    /// faults mark the session Degraded and are left to the caller to recover.
    pub fn pump_once(&mut self) -> Result<Vec<CommandEvent>, BrokerError> {
        let mut events = Vec::new();
        let mut timeout = self.pump_timeout;

        while events.len() < MAX_EVENTS_PER_PUMP {
            let handled = match self.transport.poll(timeout) {
                Ok(None) => break,
                Ok(Some(event)) => self.handle(event, &mut events),
                Err(e) => Err(e),
            };

            if let Err(e) = handled {
                if !events.is_empty() {
                    tracing::warn!("Dropping {} message(s) received before the fault", events.len());
                }
                self.mark_degraded();
                return Err(e);
            }
            timeout = Duration::ZERO;
        }

        Ok(events)
    }

    fn handle(&mut self, event: TransportEvent, events: &mut Vec<CommandEvent>) -> Result<(), BrokerError> {
        match event {
            TransportEvent::Connected => {
                // Session came back on its own; the old subscription did not survive
                self.transport.subscribe(&self.topic)?;
                self.on_connected();
            }
            TransportEvent::Disconnected => {
                tracing::warn!("Disconnected from broker!");
                self.mark_degraded();
            }
            TransportEvent::Message { topic, payload } => match String::from_utf8(payload) {
                Ok(payload) => {
                    tracing::info!("Received: topic: {}, message: {}", topic, payload);
                    events.push(CommandEvent { topic, payload });
                }
                Err(e) => {
                    tracing::warn!("Dropping non-UTF-8 message on {}: {}", topic, e);
                }
            },
        }
        Ok(())
    }

    fn establish(&mut self) -> Result<(), BrokerError> {
        self.transport.open()?;
        self.transport.subscribe(&self.topic)?;
        self.on_connected();
        Ok(())
    }

    fn on_connected(&mut self) {
        self.generation += 1;
        self.established = true;
        self.state = ConnectionState::Connected;
        tracing::info!("Connected to broker! Listening for sound commands on {}", self.topic);
    }

    fn mark_degraded(&mut self) {
        self.state = self.fallback_state();
    }

    fn fallback_state(&self) -> ConnectionState {
        if self.established {
            ConnectionState::Degraded
        } else {
            ConnectionState::Disconnected
        }
    }

    fn current_session(&self) -> Session {
        Session {
            generation: self.generation,
            topic: self.topic.clone(),
        }
    }
}
