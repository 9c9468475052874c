// Main loop
// Pumps the broker session, routes commands to the voice and recovers from faults

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use crate::audio::{AudioPlaybackService, PcmSink};
use crate::commands::{CommandEvent, CommandRouter};
use crate::connectivity::{
    BrokerTransport, ConnectivitySupervisor, NetworkLink, Session, WifiCredentials,
};
use crate::error::{BrokerError, Fault, StartupError};

/// Where the loop's fixed delays are spent
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// After any fault, before the reconnect attempt
    pub short_delay: Duration,
    /// After a failed reconnect
    pub long_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            short_delay: Duration::from_secs(1),
            long_delay: Duration::from_secs(5),
        }
    }
}

/// How one pass of the main loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Reconnected,
    ReconnectFailed,
    UnclassifiedFault,
}

pub struct Orchestrator<N, T, S, P> {
    supervisor: ConnectivitySupervisor<N, T>,
    router: CommandRouter,
    playback: AudioPlaybackService<S>,
    pause: P,
    policy: RetryPolicy,
}

impl<N, T, S, P> Orchestrator<N, T, S, P>
where
    N: NetworkLink,
    T: BrokerTransport,
    S: PcmSink,
    P: Pause,
{
    pub fn new(
        supervisor: ConnectivitySupervisor<N, T>,
        router: CommandRouter,
        playback: AudioPlaybackService<S>,
        pause: P,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            supervisor,
            router,
            playback,
            pause,
            policy,
        }
    }

    pub fn supervisor(&self) -> &ConnectivitySupervisor<N, T> {
        &self.supervisor
    }

    pub fn playback(&self) -> &AudioPlaybackService<S> {
        &self.playback
    }

    /// Join the network, open the broker session, then play the startup clip.
    /// Only the first two are fatal.
    pub fn start(
        &mut self,
        credentials: &WifiCredentials,
        startup_clip: &str,
    ) -> Result<Session, StartupError> {
        self.supervisor.join_network(credentials)?;
        let session = self.supervisor.connect_broker()?;

        if let Err(e) = self.playback.play_clip(startup_clip) {
            tracing::warn!("Startup clip {} did not play: {}", startup_clip, e);
        }

        tracing::info!("Space Monkey ready!");
        Ok(session)
    }

    /// Run the main loop. Never returns.
    pub fn run_forever(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    /// One pass of the main loop, including any recovery it needs
    pub fn step(&mut self) -> StepOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_iteration()))
            .unwrap_or_else(|payload| Err(Fault::Unclassified(panic_message(payload.as_ref()))));

        match result {
            Ok(()) => StepOutcome::Completed,
            Err(Fault::Protocol(e)) => {
                tracing::error!("MQTT error: {}", e);
                self.pause.pause(self.policy.short_delay);
                self.try_reconnect()
            }
            Err(Fault::Unclassified(reason)) => {
                tracing::error!("General error: {}", reason);
                self.pause.pause(self.policy.short_delay);
                StepOutcome::UnclassifiedFault
            }
        }
    }

    fn run_iteration(&mut self) -> Result<(), Fault> {
        let events = self.supervisor.pump_once()?;
        for event in &events {
            self.dispatch(event);
        }
        Ok(())
    }

    // Blocks for the whole clip; nothing is pumped meanwhile
    fn dispatch(&self, event: &CommandEvent) {
        let Some(request) = self.router.route(event) else {
            return;
        };

        if let Err(e) = self.playback.play_clip(&request.clip) {
            tracing::warn!("Could not play {}: {}", request.clip, e);
        }
    }

    fn try_reconnect(&mut self) -> StepOutcome {
        tracing::info!("Attempting to reconnect...");
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.supervisor.reconnect()))
            .unwrap_or_else(|payload| {
                self.supervisor.abandon_attempt();
                Err(BrokerError::Connect(panic_message(payload.as_ref())))
            });
        match attempt {
            Ok(()) => {
                tracing::info!("Reconnected successfully!");
                StepOutcome::Reconnected
            }
            Err(e) => {
                tracing::error!("Reconnection failed: {}", e);
                self.pause.pause(self.policy.long_delay);
                StepOutcome::ReconnectFailed
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with unknown payload".to_string()
    }
}
