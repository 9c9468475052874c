// Shared fixtures for unit tests
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::PcmSink;
use crate::connectivity::{BrokerTransport, NetworkLink, TransportEvent, WifiCredentials};
use crate::error::{BrokerError, NetworkError};
use crate::orchestrator::Pause;

/// Write a 16-bit PCM WAV file
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    fs::write(path, bytes).unwrap();
}

/// Sink that keeps everything written to it
pub struct MemorySink {
    sample_rate: u32,
    channels: u16,
    level: Mutex<f32>,
    samples: Mutex<Vec<f32>>,
    write_delay: Duration,
    writers: AtomicUsize,
    max_writers: AtomicUsize,
    /// Samples still "playing" after the last write, and how many each poll retires
    backlog: Mutex<usize>,
    drain_per_poll: usize,
    polls: AtomicUsize,
}

impl MemorySink {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            level: Mutex::new(1.0),
            samples: Mutex::new(Vec::new()),
            write_delay: Duration::ZERO,
            writers: AtomicUsize::new(0),
            max_writers: AtomicUsize::new(0),
            backlog: Mutex::new(0),
            drain_per_poll: 0,
            polls: AtomicUsize::new(0),
        }
    }

    /// Report `samples` as queued until `pending` has been polled enough times
    pub fn with_backlog(mut self, samples: usize, drain_per_poll: usize) -> Self {
        self.backlog = Mutex::new(samples);
        self.drain_per_poll = drain_per_poll;
        self
    }

    pub fn pending_polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn backlog(&self) -> usize {
        *self.backlog.lock()
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn samples(&self) -> Vec<f32> {
        self.samples.lock().clone()
    }

    pub fn level(&self) -> f32 {
        *self.level.lock()
    }

    pub fn max_concurrent_writers(&self) -> usize {
        self.max_writers.load(Ordering::SeqCst)
    }
}

impl PcmSink for MemorySink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn set_level(&self, level: f32) {
        *self.level.lock() = level;
    }

    fn write_blocking(&self, samples: &[f32]) {
        let active = self.writers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writers.fetch_max(active, Ordering::SeqCst);
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        self.samples.lock().extend_from_slice(samples);
        self.writers.fetch_sub(1, Ordering::SeqCst);
    }

    fn pending(&self) -> usize {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut backlog = self.backlog.lock();
        *backlog = backlog.saturating_sub(self.drain_per_poll);
        *backlog
    }
}

/// Everything a `ScriptedTransport` was asked to do, plus what it will answer
#[derive(Default)]
pub struct TransportLog {
    pub events: VecDeque<Result<Option<TransportEvent>, BrokerError>>,
    pub failing_opens: usize,
    pub panicking_opens: usize,
    pub failing_subscribes: usize,
    pub opens: usize,
    pub closes: usize,
    pub subscriptions: Vec<String>,
    pub open: bool,
}

/// Broker transport that replays queued events
#[derive(Default)]
pub struct ScriptedTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<Mutex<TransportLog>> {
        self.log.clone()
    }

    pub fn push_event(&self, event: TransportEvent) {
        self.log.lock().events.push_back(Ok(Some(event)));
    }

    pub fn push_fault(&self, reason: &str) {
        self.log
            .lock()
            .events
            .push_back(Err(BrokerError::Protocol(reason.to_string())));
    }

    pub fn fail_next_open(&self) {
        self.log.lock().failing_opens += 1;
    }
}

impl BrokerTransport for ScriptedTransport {
    fn open(&mut self) -> Result<(), BrokerError> {
        let mut log = self.log.lock();
        log.opens += 1;
        if log.panicking_opens > 0 {
            log.panicking_opens -= 1;
            drop(log);
            panic!("could not build client runtime");
        }
        if log.failing_opens > 0 {
            log.failing_opens -= 1;
            return Err(BrokerError::Connect("connection refused".to_string()));
        }
        log.open = true;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        let mut log = self.log.lock();
        if !log.open {
            return Err(BrokerError::NoSession);
        }
        if log.failing_subscribes > 0 {
            log.failing_subscribes -= 1;
            return Err(BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: "request queue closed".to_string(),
            });
        }
        log.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<Option<TransportEvent>, BrokerError> {
        let mut log = self.log.lock();
        if !log.open {
            return Err(BrokerError::NoSession);
        }
        log.events.pop_front().unwrap_or(Ok(None))
    }

    fn close(&mut self) {
        let mut log = self.log.lock();
        log.closes += 1;
        log.open = false;
    }
}

#[derive(Default)]
pub struct ScriptedNetwork {
    fail: bool,
}

impl ScriptedNetwork {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl NetworkLink for ScriptedNetwork {
    fn join(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        if self.fail {
            return Err(NetworkError::JoinFailed {
                ssid: credentials.ssid.clone(),
                reason: "no such network".to_string(),
            });
        }
        Ok(())
    }
}

/// Records delays instead of sleeping
#[derive(Default, Clone)]
pub struct RecordingPause {
    pub pauses: Arc<Mutex<Vec<Duration>>>,
}

impl Pause for RecordingPause {
    fn pause(&mut self, duration: Duration) {
        self.pauses.lock().push(duration);
    }
}
