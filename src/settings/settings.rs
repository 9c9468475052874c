// Settings loading and validation
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Network join credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiSettings {
    /// Empty means the host OS already manages the link
    pub ssid: String,
    pub password: String,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub key: String,
    /// Defaults to a name derived from the username when empty
    pub client_id: String,
    pub use_tls: bool,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    pub pump_timeout_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "io.adafruit.com".to_string(),
            port: 8883,
            username: String::new(),
            key: String::new(),
            client_id: String::new(),
            use_tls: true,
            keep_alive_secs: 60,
            connect_timeout_ms: 10_000,
            pump_timeout_ms: 1_000,
        }
    }
}

/// Feed the sound commands arrive on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub feed_key: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            feed_key: "space-monkey-feeds.sounds".to_string(),
        }
    }
}

/// Clip storage and playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub clip_dir: PathBuf,
    pub startup_clip: String,
    pub level: f32, // 0.0-1.0
    pub poll_interval_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            clip_dir: PathBuf::from("/space-monkey-mp3s/"),
            startup_clip: "hi.mp3".to_string(),
            level: 0.65,
            poll_interval_ms: 10,
        }
    }
}

/// Fixed delays applied by the main loop after faults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub short_delay_ms: u64,
    pub long_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            short_delay_ms: 1_000,
            long_delay_ms: 5_000,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub wifi: WifiSettings,
    pub broker: BrokerSettings,
    pub feed: FeedSettings,
    pub audio: AudioSettings,
    pub retry: RetrySettings,
}

impl AppSettings {
    /// Load settings from file, or return defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: AppSettings = serde_json::from_str(&content)?;

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Load the settings file, apply process environment overrides and validate
    pub fn from_environment(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Self::load(path)?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Override values from a key lookup using the appliance's variable names
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ssid) = lookup("CIRCUITPY_WIFI_SSID") {
            self.wifi.ssid = ssid;
        }
        if let Some(password) = lookup("CIRCUITPY_WIFI_PASSWORD") {
            self.wifi.password = password;
        }
        if let Some(host) = lookup("BROKER") {
            self.broker.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.broker.port = port.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: format!("{port:?}: {e}"),
            })?;
        }
        if let Some(username) = lookup("ADAFRUIT_AIO_USERNAME") {
            self.broker.username = username;
        }
        if let Some(key) = lookup("ADAFRUIT_AIO_KEY") {
            self.broker.key = key;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.username.is_empty() {
            return Err(ConfigError::Missing("ADAFRUIT_AIO_USERNAME"));
        }
        if self.broker.host.is_empty() {
            return Err(ConfigError::Missing("BROKER"));
        }
        if !(0.0..=1.0).contains(&self.audio.level) {
            return Err(ConfigError::Invalid {
                key: "audio.level",
                reason: format!("{} is outside 0.0-1.0", self.audio.level),
            });
        }
        if self.audio.startup_clip.is_empty() {
            return Err(ConfigError::Missing("audio.startup_clip"));
        }
        Ok(())
    }

    /// Topic the sound commands are published on
    pub fn sounds_topic(&self) -> String {
        format!("{}/feeds/{}", self.broker.username, self.feed.feed_key)
    }

    pub fn client_id(&self) -> String {
        if self.broker.client_id.is_empty() {
            format!("space-monkey-{}", self.broker.username)
        } else {
            self.broker.client_id.clone()
        }
    }

    pub fn short_delay(&self) -> Duration {
        Duration::from_millis(self.retry.short_delay_ms)
    }

    pub fn long_delay(&self) -> Duration {
        Duration::from_millis(self.retry.long_delay_ms)
    }
}
