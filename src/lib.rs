// Space Monkey - plays stored sound clips on MQTT command
// Module declarations
pub mod audio;
pub mod commands;
pub mod connectivity;
pub mod error;
pub mod library;
pub mod orchestrator;
pub mod settings;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use audio::{AudioOutput, AudioPlaybackService, PlaybackOptions};
use commands::CommandRouter;
use connectivity::{BrokerConfig, ConnectivitySupervisor, MqttTransport, SystemNetwork, WifiCredentials};
use library::ClipLibrary;
use orchestrator::{Orchestrator, RetryPolicy, ThreadPause};
use settings::AppSettings;

const SETTINGS_ENV: &str = "SPACE_MONKEY_SETTINGS";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Start the appliance. Returns only if startup fails.
pub fn run() -> Result<()> {
    init_tracing();

    let settings_path = std::env::var(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("settings.json"));
    let settings = AppSettings::from_environment(&settings_path)
        .context("Failed to load settings")?;

    let topic = settings.sounds_topic();
    let broker = BrokerConfig {
        host: settings.broker.host.clone(),
        port: settings.broker.port,
        client_id: settings.client_id(),
        username: settings.broker.username.clone(),
        password: settings.broker.key.clone(),
        use_tls: settings.broker.use_tls,
        keep_alive: Duration::from_secs(settings.broker.keep_alive_secs),
        connect_timeout: Duration::from_millis(settings.broker.connect_timeout_ms),
    };

    let supervisor = ConnectivitySupervisor::new(
        SystemNetwork::new(&broker.host, broker.port),
        MqttTransport::new(broker),
        topic.clone(),
        Duration::from_millis(settings.broker.pump_timeout_ms),
    );

    let library = ClipLibrary::new(&settings.audio.clip_dir);
    match library.catalog() {
        Ok(clips) => tracing::info!("{} clip(s) in {:?}", clips.len(), library.root()),
        Err(e) => tracing::warn!("Could not catalog clips: {}", e),
    }

    let output = AudioOutput::new().context("Failed to initialize audio output")?;
    let playback = AudioPlaybackService::new(
        library,
        output,
        PlaybackOptions {
            level: settings.audio.level,
            poll_interval: Duration::from_millis(settings.audio.poll_interval_ms),
        },
    );

    let mut orchestrator = Orchestrator::new(
        supervisor,
        CommandRouter::new(topic),
        playback,
        ThreadPause,
        RetryPolicy {
            short_delay: settings.short_delay(),
            long_delay: settings.long_delay(),
        },
    );

    let credentials = WifiCredentials {
        ssid: settings.wifi.ssid.clone(),
        password: settings.wifi.password.clone(),
    };
    orchestrator
        .start(&credentials, &settings.audio.startup_clip)
        .context("Startup failed")?;

    orchestrator.run_forever()
}
